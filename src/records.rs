//! Inbound record shapes handed over by the API transport
//!
//! Targets arrive as free-form JSON objects (see `storage::targets`); the
//! host discovery and assessment payloads have fixed shapes and are typed here.

use serde::{Deserialize, Deserializer, Serialize};

/// One address owned by a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRecord {
    pub ip: String,
    pub target: String,
}

impl IpRecord {
    pub fn new(target: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            target: target.into(),
        }
    }
}

/// Port discovery results for one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBatch {
    pub ip: String,
    pub target: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub ports: Vec<PortRecord>,
}

/// Absent optional fields leave the cached value untouched on refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    #[serde(deserialize_with = "int_or_string")]
    pub port: i64,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<i64>,
}

/// Web endpoints found on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlBatch {
    pub ip: String,
    pub target: String,
    #[serde(default)]
    pub urls: Vec<UrlRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_url: Option<String>,
}

/// Qualification assessment result for one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub category_id: i64,
    pub category_name: String,
    pub practical_assessment: AssessmentResult,
    pub written_assessment: AssessmentResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentResult {
    #[serde(default)]
    pub passed: bool,
}

/// The platform sends port numbers both as JSON numbers and as strings
fn int_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
