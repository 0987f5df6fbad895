//! Row types held in the local cache

use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub slug: String,
}

/// Qualification category and whether both assessments were passed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: Option<String>,
    pub passed_practical: bool,
    pub passed_written: bool,
}

/// One bounty engagement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub slug: String,
    pub codename: Option<String>,
    pub average_payout: f64,
    pub category: Option<i64>,
    pub organization: Option<String>,
    pub date_updated: i64,
    pub end_date: i64,
    pub start_date: i64,
    pub is_active: bool,
    pub is_new: bool,
    pub is_registered: bool,
    pub is_updated: bool,
    pub last_submitted: i64,
    pub vulnerability_discovery: bool,
    pub workspace_access_missing: bool,
}

impl Target {
    /// A row that has not been written yet, carrying the schema defaults
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            codename: None,
            average_payout: 0.0,
            category: None,
            organization: None,
            date_updated: 0,
            end_date: 0,
            start_date: 0,
            is_active: false,
            is_new: false,
            is_registered: true,
            is_updated: false,
            last_submitted: 0,
            vulnerability_discovery: false,
            workspace_access_missing: false,
        }
    }

    pub(crate) const COLUMNS: &'static str = "slug, codename, average_payout, category, organization, \
         date_updated, end_date, start_date, is_active, is_new, is_registered, is_updated, \
         last_submitted, vulnerability_discovery, workspace_access_missing";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            slug: row.get(0)?,
            codename: row.get(1)?,
            average_payout: row.get(2)?,
            category: row.get(3)?,
            organization: row.get(4)?,
            date_updated: row.get(5)?,
            end_date: row.get(6)?,
            start_date: row.get(7)?,
            is_active: row.get(8)?,
            is_new: row.get(9)?,
            is_registered: row.get(10)?,
            is_updated: row.get(11)?,
            last_submitted: row.get(12)?,
            vulnerability_discovery: row.get(13)?,
            workspace_access_missing: row.get(14)?,
        })
    }
}

/// A discovered host address belonging to a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ip {
    pub id: i64,
    pub ip: String,
    pub target: String,
}

impl Ip {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ip: row.get(1)?,
            target: row.get(2)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: i64,
    /// Row id of the owning [`Ip`]
    pub ip: i64,
    pub port: i64,
    pub protocol: String,
    /// Discovery method, e.g. `nmap`
    pub source: String,
    pub open: bool,
    pub service: String,
    /// Epoch seconds of the last observation
    pub updated: i64,
}

impl Port {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ip: row.get(1)?,
            port: row.get(2)?,
            protocol: row.get(3)?,
            source: row.get(4)?,
            open: row.get(5)?,
            service: row.get(6)?,
            updated: row.get(7)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Url {
    pub id: i64,
    /// Row id of the owning [`Ip`]
    pub ip: i64,
    pub url: String,
    pub screenshot_url: String,
}

impl Url {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ip: row.get(1)?,
            url: row.get(2)?,
            screenshot_url: row.get(3)?,
        })
    }
}

/// Ports found on one host, as returned by `find_ports`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPorts {
    pub ip: String,
    pub target: String,
    pub ports: Vec<Port>,
}

/// URLs found on one host, as returned by `find_urls`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostUrls {
    pub ip: String,
    pub target: String,
    pub urls: Vec<Url>,
}

/// Snapshot of the singleton settings row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub api_token: String,
    pub debug: bool,
    pub email: String,
    pub http_proxy: String,
    pub https_proxy: String,
    pub login: bool,
    pub notifications_token: String,
    pub otp_secret: String,
    pub password: String,
    pub scratchspace_dir: String,
    pub slack_url: String,
    pub smtp_email_from: String,
    pub smtp_email_to: String,
    pub smtp_password: String,
    pub smtp_port: i64,
    pub smtp_server: String,
    pub smtp_starttls: bool,
    pub smtp_username: String,
    pub template_dir: String,
    pub user_id: String,
    pub use_proxies: bool,
    pub use_scratchspace: bool,
}

impl Config {
    pub(crate) const COLUMNS: &'static str = "api_token, debug, email, http_proxy, https_proxy, \
         login, notifications_token, otp_secret, password, scratchspace_dir, slack_url, \
         smtp_email_from, smtp_email_to, smtp_password, smtp_port, smtp_server, smtp_starttls, \
         smtp_username, template_dir, user_id, use_proxies, use_scratchspace";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            api_token: row.get(0)?,
            debug: row.get(1)?,
            email: row.get(2)?,
            http_proxy: row.get(3)?,
            https_proxy: row.get(4)?,
            login: row.get(5)?,
            notifications_token: row.get(6)?,
            otp_secret: row.get(7)?,
            password: row.get(8)?,
            scratchspace_dir: row.get(9)?,
            slack_url: row.get(10)?,
            smtp_email_from: row.get(11)?,
            smtp_email_to: row.get(12)?,
            smtp_password: row.get(13)?,
            smtp_port: row.get(14)?,
            smtp_server: row.get(15)?,
            smtp_starttls: row.get(16)?,
            smtp_username: row.get(17)?,
            template_dir: row.get(18)?,
            user_id: row.get(19)?,
            use_proxies: row.get(20)?,
            use_scratchspace: row.get(21)?,
        })
    }
}
