//! Error types for the cache and the scope normalizer

use thiserror::Error;

pub type Result<T, E = CacheError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// A platform record lacks a field the cache cannot default
    #[error("{record} record is missing required field `{field}`")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    /// A target points at a category that was never synced
    #[error("category {0} does not exist in the cache")]
    UnknownCategory(i64),

    #[error("invalid address or CIDR `{input}`: {reason}")]
    InvalidAddress { input: String, reason: String },

    #[error("`{key}` is not a column of {entity} or its target")]
    UnknownFilter { entity: &'static str, key: String },

    #[error("unknown setting `{0}`")]
    UnknownSetting(String),

    #[error("setting `{name}` expects a {expected} value")]
    SettingType {
        name: String,
        expected: &'static str,
    },

    #[error("migration {version} ({name}) failed: {source}")]
    Migration {
        version: u32,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot prepare cache directory: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
