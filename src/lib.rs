pub mod backend;
pub mod config;
pub mod core;
pub mod engine;

pub mod inspect_cmd;
pub mod prove_cmd;
pub mod session_cmd;

use thiserror::Error;

use crate::backend::BackendError;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type FlowResult<T> = Result<T, FlowError>;

pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha256::digest;
    digest(bytes)
}

/// Current UTC time as RFC 3339, empty if formatting fails.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
