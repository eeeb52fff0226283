//! Model validation errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Invalid stream name: {0}")]
    InvalidStreamName(String),

    #[error("Invalid zone '{zone_id}': {reason}")]
    InvalidZone { zone_id: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ModelError {
    pub fn invalid_stream_name(msg: impl Into<String>) -> Self {
        Self::InvalidStreamName(msg.into())
    }

    pub fn invalid_zone(zone_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidZone {
            zone_id: zone_id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
