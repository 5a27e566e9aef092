//! Error types for wardend

use thiserror::Error;

use crate::GroupId;

/// Core error type for wardend operations
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("No tracking session active")]
    NoActiveSession,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardenError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn browser(msg: impl Into<String>) -> Self {
        Self::BrowserError(msg.into())
    }

    pub fn ipc(msg: impl Into<String>) -> Self {
        Self::IpcError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
