use ssh_core::SshCoreError;
use thiserror::Error;

use crate::session::SessionState;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Ssh(#[from] SshCoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("identity provider '{0}' not found")]
    ProviderNotFound(String),

    #[error("identity provider '{name}' failed to load: {reason}")]
    ProviderLoadError { name: String, reason: String },

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("user '{user}' is not allowed to reach '{host}'")]
    HostNotAllowed { user: String, host: String },

    #[error("cannot {operation} a session in state {state}")]
    InvalidState { operation: &'static str, state: SessionState },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub fn load(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ProviderLoadError {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_target(message: impl Into<String>) -> Self {
        Self::InvalidTarget(message.into())
    }
}
