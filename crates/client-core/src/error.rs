use ssh_core::SshCoreError;
use thiserror::Error;

/// Errors that can occur on the outbound leg
#[derive(Error, Debug)]
pub enum ClientError {
    /// SSH error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Every credential method was tried and none was accepted
    #[error("all authentication methods exhausted for {user}@{address}")]
    AuthExhausted { user: String, address: String },

    /// Host key verification failed
    #[error("host key for {address} rejected: {reason}")]
    HostKeyRejected { address: String, reason: String },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for client-core operations
pub type ClientResult<T> = Result<T, ClientError>;

impl From<SshCoreError> for ClientError {
    fn from(err: SshCoreError) -> Self {
        match err {
            SshCoreError::Io(err) => ClientError::Io(err),
            SshCoreError::Ssh(err) => ClientError::Ssh(err),
            other => ClientError::Other(other.to_string()),
        }
    }
}

impl From<ClientError> for SshCoreError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Ssh(err) => SshCoreError::Ssh(err),
            ClientError::Io(err) => SshCoreError::Io(err),
            ClientError::AuthExhausted { user, address } => SshCoreError::AuthExhausted { user, address },
            ClientError::HostKeyRejected { address, reason } => SshCoreError::HostKeyRejected { address, reason },
            other => SshCoreError::Other(other.to_string()),
        }
    }
}
