use thiserror::Error;

/// Errors that can occur while establishing or driving a proxied session
#[derive(Error, Debug)]
pub enum SshCoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH protocol error
    #[error("SSH protocol error: {0}")]
    Ssh(#[from] russh::Error),

    /// TCP/transport setup towards the target failed
    #[error("failed to connect to {address}: {message}")]
    ConnectionFailed { address: String, message: String },

    /// The target did not answer within the connect timeout
    #[error("timed out connecting to {address} after {seconds}s")]
    ConnectTimeout { address: String, seconds: u64 },

    /// Every credential method was tried and rejected
    #[error("all authentication methods exhausted for {user}@{address}")]
    AuthExhausted { user: String, address: String },

    /// Target host key was rejected by policy
    #[error("host key for {address} rejected: {reason}")]
    HostKeyRejected { address: String, reason: String },

    /// An operation needed a live connection that is not there
    #[error("{operation} requires an established connection")]
    NotConnected { operation: String },

    /// Terminal could not be switched or restored
    #[error("terminal control failed: {0}")]
    Terminal(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for SSH core operations
pub type SshResult<T> = Result<T, SshCoreError>;

impl SshCoreError {
    /// Create a connection failure error
    pub fn connect(address: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ConnectionFailed {
            address: address.into(),
            message: message.to_string(),
        }
    }

    /// Create a not-connected error
    pub fn not_connected(operation: impl Into<String>) -> Self {
        Self::NotConnected {
            operation: operation.into(),
        }
    }
}
