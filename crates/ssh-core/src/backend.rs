use async_trait::async_trait;

use crate::{channel::ProxyChannel, error::SshResult, terminal::TermSize};

/// What to run on the target once the channel is open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Shell,
    Exec(String),
}

impl Dispatch {
    /// A non-empty command means non-interactive execution.
    pub fn from_command(command: Option<&str>) -> Self {
        match command.map(str::trim) {
            Some(command) if !command.is_empty() => Dispatch::Exec(command.to_string()),
            _ => Dispatch::Shell,
        }
    }
}

/// Outbound connection to a target host.
///
/// The close steps are separate so the shutdown sequence can attempt each
/// one even when an earlier step fails. All of them must be safe to call
/// repeatedly and when the corresponding resource was never created.
#[async_trait]
pub trait SshBackend: Send {
    type Channel: ProxyChannel;

    /// Open the TCP socket and run the SSH handshake.
    async fn connect(&mut self, host: &str, port: u16) -> SshResult<()>;

    /// Authenticate as `user`, walking the credential chain.
    async fn authenticate(&mut self, user: &str) -> SshResult<()>;

    /// Open a session channel, request a PTY of `size` and start `dispatch`.
    async fn open(&mut self, dispatch: &Dispatch, size: TermSize, term: &str) -> SshResult<Self::Channel>;

    /// End the SSH transport (disconnect message).
    async fn close_transport(&mut self) -> SshResult<()>;

    /// Wait for the transport task to finish and the socket to be released.
    async fn close_socket(&mut self) -> SshResult<()>;
}
