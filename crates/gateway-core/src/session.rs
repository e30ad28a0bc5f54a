use std::{fmt, net::SocketAddr};

use ssh_core::{Dispatch, LocalIo, ProxyTransport, SessionInfo, SshBackend, TermSize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Connecting,
    Authenticating,
    Active,
    Closed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the completion callback learns about a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub user: String,
    pub host: String,
    pub port: u16,
    pub state: SessionState,
    pub exit_status: Option<u32>,
}

pub type CompletionCallback = Box<dyn FnOnce(&SessionSummary) + Send>;

/// One user, one target, one outbound transport.
///
/// `Created -> Connecting -> Authenticating -> Active -> Closed`, with
/// connect and auth failures ending in `Failed`. [`Self::close`] runs the
/// transport shutdown and fires the completion callback exactly once.
pub struct GatewaySession<B: SshBackend> {
    id: Uuid,
    user: String,
    host: String,
    port: u16,
    source: SocketAddr,
    state: SessionState,
    transport: ProxyTransport<B>,
    on_complete: Option<CompletionCallback>,
    summary: Option<SessionSummary>,
}

impl<B: SshBackend> GatewaySession<B> {
    pub fn new(
        user: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        source: SocketAddr,
        transport: ProxyTransport<B>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user: user.into(),
            host: host.into(),
            port,
            source,
            state: SessionState::Created,
            transport,
            on_complete: None,
            summary: None,
        }
    }

    pub fn on_complete(mut self, callback: impl FnOnce(&SessionSummary) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn transport(&self) -> &ProxyTransport<B> {
        &self.transport
    }

    fn require(&self, operation: &'static str, expected: SessionState) -> GatewayResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(GatewayError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Connect and authenticate to the target, sizing the future PTY at `size`.
    pub async fn connect(&mut self, size: TermSize) -> GatewayResult<()> {
        self.require("connect", SessionState::Created)?;

        self.state = SessionState::Connecting;
        debug!(session_id = %self.id, host = %self.host, port = self.port, "connecting");
        if let Err(err) = self.transport.connect(&self.host, self.port, size).await {
            self.state = SessionState::Failed;
            warn!(session_id = %self.id, host = %self.host, port = self.port, error = %err, "connection to target failed");
            return Err(err.into());
        }

        self.state = SessionState::Authenticating;
        if let Err(err) = self.transport.authenticate(&self.user).await {
            self.state = SessionState::Failed;
            warn!(session_id = %self.id, user = %self.user, host = %self.host, error = %err, "authentication to target failed");
            return Err(err.into());
        }

        self.state = SessionState::Active;
        Ok(())
    }

    /// Start observers and run `dispatch` until the remote side closes.
    pub async fn start(&mut self, dispatch: Dispatch, local: LocalIo) -> GatewayResult<Option<u32>> {
        self.require("start", SessionState::Active)?;
        let info = SessionInfo {
            session_id: self.id,
            user: self.user.clone(),
            host: self.host.clone(),
            port: self.port,
            source: self.source,
            size: self.transport.size(),
        };
        self.transport.observers_mut().start(&info);
        Ok(self.transport.run(dispatch, local).await?)
    }

    /// Tear the session down. Safe to call from any state and any number of
    /// times; only the first call does work.
    pub async fn close(&mut self) -> SessionSummary {
        if let Some(summary) = &self.summary {
            return summary.clone();
        }

        if let Err(err) = self.transport.shutdown().await {
            warn!(session_id = %self.id, error = %err, "session teardown finished with errors");
        }
        if self.state != SessionState::Failed {
            self.state = SessionState::Closed;
        }

        let summary = SessionSummary {
            session_id: self.id,
            user: self.user.clone(),
            host: self.host.clone(),
            port: self.port,
            state: self.state,
            exit_status: self.transport.exit_status(),
        };
        info!(session_id = %self.id, user = %self.user, host = %self.host, state = %self.state, "session closed");
        if let Some(callback) = self.on_complete.take() {
            callback(&summary);
        }
        self.summary = Some(summary.clone());
        summary
    }
}
