//! Orchestration of one gateway invocation.

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use ssh_core::{Dispatch, LocalIo, ObserverChain, ProxyTransport, SshBackend, TermSize};
use tracing::{error, info, warn};

use crate::{
    config::GatewayConfig,
    error::{GatewayError, GatewayResult},
    session::{GatewaySession, SessionSummary},
    target::{DEFAULT_PORT, DirectTarget, LaunchMode},
    user::UserContext,
};

/// Per-session resources the core needs but does not build itself.
pub trait SessionEnvironment: Send {
    type Backend: SshBackend;

    /// A fresh, unconnected backend for the next session.
    fn backend(&mut self) -> GatewayResult<Self::Backend>;

    fn local_io(&mut self) -> LocalIo;

    /// Observers for the next session, in attachment order.
    fn observers(&mut self) -> ObserverChain;

    fn terminal_size(&self) -> TermSize;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerAction {
    Connect(String),
    /// Refresh the user's grants, bypassing the cache.
    Reload,
    Quit,
}

/// Interactive host selection.
#[async_trait]
pub trait HostPicker: Send {
    async fn pick(&mut self, user: &UserContext) -> GatewayResult<PickerAction>;

    /// Show a message such as a failed connection.
    async fn notify(&mut self, _message: &str) {}
}

pub type CompletionHandler = Arc<dyn Fn(&SessionSummary) + Send + Sync>;

pub struct GatewayCore<E: SessionEnvironment> {
    config: Arc<GatewayConfig>,
    user: UserContext,
    source: SocketAddr,
    env: E,
    completion: CompletionHandler,
}

impl<E: SessionEnvironment> GatewayCore<E> {
    pub fn new(config: Arc<GatewayConfig>, user: UserContext, source: SocketAddr, env: E) -> Self {
        Self {
            config,
            user,
            source,
            env,
            completion: Arc::new(|summary: &SessionSummary| {
                info!(
                    session_id = %summary.session_id,
                    user = %summary.user,
                    host = %summary.host,
                    state = %summary.state,
                    exit_status = ?summary.exit_status,
                    "finished session"
                );
            }),
        }
    }

    /// Replace the completion handler run after every session teardown.
    pub fn with_completion(mut self, handler: impl Fn(&SessionSummary) + Send + Sync + 'static) -> Self {
        self.completion = Arc::new(handler);
        self
    }

    pub fn user(&self) -> &UserContext {
        &self.user
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Run the gateway in `mode` until the user quits or the direct session
    /// ends. Returns the last remote exit status, if any.
    pub async fn run(&mut self, mode: LaunchMode, picker: &mut dyn HostPicker) -> GatewayResult<Option<u32>> {
        match mode {
            LaunchMode::Direct(target) => self.run_direct(target).await,
            LaunchMode::Interactive => self.run_interactive(picker).await,
        }
    }

    async fn run_direct(&mut self, target: DirectTarget) -> GatewayResult<Option<u32>> {
        if !self.user.is_allowed(&target.host) {
            if self.config.direct_acl_check {
                return Err(GatewayError::HostNotAllowed {
                    user: self.user.name.clone(),
                    host: target.host,
                });
            }
            warn!(
                user = %self.user.name,
                host = %target.host,
                "direct target is outside the user's allowed hosts; proceeding because direct_acl_check is off"
            );
        }
        let dispatch = Dispatch::from_command(target.command.as_deref());
        self.run_session(&target.host, target.port, dispatch).await
    }

    async fn run_interactive(&mut self, picker: &mut dyn HostPicker) -> GatewayResult<Option<u32>> {
        let mut last_status = None;
        loop {
            match picker.pick(&self.user).await? {
                PickerAction::Quit => return Ok(last_status),
                PickerAction::Reload => {
                    if let Err(err) = self.user.reload().await {
                        warn!(user = %self.user.name, error = %err, "reload failed");
                        picker.notify(&format!("reload failed: {err}")).await;
                    }
                }
                PickerAction::Connect(host) => {
                    if !self.user.is_allowed(&host) {
                        let err = GatewayError::HostNotAllowed {
                            user: self.user.name.clone(),
                            host,
                        };
                        warn!(error = %err, "host refused");
                        picker.notify(&err.to_string()).await;
                        continue;
                    }
                    match self.run_session(&host, DEFAULT_PORT, Dispatch::Shell).await {
                        Ok(status) => last_status = status,
                        Err(err) => picker.notify(&format!("session to {host} failed: {err}")).await,
                    }
                }
            }
        }
    }

    /// Create, drive and always tear down one session.
    async fn run_session(&mut self, host: &str, port: u16, dispatch: Dispatch) -> GatewayResult<Option<u32>> {
        let transport = ProxyTransport::new(self.env.backend()?, self.env.observers()).with_term(&self.config.term);
        let completion = self.completion.clone();
        let mut session = GatewaySession::new(&self.user.name, host, port, self.source, transport)
            .on_complete(move |summary| completion(summary));
        info!(
            session_id = %session.id(),
            user = %self.user.name,
            host,
            port,
            source = %self.source,
            "starting session"
        );

        let result = match session.connect(self.env.terminal_size()).await {
            Ok(()) => session.start(dispatch, self.env.local_io()).await,
            Err(err) => Err(err),
        };
        let summary = session.close().await;

        match result {
            Ok(status) => Ok(status.or(summary.exit_status)),
            Err(err) => {
                error!(session_id = %summary.session_id, host, port, error = %err, "session failed");
                Err(err)
            }
        }
    }
}
