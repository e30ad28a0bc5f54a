//! One outbound connection and the session driven over it.

use tracing::{debug, info, warn};

use crate::{
    backend::{Dispatch, SshBackend},
    channel::ProxyChannel,
    error::{SshCoreError, SshResult},
    mux,
    observer::ObserverChain,
    stdio::LocalIo,
    terminal::{RawModeGuard, TermSize},
};

pub const DEFAULT_TERM: &str = "xterm";

/// Owns the outbound connection for exactly one gateway session.
pub struct ProxyTransport<B: SshBackend> {
    backend: B,
    channel: Option<B::Channel>,
    terminal: Option<RawModeGuard>,
    observers: ObserverChain,
    size: TermSize,
    term: String,
    exit_status: Option<u32>,
    shut_down: bool,
}

impl<B: SshBackend> ProxyTransport<B> {
    pub fn new(backend: B, observers: ObserverChain) -> Self {
        Self {
            backend,
            channel: None,
            terminal: None,
            observers,
            size: TermSize::FALLBACK,
            term: DEFAULT_TERM.to_string(),
            exit_status: None,
            shut_down: false,
        }
    }

    pub fn with_term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }

    pub fn size(&self) -> TermSize {
        self.size
    }

    pub fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    pub fn observers_mut(&mut self) -> &mut ObserverChain {
        &mut self.observers
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Connect to the target. `size` is the PTY size requested later.
    pub async fn connect(&mut self, host: &str, port: u16, size: TermSize) -> SshResult<()> {
        self.size = size;
        self.backend.connect(host, port).await
    }

    pub async fn authenticate(&mut self, user: &str) -> SshResult<()> {
        self.backend.authenticate(user).await
    }

    /// Dispatch the shell or command and splice it with `local` until the
    /// remote side closes.
    ///
    /// The terminal stays raw after this returns; [`Self::shutdown`] (or
    /// dropping the transport) restores it.
    pub async fn run(&mut self, dispatch: Dispatch, mut local: LocalIo) -> SshResult<Option<u32>> {
        if self.channel.is_some() || self.shut_down {
            return Err(SshCoreError::Other("transport already ran a session".into()));
        }
        let mut channel = self.backend.open(&dispatch, self.size, &self.term).await?;
        match &dispatch {
            Dispatch::Exec(command) => {
                info!(command = %command, size = %self.size, "running remote command");
                self.observers.stdin(command.as_bytes());
            }
            Dispatch::Shell => info!(size = %self.size, "starting remote shell"),
        }

        let mut guard = local.take_terminal().map(RawModeGuard::new);
        let entered = match guard.as_mut() {
            Some(guard) => guard.engage().map_err(|err| SshCoreError::Terminal(err.to_string())),
            None => Ok(()),
        };
        self.terminal = guard;
        let result = match entered {
            Ok(()) => mux::splice(&mut channel, &mut local, &mut self.observers, &mut self.size).await,
            Err(err) => Err(err),
        };

        self.exit_status = channel.exit_status();
        self.channel = Some(channel);
        result.map(|()| self.exit_status)
    }

    /// Tear everything down in order: observers, terminal, channel,
    /// transport, socket.
    ///
    /// Every step runs even if an earlier one failed. Each failure is logged
    /// and the first one is returned. Later calls do nothing.
    pub async fn shutdown(&mut self) -> SshResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.observers.stop();

        let mut first: Option<SshCoreError> = None;
        let mut record = |step: &'static str, result: SshResult<()>| {
            if let Err(err) = result {
                warn!(step, error = %err, "cleanup step failed");
                first.get_or_insert(err);
            }
        };

        if let Some(mut guard) = self.terminal.take() {
            record("restore terminal", guard.restore().map_err(SshCoreError::from));
        }
        if let Some(mut channel) = self.channel.take() {
            record("close channel", channel.close().await);
        }
        record("close transport", self.backend.close_transport().await);
        record("close socket", self.backend.close_socket().await);
        debug!("transport shut down");

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
