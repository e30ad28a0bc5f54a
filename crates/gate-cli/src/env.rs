use std::sync::Arc;

use client_core::{Authenticator, RusshBackend};
use gateway_core::{GatewayConfig, GatewayResult, SessionEnvironment, SessionRecorder};
use ssh_core::{LocalIo, ObserverChain, TermSize, terminal::initial_size};

/// Real process environment: russh outbound, inherited stdio, file recordings.
pub struct StdioEnvironment {
    config: Arc<GatewayConfig>,
}

impl StdioEnvironment {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self { config }
    }
}

impl SessionEnvironment for StdioEnvironment {
    type Backend = RusshBackend;

    fn backend(&mut self) -> GatewayResult<RusshBackend> {
        let authenticator = Authenticator::new(self.config.identity_paths());
        Ok(RusshBackend::new(self.config.backend_options(), authenticator))
    }

    fn local_io(&mut self) -> LocalIo {
        LocalIo::stdio()
    }

    fn observers(&mut self) -> ObserverChain {
        let mut chain = ObserverChain::new();
        chain.attach(Box::new(SessionRecorder::new(self.config.session_log_dir.clone())));
        chain
    }

    fn terminal_size(&self) -> TermSize {
        initial_size()
    }
}
