//! The russh-backed outbound transport.

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use russh::{Disconnect, client};
use ssh_core::{
    Dispatch, SshBackend, SshChannel, SshCoreError, SshResult, TermSize,
    crypto::preferred_for,
    terminal::current_pty_modes,
};
use tokio::{net::TcpStream, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    ClientError,
    auth::Authenticator,
    hostkeys::{GatewayClientHandler, HostKeyPolicy},
};

const SOCKET_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection knobs for the outbound leg.
#[derive(Clone, Debug)]
pub struct BackendOptions {
    pub connect_timeout: Duration,
    pub keepalive: Option<Duration>,
    pub legacy_crypto: bool,
    pub host_key_policy: HostKeyPolicy,
    pub known_hosts: Option<PathBuf>,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            keepalive: Some(Duration::from_secs(10)),
            legacy_crypto: false,
            host_key_policy: HostKeyPolicy::default(),
            known_hosts: None,
        }
    }
}

fn build_client_config(options: &BackendOptions) -> Arc<client::Config> {
    if options.legacy_crypto {
        warn!("legacy algorithms enabled for outbound connections");
    }
    Arc::new(client::Config {
        preferred: preferred_for(options.legacy_crypto),
        nodelay: true,
        inactivity_timeout: None,
        keepalive_interval: options.keepalive,
        keepalive_max: 3,
        ..Default::default()
    })
}

/// [`SshBackend`] speaking SSH through russh.
pub struct RusshBackend {
    options: BackendOptions,
    authenticator: Authenticator,
    address: String,
    handle: Option<client::Handle<GatewayClientHandler>>,
}

impl RusshBackend {
    pub fn new(options: BackendOptions, authenticator: Authenticator) -> Self {
        Self {
            options,
            authenticator,
            address: String::new(),
            handle: None,
        }
    }

    fn handle(&self, operation: &str) -> SshResult<&client::Handle<GatewayClientHandler>> {
        self.handle.as_ref().ok_or_else(|| SshCoreError::not_connected(operation))
    }
}

#[async_trait]
impl SshBackend for RusshBackend {
    type Channel = SshChannel;

    async fn connect(&mut self, host: &str, port: u16) -> SshResult<()> {
        let address = format!("{host}:{port}");
        let seconds = self.options.connect_timeout.as_secs();
        let timed_out = || SshCoreError::ConnectTimeout {
            address: address.clone(),
            seconds,
        };
        info!(target = %address, "connecting to target");

        let stream = timeout(self.options.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| timed_out())?
            .map_err(|err| SshCoreError::connect(&address, err))?;
        stream.set_nodelay(true)?;

        let handler = GatewayClientHandler::new(host, port, self.options.host_key_policy, self.options.known_hosts.clone());
        let config = build_client_config(&self.options);
        let handle = timeout(self.options.connect_timeout, client::connect_stream(config, stream, handler))
            .await
            .map_err(|_| timed_out())?
            .map_err(|err| match err {
                ClientError::HostKeyRejected { address, reason } => SshCoreError::HostKeyRejected { address, reason },
                other => SshCoreError::connect(&address, other),
            })?;

        debug!(target = %address, "SSH handshake complete");
        self.address = address;
        self.handle = Some(handle);
        Ok(())
    }

    async fn authenticate(&mut self, user: &str) -> SshResult<()> {
        let address = self.address.clone();
        let handle = self.handle.as_mut().ok_or_else(|| SshCoreError::not_connected("authenticate"))?;
        let method = self.authenticator.authenticate(handle, user, &address).await?;
        info!(user, target = %address, method = method.label(), "authenticated to target");
        Ok(())
    }

    async fn open(&mut self, dispatch: &Dispatch, size: TermSize, term: &str) -> SshResult<SshChannel> {
        let handle = self.handle("open channel")?;
        let channel = handle.channel_open_session().await?;
        let (cols, lines) = size.as_wire();
        channel
            .request_pty(true, term, cols, lines, 0, 0, &current_pty_modes())
            .await?;
        match dispatch {
            Dispatch::Shell => channel.request_shell(true).await?,
            Dispatch::Exec(command) => channel.exec(true, command.as_str()).await?,
        }
        Ok(SshChannel::new(channel))
    }

    async fn close_transport(&mut self) -> SshResult<()> {
        let Some(handle) = &self.handle else {
            return Ok(());
        };
        if handle.is_closed() {
            debug!(target = %self.address, "transport already closed by peer");
            return Ok(());
        }
        handle.disconnect(Disconnect::ByApplication, "session closed", "en").await?;
        Ok(())
    }

    async fn close_socket(&mut self) -> SshResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match timeout(SOCKET_CLOSE_TIMEOUT, handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(SshCoreError::Other(format!("socket to {} did not close in time", self.address))),
        }
    }
}
