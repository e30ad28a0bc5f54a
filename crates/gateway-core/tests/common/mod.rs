//! Shared fakes for gateway-core integration tests.
//!
//! `FakeBackend` records every call into a shared log and hands out a
//! `FakeChannel` that replays scripted output and then reports close.
#![allow(dead_code)]

use std::{
    collections::{BTreeSet, VecDeque},
    io,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use gateway_core::{GatewayResult, HostAccess, IdentityProvider, SessionEnvironment, UserContext};
use ssh_core::{
    Dispatch, LocalIo, ObserverChain, ObserverError, ProxyChannel, SessionInfo, SessionObserver, SshBackend, SshCoreError, SshResult,
    TermSize, TerminalControl,
};
use tokio::io::AsyncWrite;

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn push(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub struct FakeChannel {
    output: VecDeque<Vec<u8>>,
    exit_status: Option<u32>,
    log: Log,
}

#[async_trait]
impl ProxyChannel for FakeChannel {
    async fn read_chunk(&mut self) -> SshResult<Vec<u8>> {
        Ok(self.output.pop_front().unwrap_or_default())
    }

    async fn write_all(&mut self, data: &[u8]) -> SshResult<()> {
        push(&self.log, format!("write {}", String::from_utf8_lossy(data)));
        Ok(())
    }

    async fn resize(&mut self, size: TermSize) -> SshResult<()> {
        push(&self.log, format!("resize {size}"));
        Ok(())
    }

    async fn send_eof(&mut self) -> SshResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> SshResult<()> {
        push(&self.log, "close channel");
        Ok(())
    }

    fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }
}

#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub enum FailAt {
    #[default]
    Nowhere,
    Connect,
    Auth,
}

pub struct FakeBackend {
    pub output: Vec<&'static str>,
    pub exit_status: Option<u32>,
    pub fail_at: FailAt,
    pub log: Log,
}

impl FakeBackend {
    pub fn new(log: &Log) -> Self {
        Self {
            output: vec!["welcome\r\n"],
            exit_status: Some(0),
            fail_at: FailAt::Nowhere,
            log: log.clone(),
        }
    }
}

#[async_trait]
impl SshBackend for FakeBackend {
    type Channel = FakeChannel;

    async fn connect(&mut self, host: &str, port: u16) -> SshResult<()> {
        push(&self.log, format!("connect {host}:{port}"));
        if self.fail_at == FailAt::Connect {
            return Err(SshCoreError::ConnectionFailed {
                address: format!("{host}:{port}"),
                message: "connection refused".into(),
            });
        }
        Ok(())
    }

    async fn authenticate(&mut self, user: &str) -> SshResult<()> {
        push(&self.log, format!("auth {user}"));
        if self.fail_at == FailAt::Auth {
            return Err(SshCoreError::AuthExhausted {
                user: user.to_string(),
                address: "target".into(),
            });
        }
        Ok(())
    }

    async fn open(&mut self, dispatch: &Dispatch, size: TermSize, term: &str) -> SshResult<FakeChannel> {
        let what = match dispatch {
            Dispatch::Shell => "shell".to_string(),
            Dispatch::Exec(command) => format!("exec {command}"),
        };
        push(&self.log, format!("open {what} {size} {term}"));
        Ok(FakeChannel {
            output: self.output.iter().map(|chunk| chunk.as_bytes().to_vec()).collect(),
            exit_status: self.exit_status,
            log: self.log.clone(),
        })
    }

    async fn close_transport(&mut self) -> SshResult<()> {
        push(&self.log, "close transport");
        Ok(())
    }

    async fn close_socket(&mut self) -> SshResult<()> {
        push(&self.log, "close socket");
        Ok(())
    }
}

pub struct FakeTerminal {
    pub log: Log,
}

impl TerminalControl for FakeTerminal {
    fn enter_raw(&mut self) -> io::Result<()> {
        push(&self.log, "raw");
        Ok(())
    }

    fn restore(&mut self) -> io::Result<()> {
        push(&self.log, "restore");
        Ok(())
    }
}

/// Local output collected into a shared buffer.
#[derive(Clone, Default)]
pub struct Captured(pub Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl AsyncWrite for Captured {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

pub fn local_io(log: &Log, output: &Captured) -> LocalIo {
    LocalIo::new(
        Box::new(tokio::io::empty()),
        Box::new(output.clone()),
        Box::new(FakeTerminal { log: log.clone() }),
    )
}

/// Observer logging its hooks as `obs:<hook>`.
pub struct Tap {
    pub log: Log,
}

impl SessionObserver for Tap {
    fn on_start(&mut self, info: &SessionInfo) -> Result<(), ObserverError> {
        push(&self.log, format!("obs:start {}@{}:{}", info.user, info.host, info.port));
        Ok(())
    }

    fn on_stdin(&mut self, data: &[u8]) -> Result<(), ObserverError> {
        push(&self.log, format!("obs:in {}", String::from_utf8_lossy(data)));
        Ok(())
    }

    fn on_stop(&mut self) -> Result<(), ObserverError> {
        push(&self.log, "obs:stop");
        Ok(())
    }
}

/// Environment building fake backends that all share one log.
pub struct FakeEnv {
    pub log: Log,
    pub output: Captured,
    pub fail_at: FailAt,
    pub exit_status: Option<u32>,
    pub backends_built: usize,
}

impl FakeEnv {
    pub fn new(log: &Log) -> Self {
        Self {
            log: log.clone(),
            output: Captured::default(),
            fail_at: FailAt::Nowhere,
            exit_status: Some(0),
            backends_built: 0,
        }
    }
}

impl SessionEnvironment for FakeEnv {
    type Backend = FakeBackend;

    fn backend(&mut self) -> GatewayResult<FakeBackend> {
        self.backends_built += 1;
        let mut backend = FakeBackend::new(&self.log);
        backend.fail_at = self.fail_at;
        backend.exit_status = self.exit_status;
        Ok(backend)
    }

    fn local_io(&mut self) -> LocalIo {
        local_io(&self.log, &self.output)
    }

    fn observers(&mut self) -> ObserverChain {
        let mut chain = ObserverChain::new();
        chain.attach(Box::new(Tap { log: self.log.clone() }));
        chain
    }

    fn terminal_size(&self) -> TermSize {
        TermSize::new(120, 40)
    }
}

/// Provider returning a fixed grant, counting cache bypasses.
pub struct FixedProvider {
    pub hosts: Vec<&'static str>,
    pub reloads: Arc<Mutex<usize>>,
}

#[async_trait]
impl IdentityProvider for FixedProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn list_allowed(&mut self, from_cache: bool) -> GatewayResult<HostAccess> {
        if !from_cache {
            *self.reloads.lock().unwrap() += 1;
        }
        self.load_all_hosts().await?;
        Ok(HostAccess {
            allowed_hosts: self.hosts.iter().map(|host| host.to_string()).collect(),
            hostgroups: BTreeSet::from(["ops".to_string()]),
            from_cache,
        })
    }

    async fn load_all_hosts(&mut self) -> GatewayResult<()> {
        tokio::time::sleep(Duration::ZERO).await;
        Ok(())
    }
}

pub async fn user(name: &str, hosts: Vec<&'static str>) -> (UserContext, Arc<Mutex<usize>>) {
    let reloads = Arc::new(Mutex::new(0));
    let provider = FixedProvider {
        hosts,
        reloads: reloads.clone(),
    };
    let user = UserContext::load(name, Box::new(provider)).await.unwrap();
    (user, reloads)
}
