//! Local side of the splice: the inbound session's stdin/stdout plus the
//! terminal and signal plumbing that goes with them.

use std::{
    io::{self, Stdin, Stdout},
    pin::Pin,
    task::{Context, Poll, ready},
};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, unix::AsyncFd};
use tracing::debug;

use crate::{
    signals::{SessionSignal, SignalReceiver, SignalSender, SignalWatcher, signal_channel},
    terminal::{StdinTerminal, TermSize, TerminalControl, current_size, size_from_env},
};

pub type LocalInput = Box<dyn AsyncRead + Send + Unpin>;
pub type LocalOutput = Box<dyn AsyncWrite + Send + Unpin>;
pub type SizeProbe = Box<dyn Fn() -> Option<TermSize> + Send>;

/// Everything the multiplexing loop needs from the local end.
pub struct LocalIo {
    pub input: LocalInput,
    pub output: LocalOutput,
    pub signals: SignalReceiver,
    pub size_probe: SizeProbe,
    terminal: Option<Box<dyn TerminalControl>>,
    sender: SignalSender,
    _watcher: Option<SignalWatcher>,
}

impl LocalIo {
    pub fn new(input: LocalInput, output: LocalOutput, terminal: Box<dyn TerminalControl>) -> Self {
        let (sender, signals) = signal_channel();
        Self {
            input,
            output,
            signals,
            size_probe: Box::new(|| current_size().or_else(size_from_env)),
            terminal: Some(terminal),
            sender,
            _watcher: None,
        }
    }

    /// Process stdin/stdout with SIGWINCH tracking and interrupt neutralization.
    pub fn stdio() -> Self {
        let input: LocalInput = match FdReader::new(io::stdin()) {
            Ok(reader) => Box::new(reader),
            Err(err) => {
                debug!(?err, "stdin is not pollable; using blocking reader");
                Box::new(tokio::io::stdin())
            }
        };
        let output: LocalOutput = match FdWriter::new(io::stdout()) {
            Ok(writer) => Box::new(writer),
            Err(err) => {
                debug!(?err, "stdout is not pollable; using blocking writer");
                Box::new(tokio::io::stdout())
            }
        };
        let mut local = Self::new(input, output, Box::new(StdinTerminal::new()));
        local._watcher = SignalWatcher::install(local.sender.clone());
        local
    }

    pub fn with_size_probe(mut self, probe: impl Fn() -> Option<TermSize> + Send + 'static) -> Self {
        self.size_probe = Box::new(probe);
        self
    }

    /// Hand the terminal over to whoever switches it to raw mode.
    pub fn take_terminal(&mut self) -> Option<Box<dyn TerminalControl>> {
        self.terminal.take()
    }

    /// Sender for explicit [`SessionSignal::Resize`] notifications.
    pub fn signal_sender(&self) -> SignalSender {
        self.sender.clone()
    }

    pub fn resize(&self, size: TermSize) {
        // The receiver lives as long as `self`, so this cannot fail while we hold it.
        let _ = self.sender.send(SessionSignal::Resize(size));
    }
}

/// Readiness-driven reader over a pollable descriptor.
pub struct FdReader {
    fd: AsyncFd<Stdin>,
}

impl FdReader {
    pub fn new(stdin: Stdin) -> io::Result<Self> {
        // SAFETY: the process stdin descriptor stays open for the process lifetime.
        let fd = unsafe { AsyncFd::register(stdin)? };
        Ok(Self { fd })
    }
}

impl AsyncRead for FdReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|fd| rustix::io::read(fd.get_ref(), &mut *unfilled).map_err(io::Error::from)) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) if err.kind() == io::ErrorKind::Interrupted => continue,
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

/// Readiness-driven writer over a pollable descriptor.
pub struct FdWriter {
    fd: AsyncFd<Stdout>,
}

impl FdWriter {
    pub fn new(stdout: Stdout) -> io::Result<Self> {
        // SAFETY: the process stdout descriptor stays open for the process lifetime.
        let fd = unsafe { AsyncFd::register(stdout)? };
        Ok(Self { fd })
    }
}

impl AsyncWrite for FdWriter {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.fd.poll_write_ready(cx))?;
            match guard.try_io(|fd| rustix::io::write(fd.get_ref(), buf).map_err(io::Error::from)) {
                Ok(Err(err)) if err.kind() == io::ErrorKind::Interrupted => continue,
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
