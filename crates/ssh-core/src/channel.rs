//! The remote half of the splice.

use async_trait::async_trait;
use russh::{ChannelMsg, client};
use tracing::{debug, trace};

use crate::{error::SshResult, terminal::TermSize};

/// Upper bound on a single remote read handed to observers and local output.
pub const READ_CHUNK: usize = 10 * 1024;

/// A session channel on the target, already dispatched (shell or exec).
#[async_trait]
pub trait ProxyChannel: Send {
    /// Next chunk of remote output, at most [`READ_CHUNK`] bytes.
    ///
    /// An empty chunk means the remote side closed. Must be cancel-safe: the
    /// loop drops the future whenever local input wins the race.
    async fn read_chunk(&mut self) -> SshResult<Vec<u8>>;

    async fn write_all(&mut self, data: &[u8]) -> SshResult<()>;

    async fn resize(&mut self, size: TermSize) -> SshResult<()>;

    async fn send_eof(&mut self) -> SshResult<()>;

    async fn close(&mut self) -> SshResult<()>;

    /// Exit status reported by the remote command, if any arrived.
    fn exit_status(&self) -> Option<u32>;
}

/// [`ProxyChannel`] over a russh client channel.
pub struct SshChannel {
    channel: russh::Channel<client::Msg>,
    pending: Vec<u8>,
    exit_status: Option<u32>,
    closed: bool,
}

impl SshChannel {
    pub fn new(channel: russh::Channel<client::Msg>) -> Self {
        Self {
            channel,
            pending: Vec::new(),
            exit_status: None,
            closed: false,
        }
    }

    fn take_pending(&mut self) -> Vec<u8> {
        if self.pending.len() <= READ_CHUNK {
            return std::mem::take(&mut self.pending);
        }
        let rest = self.pending.split_off(READ_CHUNK);
        std::mem::replace(&mut self.pending, rest)
    }
}

#[async_trait]
impl ProxyChannel for SshChannel {
    async fn read_chunk(&mut self) -> SshResult<Vec<u8>> {
        loop {
            if !self.pending.is_empty() {
                return Ok(self.take_pending());
            }
            if self.closed {
                return Ok(Vec::new());
            }
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => self.pending.extend_from_slice(&data),
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    trace!(ext, len = data.len(), "remote extended data");
                    self.pending.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!(exit_status, "remote command exited");
                    self.exit_status = Some(exit_status);
                }
                Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                    debug!(?signal_name, "remote command killed by signal");
                }
                Some(ChannelMsg::Eof) => debug!("remote sent EOF"),
                Some(ChannelMsg::Close) | None => self.closed = true,
                Some(other) => trace!(?other, "ignoring channel message"),
            }
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> SshResult<()> {
        self.channel.data(data).await?;
        Ok(())
    }

    async fn resize(&mut self, size: TermSize) -> SshResult<()> {
        let (cols, lines) = size.as_wire();
        self.channel.window_change(cols, lines, 0, 0).await?;
        Ok(())
    }

    async fn send_eof(&mut self) -> SshResult<()> {
        self.channel.eof().await?;
        Ok(())
    }

    async fn close(&mut self) -> SshResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.channel.close().await?;
        Ok(())
    }

    fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }
}
