//! Bidirectional splice between the local stdio and a remote channel.

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

use crate::{
    channel::ProxyChannel,
    error::SshResult,
    observer::ObserverChain,
    signals::SessionSignal,
    stdio::LocalIo,
    terminal::TermSize,
};

const INPUT_CHUNK: usize = 4096;

/// Pump bytes both ways until the remote channel closes.
///
/// Remote output is handed to the observers before it is written locally and
/// no further remote read is issued until that output is fully written. Local
/// EOF is forwarded to the target once; the loop keeps draining remote output
/// afterwards. `size` tracks the last size pushed to the remote PTY.
pub async fn splice<C>(channel: &mut C, local: &mut LocalIo, observers: &mut ObserverChain, size: &mut TermSize) -> SshResult<()>
where
    C: ProxyChannel + ?Sized,
{
    let mut input_buf = vec![0u8; INPUT_CHUNK];
    let mut pending: Vec<u8> = Vec::new();
    let mut written = 0usize;
    let mut input_open = true;
    let mut signals_open = true;

    loop {
        tokio::select! {
            chunk = channel.read_chunk(), if pending.is_empty() => {
                let chunk = chunk?;
                if chunk.is_empty() {
                    debug!("remote channel closed");
                    return Ok(());
                }
                observers.channel_data(&chunk);
                pending = chunk;
                written = 0;
            }
            result = local.output.write(&pending[written..]), if !pending.is_empty() => {
                match result {
                    Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                    Ok(n) => {
                        written += n;
                        if written == pending.len() {
                            pending.clear();
                            written = 0;
                            flush(&mut local.output).await?;
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => trace!("local output would block; retrying"),
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                    Err(err) => return Err(err.into()),
                }
            }
            read = local.input.read(&mut input_buf), if input_open => {
                match read {
                    Ok(0) => {
                        debug!("local input closed; sending EOF to target");
                        input_open = false;
                        channel.send_eof().await?;
                    }
                    Ok(n) => {
                        let data = &input_buf[..n];
                        observers.stdin(data);
                        channel.write_all(data).await?;
                    }
                    Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {}
                    Err(err) => return Err(err.into()),
                }
            }
            signal = local.signals.recv(), if signals_open => {
                match signal {
                    Some(SessionSignal::WindowChanged) => {
                        if let Some(new_size) = (local.size_probe)() {
                            apply_resize(channel, observers, size, new_size).await?;
                        }
                    }
                    Some(SessionSignal::Resize(new_size)) => apply_resize(channel, observers, size, new_size).await?,
                    Some(SessionSignal::Interrupt(signal)) => debug!(signal, "interrupt ignored during active session"),
                    None => signals_open = false,
                }
            }
        }
    }
}

async fn apply_resize<C>(channel: &mut C, observers: &mut ObserverChain, size: &mut TermSize, new_size: TermSize) -> SshResult<()>
where
    C: ProxyChannel + ?Sized,
{
    trace!(%new_size, "propagating terminal resize");
    channel.resize(new_size).await?;
    *size = new_size;
    observers.resize(new_size);
    Ok(())
}

async fn flush(output: &mut crate::stdio::LocalOutput) -> io::Result<()> {
    loop {
        match output.flush().await {
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => tokio::task::yield_now().await,
            other => return other,
        }
    }
}
