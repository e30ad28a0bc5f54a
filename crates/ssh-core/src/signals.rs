//! OS signal delivery into the multiplexing loop.
//!
//! Native signals are turned into [`SessionSignal`] values on an unbounded
//! channel so the loop sees them as just another readiness source.

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

use crate::terminal::TermSize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionSignal {
    /// The local terminal changed size; the loop re-probes it.
    WindowChanged,
    /// Explicit resize, for callers without SIGWINCH.
    Resize(TermSize),
    /// An interrupt-class signal arrived and was neutralized.
    Interrupt(i32),
}

pub type SignalSender = UnboundedSender<SessionSignal>;
pub type SignalReceiver = UnboundedReceiver<SessionSignal>;

pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    unbounded_channel()
}

/// Background thread forwarding SIGWINCH/SIGINT/SIGQUIT/SIGTSTP.
///
/// Registering the handlers replaces the default disposition, which is what
/// keeps Ctrl-C from tearing the gateway down mid-session. The handlers are
/// unregistered when the watcher is dropped.
pub struct SignalWatcher {
    #[cfg(unix)]
    handle: signal_hook::iterator::Handle,
    #[cfg(unix)]
    thread: Option<std::thread::JoinHandle<()>>,
}

impl SignalWatcher {
    /// Best effort: returns `None` if handlers cannot be installed.
    #[cfg(unix)]
    pub fn install(tx: SignalSender) -> Option<Self> {
        use signal_hook::{
            consts::{SIGINT, SIGQUIT, SIGTSTP, SIGWINCH},
            iterator::Signals,
        };

        let mut signals = match Signals::new([SIGWINCH, SIGINT, SIGQUIT, SIGTSTP]) {
            Ok(signals) => signals,
            Err(err) => {
                warn!(?err, "signal handlers unavailable; terminal size will stay fixed");
                return None;
            }
        };
        let handle = signals.handle();
        let thread = std::thread::Builder::new()
            .name("sshgate-signals".into())
            .spawn(move || {
                for signal in signals.forever() {
                    let event = if signal == SIGWINCH {
                        SessionSignal::WindowChanged
                    } else {
                        SessionSignal::Interrupt(signal)
                    };
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            });
        match thread {
            Ok(thread) => Some(Self {
                handle,
                thread: Some(thread),
            }),
            Err(err) => {
                warn!(?err, "failed to spawn signal thread");
                handle.close();
                None
            }
        }
    }

    #[cfg(not(unix))]
    pub fn install(_tx: SignalSender) -> Option<Self> {
        debug!("no signal support on this platform; terminal size will stay fixed");
        None
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            self.handle.close();
            if let Some(thread) = self.thread.take()
                && thread.join().is_err()
            {
                debug!("signal thread panicked");
            }
        }
    }
}

/// Process-wide SIGINT/SIGQUIT/SIGTSTP neutralization.
///
/// Held for the whole gateway run so an interrupt outside the multiplexing
/// loop, such as at a password prompt, is logged instead of killing the
/// process. Handlers are registered with `SA_RESTART`, so blocking reads in
/// progress resume. Dropping the shield unregisters them.
pub struct InterruptShield {
    #[cfg(unix)]
    handle: signal_hook::iterator::Handle,
    #[cfg(unix)]
    thread: Option<std::thread::JoinHandle<()>>,
}

impl InterruptShield {
    #[cfg(unix)]
    pub fn install() -> std::io::Result<Self> {
        use signal_hook::{
            consts::{SIGINT, SIGQUIT, SIGTSTP},
            iterator::Signals,
        };

        let mut signals = Signals::new([SIGINT, SIGQUIT, SIGTSTP])?;
        let handle = signals.handle();
        let thread = std::thread::Builder::new()
            .name("sshgate-interrupts".into())
            .spawn(move || {
                for signal in signals.forever() {
                    debug!(signal, "interrupt ignored");
                }
            });
        match thread {
            Ok(thread) => Ok(Self {
                handle,
                thread: Some(thread),
            }),
            Err(err) => {
                handle.close();
                Err(err)
            }
        }
    }

    #[cfg(not(unix))]
    pub fn install() -> std::io::Result<Self> {
        debug!("no signal support on this platform; interrupts keep their default action");
        Ok(Self {})
    }
}

impl Drop for InterruptShield {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            self.handle.close();
            if let Some(thread) = self.thread.take()
                && thread.join().is_err()
            {
                debug!("interrupt thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn explicit_resize_travels_the_channel() {
        let (tx, mut rx) = signal_channel();
        tx.send(SessionSignal::Resize(TermSize::new(100, 30))).unwrap();
        assert_eq!(rx.recv().await, Some(SessionSignal::Resize(TermSize::new(100, 30))));
    }

    #[cfg(unix)]
    #[test]
    fn watcher_installs_and_drops_cleanly() {
        let (tx, _rx) = signal_channel();
        let watcher = SignalWatcher::install(tx);
        assert!(watcher.is_some());
        drop(watcher);
    }

    #[cfg(unix)]
    #[test]
    fn shielded_interrupt_does_not_kill_the_process() {
        let shield = InterruptShield::install().expect("install shield");
        signal_hook::low_level::raise(signal_hook::consts::SIGINT).expect("raise SIGINT");
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(shield);
    }
}
