//! Session observers: read-only taps on the bytes crossing the splice.

use std::net::SocketAddr;

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::terminal::TermSize;

/// Failure inside an observer hook. Always isolated by [`ObserverChain`].
#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("observer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("observer encoding error: {0}")]
    Encode(String),

    #[error("{0}")]
    Other(String),
}

/// Identity of the session an observer is attached to.
#[derive(Clone, Debug)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub user: String,
    pub host: String,
    pub port: u16,
    pub source: SocketAddr,
    pub size: TermSize,
}

/// Hooks invoked by the proxy for every session it drives.
///
/// Every hook has a no-op default, so an observer only implements what it
/// cares about. Observers receive borrowed bytes and can never alter what is
/// forwarded.
pub trait SessionObserver: Send {
    fn name(&self) -> &str {
        "observer"
    }

    /// Called once before any data flows, e.g. to open a recording destination.
    fn on_start(&mut self, _info: &SessionInfo) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Bytes read from the local user, before they are sent to the target.
    fn on_stdin(&mut self, _data: &[u8]) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Bytes read from the target, before they are written locally.
    fn on_channel_data(&mut self, _data: &[u8]) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_resize(&mut self, _size: TermSize) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_stop(&mut self) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Ordered set of observers for one session.
#[derive(Default)]
pub struct ObserverChain {
    observers: Vec<Box<dyn SessionObserver>>,
    stopped: bool,
}

impl ObserverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn start(&mut self, info: &SessionInfo) {
        self.each("start", |observer| observer.on_start(info));
    }

    pub fn stdin(&mut self, data: &[u8]) {
        self.each("stdin", |observer| observer.on_stdin(data));
    }

    pub fn channel_data(&mut self, data: &[u8]) {
        self.each("channel_data", |observer| observer.on_channel_data(data));
    }

    pub fn resize(&mut self, size: TermSize) {
        self.each("resize", |observer| observer.on_resize(size));
    }

    /// Invoke every stop hook. Later calls are no-ops.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.each("stop", |observer| observer.on_stop());
    }

    fn each(&mut self, hook: &'static str, mut call: impl FnMut(&mut dyn SessionObserver) -> Result<(), ObserverError>) {
        if self.stopped && hook != "stop" {
            return;
        }
        for observer in &mut self.observers {
            if let Err(err) = call(observer.as_mut()) {
                warn!(observer = observer.name(), hook, error = %err, "observer hook failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Tap {
        label: &'static str,
        log: Log,
        fail: bool,
    }

    impl SessionObserver for Tap {
        fn name(&self) -> &str {
            self.label
        }

        fn on_channel_data(&mut self, data: &[u8]) -> Result<(), ObserverError> {
            self.log.lock().unwrap().push(format!("{}:{}", self.label, String::from_utf8_lossy(data)));
            if self.fail {
                return Err(ObserverError::Other("boom".into()));
            }
            Ok(())
        }

        fn on_stop(&mut self) -> Result<(), ObserverError> {
            self.log.lock().unwrap().push(format!("{}:stop", self.label));
            if self.fail {
                return Err(ObserverError::Other("stop failed".into()));
            }
            Ok(())
        }
    }

    struct Silent;
    impl SessionObserver for Silent {}

    fn chain(log: &Log) -> ObserverChain {
        let mut chain = ObserverChain::new();
        chain.attach(Box::new(Tap {
            label: "a",
            log: log.clone(),
            fail: true,
        }));
        chain.attach(Box::new(Silent));
        chain.attach(Box::new(Tap {
            label: "b",
            log: log.clone(),
            fail: false,
        }));
        chain
    }

    #[test]
    fn failing_observer_does_not_block_later_ones() {
        let log = Log::default();
        let mut chain = chain(&log);
        chain.channel_data(b"hi");
        assert_eq!(*log.lock().unwrap(), vec!["a:hi", "b:hi"]);
    }

    #[test]
    fn stop_runs_every_hook_once() {
        let log = Log::default();
        let mut chain = chain(&log);
        chain.stop();
        chain.stop();
        chain.channel_data(b"late");
        assert_eq!(*log.lock().unwrap(), vec!["a:stop", "b:stop"]);
    }

    #[test]
    fn missing_hooks_are_no_ops() {
        let mut chain = ObserverChain::new();
        chain.attach(Box::new(Silent));
        chain.stdin(b"x");
        chain.resize(TermSize::new(1, 1));
        chain.stop();
        assert_eq!(chain.len(), 1);
    }
}
