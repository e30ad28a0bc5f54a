pub mod backend;
pub mod channel;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod mux;
pub mod observer;
pub mod proxy;
pub mod signals;
pub mod stdio;
pub mod terminal;

pub use backend::{Dispatch, SshBackend};
pub use channel::{ProxyChannel, SshChannel};
pub use error::{SshCoreError, SshResult};
pub use observer::{ObserverChain, ObserverError, SessionInfo, SessionObserver};
pub use proxy::ProxyTransport;
pub use signals::InterruptShield;
pub use stdio::LocalIo;
pub use terminal::{TermSize, TerminalControl};
