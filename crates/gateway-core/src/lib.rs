pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod idp;
pub mod recorder;
pub mod session;
pub mod target;
pub mod user;

pub use cache::{CacheEntry, HostCache};
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use gateway::{GatewayCore, HostPicker, PickerAction, SessionEnvironment};
pub use idp::{HostAccess, IdentityProvider, ProviderContext, ProviderRegistry};
pub use recorder::SessionRecorder;
pub use session::{GatewaySession, SessionState, SessionSummary};
pub use target::{DirectTarget, LaunchMode};
pub use user::UserContext;
