pub mod auth;
pub mod backend;
pub mod error;
pub mod hostkeys;

pub use auth::{AuthExecutor, AuthMethod, Authenticator, PasswordPrompter, TtyPrompter};
pub use backend::{BackendOptions, RusshBackend};
pub use error::{ClientError, ClientResult};
pub use hostkeys::{GatewayClientHandler, HostKeyPolicy};
