//! Credential resolution for the outbound connection.
//!
//! Methods are tried in a fixed order: every key held by a running agent,
//! then each configured private-key file that opens without a passphrase,
//! then an interactive password prompt. A rejected method never aborts the
//! chain; only running out of methods does.

use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use russh::{
    client,
    keys::{self, HashAlg, PrivateKeyWithHashAlg},
};
use secrecy::{ExposeSecret, SecretString};
use ssh_core::keys::{KeyLoad, load_private_key_from_str};
use tokio::{fs, task};
use tracing::{debug, info, warn};

use crate::{ClientError, ClientResult};

/// The method that ended up authenticating the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    Agent,
    KeyFile(PathBuf),
    Password,
}

impl AuthMethod {
    pub fn label(&self) -> &'static str {
        match self {
            AuthMethod::Agent => "agent",
            AuthMethod::KeyFile(_) => "publickey",
            AuthMethod::Password => "password",
        }
    }
}

/// Performs individual authentication attempts against the target.
///
/// `Ok(false)` means the server rejected the credential; errors are treated
/// the same way by the chain.
#[async_trait]
pub trait AuthExecutor: Send {
    /// Offer every identity held by the agent at `socket`, stopping at the first accepted one.
    async fn via_agent(&mut self, user: &str, socket: &Path) -> ClientResult<bool>;

    async fn via_key(&mut self, user: &str, key: keys::PrivateKey) -> ClientResult<bool>;

    async fn via_password(&mut self, user: &str, password: SecretString) -> ClientResult<bool>;
}

/// Source of the last-resort password.
#[async_trait]
pub trait PasswordPrompter: Send + Sync {
    /// `None` when no password can be obtained (no terminal, user gave up).
    async fn prompt(&self, user: &str, address: &str) -> ClientResult<Option<SecretString>>;
}

/// Prompts on the controlling terminal without echo.
pub struct TtyPrompter;

#[async_trait]
impl PasswordPrompter for TtyPrompter {
    async fn prompt(&self, user: &str, address: &str) -> ClientResult<Option<SecretString>> {
        let prompt = format!("{user}@{address}'s password: ");
        let answer = task::spawn_blocking(move || rpassword::prompt_password(prompt))
            .await
            .map_err(|e| ClientError::Other(format!("task join error: {e}")))?;
        match answer {
            Ok(password) => Ok(Some(SecretString::new(password.into_boxed_str()))),
            Err(err) => {
                debug!(?err, "password prompt unavailable");
                Ok(None)
            }
        }
    }
}

/// Ordered credential fallback chain.
pub struct Authenticator {
    agent_socket: Option<PathBuf>,
    identity_files: Vec<PathBuf>,
    prompter: Option<Arc<dyn PasswordPrompter>>,
}

impl Authenticator {
    /// Agent from `SSH_AUTH_SOCK`, the given key files, terminal prompt last.
    pub fn new(identity_files: Vec<PathBuf>) -> Self {
        Self {
            agent_socket: env::var_os("SSH_AUTH_SOCK").filter(|s| !s.is_empty()).map(PathBuf::from),
            identity_files,
            prompter: Some(Arc::new(TtyPrompter)),
        }
    }

    pub fn with_agent_socket(mut self, socket: Option<PathBuf>) -> Self {
        self.agent_socket = socket;
        self
    }

    pub fn with_prompter(mut self, prompter: Option<Arc<dyn PasswordPrompter>>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn identity_files(&self) -> &[PathBuf] {
        &self.identity_files
    }

    pub async fn authenticate<E>(&self, exec: &mut E, user: &str, address: &str) -> ClientResult<AuthMethod>
    where
        E: AuthExecutor + ?Sized,
    {
        if let Some(socket) = &self.agent_socket {
            if outcome(AuthMethod::Agent, exec.via_agent(user, socket).await) {
                return Ok(AuthMethod::Agent);
            }
        } else {
            debug!("no agent socket; skipping agent authentication");
        }

        for path in &self.identity_files {
            let Some(key) = read_key_file(path).await else {
                continue;
            };
            let method = AuthMethod::KeyFile(path.clone());
            if outcome(method.clone(), exec.via_key(user, key).await) {
                return Ok(method);
            }
        }

        if let Some(prompter) = &self.prompter {
            match prompter.prompt(user, address).await {
                Ok(Some(password)) => {
                    if outcome(AuthMethod::Password, exec.via_password(user, password).await) {
                        return Ok(AuthMethod::Password);
                    }
                }
                Ok(None) => debug!("no password supplied"),
                Err(err) => warn!(error = %err, "password prompt failed"),
            }
        }

        Err(ClientError::AuthExhausted {
            user: user.to_string(),
            address: address.to_string(),
        })
    }
}

fn outcome(method: AuthMethod, result: ClientResult<bool>) -> bool {
    match result {
        Ok(true) => {
            info!(method = method.label(), "authentication succeeded");
            true
        }
        Ok(false) => {
            warn!(method = method.label(), "authentication rejected by server");
            false
        }
        Err(err) => {
            warn!(method = method.label(), error = %err, "authentication attempt failed");
            false
        }
    }
}

async fn read_key_file(path: &Path) -> Option<keys::PrivateKey> {
    let data = match fs::read_to_string(path).await {
        Ok(data) => data,
        Err(err) => {
            debug!(path = %path.display(), ?err, "identity file not readable");
            return None;
        }
    };
    match load_private_key_from_str(&data) {
        Ok(KeyLoad::Loaded(key)) => Some(key),
        Ok(KeyLoad::Encrypted) => {
            info!(path = %path.display(), "identity file needs a passphrase; skipping");
            None
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "identity file could not be parsed");
            None
        }
    }
}

async fn rsa_hint<H>(handle: &client::Handle<H>) -> Option<HashAlg>
where
    H: client::Handler,
{
    handle.best_supported_rsa_hash().await.unwrap_or(None).flatten()
}

#[async_trait]
impl<H> AuthExecutor for client::Handle<H>
where
    H: client::Handler,
{
    async fn via_agent(&mut self, user: &str, socket: &Path) -> ClientResult<bool> {
        #[cfg(not(unix))]
        {
            let _ = (user, socket);
            warn!("agent authentication is not supported on this platform");
            return Ok(false);
        }

        #[cfg(unix)]
        {
            use tokio::net::UnixStream;

            let stream = UnixStream::connect(socket).await?;
            let mut agent = keys::agent::client::AgentClient::connect(stream);
            let identities = agent
                .request_identities()
                .await
                .map_err(|e| ClientError::Other(format!("failed to list identities from SSH agent: {e}")))?;
            debug!(count = identities.len(), "offering agent identities");

            let hint = rsa_hint(self).await;
            for key in identities {
                let hash_alg = if key.algorithm().is_rsa() { hint } else { None };
                match self.authenticate_publickey_with(user, key, hash_alg, &mut agent).await {
                    Ok(result) if result.success() => return Ok(true),
                    Ok(_) => continue,
                    Err(err) => debug!(error = ?err, "agent signature failed"),
                }
            }
            Ok(false)
        }
    }

    async fn via_key(&mut self, user: &str, key: keys::PrivateKey) -> ClientResult<bool> {
        let hash_alg = if key.algorithm().is_rsa() { rsa_hint(self).await } else { None };
        let key = PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg);
        Ok(self.authenticate_publickey(user, key).await?.success())
    }

    async fn via_password(&mut self, user: &str, password: SecretString) -> ClientResult<bool> {
        Ok(self
            .authenticate_password(user, password.expose_secret().to_string())
            .await?
            .success())
    }
}
