//! The resolved configuration record handed to every gateway component.
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use client_core::{BackendOptions, HostKeyPolicy};
use serde::Deserialize;

/// String options for one identity provider, e.g. `hosts_file` for `json`.
pub type ProviderOptions = BTreeMap<String, String>;

/// Gateway configuration. Every field has a default so partial files work.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Default log filter when `RUST_LOG` is unset (e.g. `info`, `debug`).
    pub log_level: String,
    /// Port sshd listens on for the gateway; recorded in audit logs.
    pub ssh_port: u16,
    /// Hostgroup a user must belong to before any host is granted.
    pub gateway_group: String,
    /// Identity provider name, resolved through the provider registry.
    pub idp: String,
    /// Gateway log file; stderr is used when it cannot be opened.
    pub log_file: Option<PathBuf>,
    /// Root directory for session recordings.
    pub session_log_dir: PathBuf,
    pub connect_timeout_secs: u64,
    /// SSH keepalive interval towards targets; 0 disables keepalives.
    pub keepalive_secs: u64,
    /// Private keys tried after the agent, in order. `~/` is expanded.
    pub identity_files: Vec<PathBuf>,
    pub host_key_policy: HostKeyPolicy,
    pub known_hosts: Option<PathBuf>,
    /// Shared host cache, persisted between gateway invocations when set.
    pub cache_file: Option<PathBuf>,
    pub cache_ttl_secs: u64,
    /// Re-check the allowed-hosts list for `host=` (forced command) sessions.
    pub direct_acl_check: bool,
    /// Offer SHA1 key exchange and CBC ciphers to old targets.
    pub legacy_crypto: bool,
    /// TERM value requested for the remote PTY.
    pub term: String,
    pub providers: BTreeMap<String, ProviderOptions>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            ssh_port: 22,
            gateway_group: "sshgate".to_string(),
            idp: "static".to_string(),
            log_file: Some(PathBuf::from("/var/log/sshgate/sshgate.log")),
            session_log_dir: PathBuf::from("/var/log/sshgate/sessions"),
            connect_timeout_secs: 10,
            keepalive_secs: 10,
            identity_files: vec![PathBuf::from("~/.ssh/id_ed25519"), PathBuf::from("~/.ssh/id_rsa")],
            host_key_policy: HostKeyPolicy::Accept,
            known_hosts: None,
            cache_file: None,
            cache_ttl_secs: 300,
            direct_acl_check: false,
            legacy_crypto: false,
            term: "xterm".to_string(),
            providers: BTreeMap::new(),
        }
    }
}

impl GatewayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn identity_paths(&self) -> Vec<PathBuf> {
        self.identity_files.iter().map(|path| expand_home(path)).collect()
    }

    pub fn provider_options(&self, name: &str) -> ProviderOptions {
        self.providers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, options)| options.clone())
            .unwrap_or_default()
    }

    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            connect_timeout: self.connect_timeout(),
            keepalive: (self.keepalive_secs > 0).then(|| Duration::from_secs(self.keepalive_secs)),
            legacy_crypto: self.legacy_crypto,
            host_key_policy: self.host_key_policy,
            known_hosts: self.known_hosts.as_deref().map(expand_home),
        }
    }
}

/// Expand a leading `~/` to the current user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
