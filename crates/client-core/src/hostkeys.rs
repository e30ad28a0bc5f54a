use std::path::PathBuf;

use russh::keys::{self, HashAlg, PublicKey};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{ClientError, ClientResult};

/// How target host keys are verified.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Accept any key, logging its fingerprint.
    #[default]
    Accept,
    /// Verify against known_hosts, learning keys for hosts not yet listed.
    AcceptNew,
    /// Only keys already present in known_hosts are accepted.
    Strict,
}

/// Default known_hosts location for the gateway account.
pub fn default_known_hosts() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts"))
}

/// russh client handler for the outbound leg; only host key checking is customized.
pub struct GatewayClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts: Option<PathBuf>,
}

impl GatewayClientHandler {
    pub fn new(host: impl Into<String>, port: u16, policy: HostKeyPolicy, known_hosts: Option<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
            known_hosts: known_hosts.or_else(default_known_hosts),
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn reject(&self, reason: impl Into<String>) -> ClientError {
        ClientError::HostKeyRejected {
            address: self.address(),
            reason: reason.into(),
        }
    }

    pub fn verify(&self, key: &PublicKey) -> ClientResult<bool> {
        let fingerprint = key.fingerprint(HashAlg::Sha256);
        if self.policy == HostKeyPolicy::Accept {
            warn!(
                host = %self.host,
                port = self.port,
                algorithm = %key.algorithm(),
                %fingerprint,
                "accepting target host key without verification"
            );
            return Ok(true);
        }

        let Some(path) = &self.known_hosts else {
            return Err(self.reject("no known_hosts file available"));
        };
        match keys::check_known_hosts_path(&self.host, self.port, key, path) {
            Ok(true) => Ok(true),
            Ok(false) if self.policy == HostKeyPolicy::AcceptNew => {
                keys::known_hosts::learn_known_hosts_path(&self.host, self.port, key, path)
                    .map_err(|err| self.reject(format!("failed to record new key: {err}")))?;
                info!(host = %self.host, port = self.port, %fingerprint, path = %path.display(), "learned new host key");
                Ok(true)
            }
            Ok(false) => Err(self.reject(format!("unknown host key {fingerprint}"))),
            Err(keys::Error::KeyChanged { line }) => Err(self.reject(format!(
                "host key changed (known_hosts line {line}), presented {fingerprint}"
            ))),
            Err(err) => Err(self.reject(err.to_string())),
        }
    }
}

impl russh::client::Handler for GatewayClientHandler {
    type Error = ClientError;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl std::future::Future<Output = std::result::Result<bool, Self::Error>> + Send {
        let verdict = self.verify(server_public_key);
        async move { verdict }
    }
}
