use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use gateway_core::{GatewayConfig, LaunchMode, target::source_from_ssh_client};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/sshgate/sshgate.yaml";

#[derive(Debug, Parser)]
#[command(name = "sshgate", about = "SSH bastion: pick an allowed host and proxy the session to it")]
pub struct GateArgs {
    /// Gateway configuration file (YAML)
    #[arg(short = 'c', long, env = "SSHGATE_CONFIG", value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    /// Override the configured log file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
    /// Override the configured log level (RUST_LOG still wins)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
    /// Command the client asked for; set by sshd for forced commands
    #[arg(long = "original-command", env = "SSH_ORIGINAL_COMMAND", value_name = "COMMAND", hide_env_values = true)]
    pub original_command: Option<String>,
    /// Inbound connection as `ip port serverport`; set by sshd
    #[arg(long = "ssh-client", env = "SSH_CLIENT", value_name = "ADDR", hide = true)]
    pub ssh_client: Option<String>,
}

impl GateArgs {
    /// Load the configuration file and apply command-line overrides.
    /// Returns whether the file existed.
    pub fn resolve_config(&self) -> Result<(GatewayConfig, bool)> {
        let (mut config, found) = match load_config(&self.config)? {
            Some(config) => (config, true),
            None => (GatewayConfig::default(), false),
        };
        if let Some(path) = &self.log_file {
            config.log_file = Some(path.clone());
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        Ok((config, found))
    }

    pub fn launch_mode(&self) -> Result<LaunchMode> {
        LaunchMode::parse(self.original_command.as_deref()).context("could not parse the requested target")
    }

    pub fn source(&self) -> SocketAddr {
        source_from_ssh_client(self.ssh_client.as_deref())
    }
}

/// Parse a YAML config file. `None` when the file does not exist.
pub fn load_config(path: &Path) -> Result<Option<GatewayConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Some(GatewayConfig::default()));
    }
    let config = serde_yaml::from_str(&raw).with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(Some(config))
}
