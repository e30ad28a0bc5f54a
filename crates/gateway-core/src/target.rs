//! Parsing of what the SSH daemon hands the forced command.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::{GatewayError, GatewayResult};

pub const DEFAULT_PORT: u16 = 22;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectTarget {
    pub host: String,
    pub port: u16,
    /// Command to run on the target; `None` starts a shell.
    pub command: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// No target given: show the host picker.
    Interactive,
    Direct(DirectTarget),
}

impl LaunchMode {
    /// Parse `SSH_ORIGINAL_COMMAND`. Without a `host=` token the gateway runs
    /// interactively.
    pub fn parse(original: Option<&str>) -> GatewayResult<Self> {
        let Some(original) = original else {
            return Ok(LaunchMode::Interactive);
        };

        let mut host = None;
        let mut port = None;
        let mut rest = Vec::new();
        for token in original.split_whitespace() {
            if let Some(value) = token.strip_prefix("host=") {
                host = Some(value);
            } else if let Some(value) = token.strip_prefix("port=") {
                port = Some(value);
            } else {
                rest.push(token);
            }
        }

        let Some(host) = host else {
            return Ok(LaunchMode::Interactive);
        };
        if host.is_empty() {
            return Err(GatewayError::invalid_target("empty host= value"));
        }
        let port = match port {
            None => DEFAULT_PORT,
            Some(raw) => match raw.parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => return Err(GatewayError::invalid_target(format!("bad port '{raw}'"))),
            },
        };
        let command = (!rest.is_empty()).then(|| rest.join(" "));

        Ok(LaunchMode::Direct(DirectTarget {
            host: host.to_string(),
            port,
            command,
        }))
    }
}

/// Source address from `SSH_CLIENT` (`ip port serverport`).
pub fn source_from_ssh_client(value: Option<&str>) -> SocketAddr {
    let unknown = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
    let Some(value) = value else {
        return unknown;
    };
    let mut parts = value.split_whitespace();
    let ip = parts.next().and_then(|ip| ip.parse::<IpAddr>().ok());
    let port = parts.next().and_then(|port| port.parse::<u16>().ok()).unwrap_or(0);
    ip.map(|ip| SocketAddr::new(ip, port)).unwrap_or(unknown)
}
