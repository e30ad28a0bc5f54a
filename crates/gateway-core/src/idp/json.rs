//! Provider backed by a JSON document of hosts and users.
//!
//! ```json
//! {
//!   "hosts": { "db1": ["dba"], "web1": ["web", "dba"] },
//!   "users": { "alice": ["sshgate", "dba"] }
//! }
//! ```

use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{HostAccess, IdentityProvider, ProviderContext};
use crate::error::{GatewayError, GatewayResult};

pub const NAME: &str = "json";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HostMap {
    hosts: BTreeMap<String, BTreeSet<String>>,
    users: BTreeMap<String, BTreeSet<String>>,
}

pub struct JsonProvider {
    context: ProviderContext,
    path: PathBuf,
    map: HostMap,
}

impl JsonProvider {
    pub fn new(context: ProviderContext) -> GatewayResult<Self> {
        let path = context
            .option("hosts_file")
            .map(PathBuf::from)
            .ok_or_else(|| GatewayError::load(NAME, "missing option 'hosts_file'"))?;
        Ok(Self {
            context,
            path,
            map: HostMap::default(),
        })
    }

    pub fn factory(context: ProviderContext) -> GatewayResult<Box<dyn IdentityProvider>> {
        Ok(Box::new(Self::new(context)?))
    }

    fn resolve(&self) -> HostAccess {
        let ctx = &self.context;
        let Some(groups) = self.map.users.get(&ctx.user) else {
            return HostAccess::default();
        };
        if !groups.contains(&ctx.gateway_group) {
            debug!(user = %ctx.user, group = %ctx.gateway_group, "user is not a gateway member");
            return HostAccess::default();
        }

        let granting: BTreeSet<&String> = groups.iter().filter(|group| **group != ctx.gateway_group).collect();
        let allowed_hosts = self
            .map
            .hosts
            .iter()
            .filter(|(_, host_groups)| host_groups.iter().any(|group| granting.contains(group)))
            .map(|(host, _)| host.clone())
            .collect();
        let known: BTreeSet<&String> = self.map.hosts.values().flatten().collect();
        let hostgroups = granting.into_iter().filter(|group| known.contains(group)).cloned().collect();

        HostAccess {
            allowed_hosts,
            hostgroups,
            from_cache: false,
        }
    }
}

#[async_trait]
impl IdentityProvider for JsonProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_allowed(&mut self, from_cache: bool) -> GatewayResult<HostAccess> {
        if from_cache && let Some(hit) = self.context.cached() {
            return Ok(hit);
        }
        if !from_cache {
            self.context.forget();
        }
        self.load_all_hosts().await?;
        let access = self.resolve();
        self.context.remember(&access);
        Ok(access)
    }

    async fn load_all_hosts(&mut self) -> GatewayResult<()> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|err| GatewayError::load(NAME, format!("{}: {err}", self.path.display())))?;
        self.map = serde_json::from_str(&raw).map_err(|err| GatewayError::load(NAME, format!("{}: {err}", self.path.display())))?;
        debug!(path = %self.path.display(), hosts = self.map.hosts.len(), "host map loaded");
        Ok(())
    }
}
