//! Provider granting the same configured host list to every user.

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::{HostAccess, IdentityProvider, ProviderContext, split_list};
use crate::error::GatewayResult;

pub const NAME: &str = "static";

pub struct StaticProvider {
    context: ProviderContext,
    hosts: BTreeSet<String>,
    hostgroups: BTreeSet<String>,
}

impl StaticProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self {
            context,
            hosts: BTreeSet::new(),
            hostgroups: BTreeSet::new(),
        }
    }

    pub fn factory(context: ProviderContext) -> GatewayResult<Box<dyn IdentityProvider>> {
        Ok(Box::new(Self::new(context)))
    }
}

#[async_trait]
impl IdentityProvider for StaticProvider {
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
        let access = HostAccess {
            allowed_hosts: self.hosts.clone(),
            hostgroups: self.hostgroups.clone(),
            from_cache: false,
        };
        self.context.remember(&access);
        Ok(access)
    }

    async fn load_all_hosts(&mut self) -> GatewayResult<()> {
        self.hosts = split_list(self.context.option("hosts"));
        self.hostgroups = split_list(self.context.option("hostgroups"));
        Ok(())
    }
}
