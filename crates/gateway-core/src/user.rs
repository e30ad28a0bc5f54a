use std::{collections::BTreeSet, sync::Arc};

use tracing::{info, instrument};

use crate::{
    cache::HostCache,
    config::GatewayConfig,
    error::GatewayResult,
    idp::{IdentityProvider, ProviderContext, ProviderRegistry},
};

/// The logged-in user and what it may reach.
pub struct UserContext {
    pub name: String,
    pub allowed_hosts: BTreeSet<String>,
    pub hostgroups: BTreeSet<String>,
    /// Whether the current grants were served from the cache.
    pub from_cache: bool,
    provider: Box<dyn IdentityProvider>,
}

impl UserContext {
    /// Resolve the configured provider for `username` and load its grants.
    #[instrument(skip(config, registry, cache))]
    pub async fn login(
        config: &GatewayConfig,
        registry: &ProviderRegistry,
        cache: Arc<HostCache>,
        username: &str,
    ) -> GatewayResult<Self> {
        let context = ProviderContext {
            user: username.to_string(),
            gateway_group: config.gateway_group.clone(),
            options: config.provider_options(&config.idp),
            cache,
        };
        let provider = registry.resolve(&config.idp, context)?;
        Self::load(username, provider).await
    }

    pub async fn load(name: &str, mut provider: Box<dyn IdentityProvider>) -> GatewayResult<Self> {
        let access = provider.list_allowed(true).await?;
        info!(
            user = name,
            provider = provider.name(),
            hosts = access.allowed_hosts.len(),
            from_cache = access.from_cache,
            "user context ready"
        );
        Ok(Self {
            name: name.to_string(),
            allowed_hosts: access.allowed_hosts,
            hostgroups: access.hostgroups,
            from_cache: access.from_cache,
            provider,
        })
    }

    /// Refresh the grants from the back end, bypassing the cache.
    pub async fn reload(&mut self) -> GatewayResult<()> {
        let access = self.provider.list_allowed(false).await?;
        info!(user = %self.name, hosts = access.allowed_hosts.len(), "user context reloaded");
        self.allowed_hosts = access.allowed_hosts;
        self.hostgroups = access.hostgroups;
        self.from_cache = access.from_cache;
        Ok(())
    }

    pub fn is_allowed(&self, host: &str) -> bool {
        self.allowed_hosts.iter().any(|allowed| allowed.eq_ignore_ascii_case(host))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}
