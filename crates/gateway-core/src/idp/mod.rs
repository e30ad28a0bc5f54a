//! Identity providers: map a gateway user to the hosts it may reach.
//!
//! Providers are looked up by name in a [`ProviderRegistry`]. The built-in
//! set is registered by [`ProviderRegistry::with_builtin`]; deployments can
//! register additional factories before resolving.

pub mod json;
pub mod static_list;

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    cache::{CacheEntry, HostCache},
    config::ProviderOptions,
    error::{GatewayError, GatewayResult},
};

/// Hosts and hostgroups granted to one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostAccess {
    pub allowed_hosts: BTreeSet<String>,
    pub hostgroups: BTreeSet<String>,
    /// Whether this answer came from the cache rather than the back end.
    pub from_cache: bool,
}

/// Capability every provider implements in full.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Hosts and hostgroups for the bound user. With `from_cache` the shared
    /// cache is consulted first; without it the host map is reloaded and the
    /// cache entry rewritten.
    async fn list_allowed(&mut self, from_cache: bool) -> GatewayResult<HostAccess>;

    /// Repopulate the full host map from the back end.
    async fn load_all_hosts(&mut self) -> GatewayResult<()>;
}

/// Everything a provider is constructed with.
#[derive(Clone)]
pub struct ProviderContext {
    pub user: String,
    pub gateway_group: String,
    pub options: ProviderOptions,
    pub cache: Arc<HostCache>,
}

impl ProviderContext {
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn cached(&self) -> Option<HostAccess> {
        self.cache.get(&self.user).map(|entry| HostAccess {
            allowed_hosts: entry.allowed_hosts,
            hostgroups: entry.hostgroups,
            from_cache: true,
        })
    }

    pub fn remember(&self, access: &HostAccess) {
        self.cache.put(
            &self.user,
            CacheEntry::new(access.allowed_hosts.clone(), access.hostgroups.clone()),
        );
    }

    pub fn forget(&self) {
        self.cache.invalidate(&self.user);
    }
}

/// Split a comma separated option into trimmed, non-empty items.
pub(crate) fn split_list(value: Option<&str>) -> BTreeSet<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub type ProviderFactory = fn(ProviderContext) -> GatewayResult<Box<dyn IdentityProvider>>;

#[derive(Default)]
pub struct ProviderRegistry {
    factories: Vec<(String, ProviderFactory)>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(json::NAME, json::JsonProvider::factory);
        registry.register(static_list::NAME, static_list::StaticProvider::factory);
        registry
    }

    /// Register `factory` under `name`, replacing an earlier registration.
    pub fn register(&mut self, name: &str, factory: ProviderFactory) {
        let name = name.to_ascii_lowercase();
        self.factories.retain(|(existing, _)| *existing != name);
        self.factories.push((name, factory));
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Construct the provider registered as `name` (case-insensitive).
    pub fn resolve(&self, name: &str, context: ProviderContext) -> GatewayResult<Box<dyn IdentityProvider>> {
        let wanted = name.trim().to_ascii_lowercase();
        let Some((_, factory)) = self.factories.iter().find(|(name, _)| *name == wanted) else {
            return Err(GatewayError::ProviderNotFound(name.to_string()));
        };
        info!(provider = %wanted, user = %context.user, "loading identity provider");
        let provider = factory(context).map_err(|err| match err {
            load @ GatewayError::ProviderLoadError { .. } => load,
            other => GatewayError::load(&wanted, other),
        })?;
        debug!(provider = provider.name(), "identity provider ready");
        Ok(provider)
    }
}
