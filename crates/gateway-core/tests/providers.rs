use std::{collections::BTreeSet, sync::Arc, time::Duration};

use chrono::Utc;
use gateway_core::{
    CacheEntry, GatewayConfig, GatewayError, HostCache, ProviderContext, ProviderRegistry, UserContext, config::ProviderOptions,
};
use tempfile::TempDir;

const HOSTS: &str = r#"{
  "hosts": {
    "db1": ["dba"],
    "db2": ["dba", "backup"],
    "web1": ["web"],
    "bastion": ["sshgate"]
  },
  "users": {
    "alice": ["sshgate", "dba", "payroll"],
    "bob": ["web"],
    "carol": ["sshgate", "web"]
  }
}"#;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn hosts_file(contents: &str) -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts.json");
    std::fs::write(&path, contents).unwrap();
    let path = path.display().to_string();
    (dir, path)
}

fn json_context(user: &str, path: &str, cache: &Arc<HostCache>) -> ProviderContext {
    ProviderContext {
        user: user.to_string(),
        gateway_group: "sshgate".to_string(),
        options: ProviderOptions::from([("hosts_file".to_string(), path.to_string())]),
        cache: cache.clone(),
    }
}

fn cache() -> Arc<HostCache> {
    Arc::new(HostCache::new(Duration::from_secs(300)))
}

#[tokio::test]
async fn json_grants_hosts_sharing_a_group() {
    let (_dir, path) = hosts_file(HOSTS);
    let registry = ProviderRegistry::with_builtin();
    let mut provider = registry.resolve("json", json_context("alice", &path, &cache())).unwrap();

    let access = provider.list_allowed(true).await.unwrap();

    assert_eq!(access.allowed_hosts, set(&["db1", "db2"]));
    assert_eq!(access.hostgroups, set(&["dba"]));
    assert!(!access.from_cache);
}

#[tokio::test]
async fn json_requires_gateway_membership() {
    let (_dir, path) = hosts_file(HOSTS);
    let registry = ProviderRegistry::with_builtin();
    for user in ["bob", "mallory"] {
        let mut provider = registry.resolve("json", json_context(user, &path, &cache())).unwrap();
        let access = provider.list_allowed(false).await.unwrap();
        assert!(access.allowed_hosts.is_empty(), "{user} got {:?}", access.allowed_hosts);
        assert!(access.hostgroups.is_empty());
    }
}

#[tokio::test]
async fn cached_answers_survive_until_reload() {
    let (dir, path) = hosts_file(HOSTS);
    let cache = cache();
    let registry = ProviderRegistry::with_builtin();
    let mut provider = registry.resolve("json", json_context("carol", &path, &cache)).unwrap();
    assert_eq!(provider.list_allowed(true).await.unwrap().allowed_hosts, set(&["web1"]));

    std::fs::write(dir.path().join("hosts.json"), HOSTS.replace(r#""web1": ["web"]"#, r#""web2": ["web"]"#)).unwrap();

    let cached = provider.list_allowed(true).await.unwrap();
    assert!(cached.from_cache);
    assert_eq!(cached.allowed_hosts, set(&["web1"]));

    let fresh = provider.list_allowed(false).await.unwrap();
    assert!(!fresh.from_cache);
    assert_eq!(fresh.allowed_hosts, set(&["web2"]));
    assert_eq!(cache.get("carol").unwrap().allowed_hosts, set(&["web2"]));
}

#[tokio::test]
async fn json_problems_are_load_errors() {
    let registry = ProviderRegistry::with_builtin();
    let missing_option = ProviderContext {
        options: ProviderOptions::new(),
        ..json_context("alice", "", &cache())
    };
    assert!(matches!(
        registry.resolve("json", missing_option).err().unwrap(),
        GatewayError::ProviderLoadError { .. }
    ));

    let (_dir, path) = hosts_file("{ not json");
    let mut provider = registry.resolve("json", json_context("alice", &path, &cache())).unwrap();
    assert!(matches!(provider.list_allowed(true).await.unwrap_err(), GatewayError::ProviderLoadError { .. }));
}

#[tokio::test]
async fn login_resolves_the_configured_provider() {
    let config = GatewayConfig {
        idp: "Static".to_string(),
        providers: [(
            "static".to_string(),
            ProviderOptions::from([
                ("hosts".to_string(), "db1, web1".to_string()),
                ("hostgroups".to_string(), "ops".to_string()),
            ]),
        )]
        .into(),
        ..Default::default()
    };

    let mut user = UserContext::login(&config, &ProviderRegistry::with_builtin(), cache(), "dave").await.unwrap();

    assert_eq!(user.provider_name(), "static");
    assert_eq!(user.allowed_hosts, set(&["db1", "web1"]));
    assert_eq!(user.hostgroups, set(&["ops"]));
    assert!(user.is_allowed("WEB1"));
    assert!(!user.is_allowed("db2"));

    user.reload().await.unwrap();
    user.reload().await.unwrap();
    assert_eq!(user.allowed_hosts, set(&["db1", "web1"]));
    assert!(!user.from_cache);
}

#[tokio::test]
async fn unknown_provider_fails_login() {
    let config = GatewayConfig {
        idp: "ldap".to_string(),
        ..Default::default()
    };
    let err = UserContext::login(&config, &ProviderRegistry::with_builtin(), cache(), "dave")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, GatewayError::ProviderNotFound(name) if name == "ldap"));
}

#[test]
fn cache_entries_expire() {
    let cache = HostCache::new(Duration::from_secs(60));
    let mut stale = CacheEntry::new(set(&["db1"]), BTreeSet::new());
    stale.fetched_at = Utc::now() - chrono::Duration::seconds(120);
    cache.put("alice", stale);
    cache.put("bob", CacheEntry::new(set(&["web1"]), BTreeSet::new()));

    assert!(cache.get("alice").is_none());
    assert_eq!(cache.get("bob").unwrap().allowed_hosts, set(&["web1"]));
}

#[test]
fn invalidate_is_idempotent() {
    let cache = HostCache::new(Duration::from_secs(60));
    cache.put("alice", CacheEntry::new(set(&["db1"]), BTreeSet::new()));
    cache.invalidate("alice");
    cache.invalidate("alice");
    cache.invalidate("nobody");
    assert!(cache.get("alice").is_none());
}

#[test]
fn persistent_cache_is_shared_through_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache").join("hosts-cache.json");

    let first = HostCache::persistent(Duration::from_secs(60), &path);
    first.put("alice", CacheEntry::new(set(&["db1"]), set(&["dba"])));

    let second = HostCache::persistent(Duration::from_secs(60), &path);
    assert_eq!(second.get("alice").unwrap().hostgroups, set(&["dba"]));

    std::fs::write(&path, "garbage").unwrap();
    let third = HostCache::persistent(Duration::from_secs(60), &path);
    assert!(third.get("alice").is_none());
}
