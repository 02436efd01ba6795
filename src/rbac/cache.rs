use async_trait::async_trait;
use dashmap::DashMap;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::rbac::registry::{Action, Resource};

/// Default lifetime of a cached permission map. Explicit invalidation is the
/// primary freshness mechanism; the TTL is a fallback safety net.
pub const DEFAULT_PERMISSIONS_TTL: Duration = Duration::from_secs(300);

/// The resolved permission map for one user: which actions they hold on each
/// resource. Derived by flattening the permission records of the user's role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermissions(HashMap<Resource, HashSet<Action>>);

impl UserPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, resource: Resource, action: Action) {
        self.0.entry(resource).or_default().insert(action);
    }

    pub fn allows(&self, resource: Resource, action: Action) -> bool {
        self.0.get(&resource).is_some_and(|set| set.contains(&action))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("permission cache unavailable: {0}")]
#[diagnostic(code(lodestone::rbac::cache_unavailable))]
pub struct CacheError(pub String);

/// Pluggable store for resolved permission maps, keyed by user id. Swappable
/// for a distributed cache; the engine treats adapter failures as cache
/// misses, never as authorization failures.
#[async_trait]
pub trait PermissionCache: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<UserPermissions>, CacheError>;
    async fn set(
        &self,
        user_id: &str,
        permissions: UserPermissions,
        ttl: Duration,
    ) -> Result<(), CacheError>;
    async fn delete(&self, user_id: &str) -> Result<(), CacheError>;
}

#[derive(Debug)]
struct CacheEntry {
    permissions: UserPermissions,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process default adapter. Expired entries are evicted lazily on read, so
/// the adapter does no work while idle.
#[derive(Debug, Default)]
pub struct MemoryPermissionCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryPermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl PermissionCache for MemoryPermissionCache {
    async fn get(&self, user_id: &str) -> Result<Option<UserPermissions>, CacheError> {
        if let Some(entry) = self.entries.get(user_id) {
            if !entry.is_expired() {
                return Ok(Some(entry.permissions.clone()));
            }
        } else {
            return Ok(None);
        }
        // Entry exists but expired; drop the read guard before removing.
        self.entries.remove(user_id);
        Ok(None)
    }

    async fn set(
        &self,
        user_id: &str,
        permissions: UserPermissions,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries.insert(
            user_id.to_string(),
            CacheEntry {
                permissions,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<(), CacheError> {
        self.entries.remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_permissions() -> UserPermissions {
        let mut p = UserPermissions::new();
        p.grant(Resource::Post, Action::Update);
        p.grant(Resource::Post, Action::Read);
        p
    }

    #[test]
    fn test_user_permissions_allows() {
        let p = sample_permissions();
        assert!(p.allows(Resource::Post, Action::Update));
        assert!(!p.allows(Resource::Post, Action::Delete));
        assert!(!p.allows(Resource::User, Action::Read));
        assert!(!UserPermissions::new().allows(Resource::Post, Action::Read));
    }

    #[tokio::test]
    async fn test_memory_cache_set_get_delete() {
        let cache = MemoryPermissionCache::new();
        assert!(cache.get("u1").await.unwrap().is_none());

        cache
            .set("u1", sample_permissions(), Duration::from_secs(60))
            .await
            .unwrap();
        let got = cache.get("u1").await.unwrap().unwrap();
        assert!(got.allows(Resource::Post, Action::Update));

        cache.delete("u1").await.unwrap();
        assert!(cache.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_cache_lazy_ttl_eviction() {
        let cache = MemoryPermissionCache::new();
        cache
            .set("u1", sample_permissions(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);

        // Expired entry is treated as absent and evicted by the read itself.
        assert!(cache.get("u1").await.unwrap().is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_memory_cache_entries_are_independent() {
        let cache = MemoryPermissionCache::new();
        cache
            .set("u1", sample_permissions(), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set("u2", UserPermissions::new(), Duration::from_secs(60))
            .await
            .unwrap();

        cache.delete("u1").await.unwrap();
        assert!(cache.get("u1").await.unwrap().is_none());
        assert!(cache.get("u2").await.unwrap().is_some());
    }
}
