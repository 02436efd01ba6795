pub mod cache;
pub mod check;
pub mod errors;
pub mod guard;
pub mod registry;
pub mod roles;

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

use crate::storage;
use cache::{MemoryPermissionCache, PermissionCache, UserPermissions, DEFAULT_PERMISSIONS_TTL};
use check::Actor;
use errors::RbacError;
use registry::{Action, Resource};

/// The authorization engine: permission resolution with a pluggable cache,
/// plus the role mutation guard (see `guard`). The cache adapter is an
/// explicit constructor dependency so tests can wire a fresh instance per
/// case instead of sharing hidden global state.
pub struct RbacService {
    db: DatabaseConnection,
    cache: Arc<dyn PermissionCache>,
    ttl: Duration,
}

impl RbacService {
    pub fn new(db: DatabaseConnection, cache: Arc<dyn PermissionCache>, ttl: Duration) -> Self {
        Self { db, cache, ttl }
    }

    /// Service with the default in-process adapter and TTL.
    pub fn with_memory_cache(db: DatabaseConnection) -> Self {
        Self::new(
            db,
            Arc::new(MemoryPermissionCache::new()),
            DEFAULT_PERMISSIONS_TTL,
        )
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Resolve a user's permission map, reading through the cache. A missing
    /// user or a user without a role yields an empty map, not an error.
    pub async fn user_permissions(&self, user_id: &str) -> Result<UserPermissions, RbacError> {
        match self.cache.get(user_id).await {
            Ok(Some(permissions)) => return Ok(permissions),
            Ok(None) => {}
            // A broken adapter degrades to a cache miss; authorization must
            // keep working off storage.
            Err(err) => tracing::warn!(%user_id, error = %err, "permission cache read failed"),
        }

        let permissions = match storage::find_user_with_role_and_permissions(&self.db, user_id)
            .await?
        {
            Some(access) => flatten_permissions(&access.permissions),
            None => UserPermissions::new(),
        };

        if let Err(err) = self
            .cache
            .set(user_id, permissions.clone(), self.ttl)
            .await
        {
            tracing::warn!(%user_id, error = %err, "permission cache write failed");
        }
        Ok(permissions)
    }

    /// Load the actor for a service-level check: identity, role key, and
    /// resolved permission map. `None` if the user does not exist.
    pub async fn load_actor(&self, user_id: &str) -> Result<Option<Actor>, RbacError> {
        let Some(access) =
            storage::find_user_with_role_and_permissions(&self.db, user_id).await?
        else {
            return Ok(None);
        };
        let permissions = flatten_permissions(&access.permissions);
        Ok(Some(Actor {
            id: access.user.id,
            role_key: access.role.map(|r| r.key).unwrap_or_default(),
            permissions,
        }))
    }

    /// Drop one user's cached permission map. Awaited by mutations before
    /// they report success, so a follow-up check cannot read stale data.
    pub async fn invalidate_user_permissions(&self, user_id: &str) {
        if let Err(err) = self.cache.delete(user_id).await {
            tracing::warn!(%user_id, error = %err, "permission cache invalidation failed");
        }
    }

    /// Drop the cached permission map of every user currently assigned to
    /// `role_id`. Required after a role's permission set changes, since many
    /// users may share the role.
    pub async fn invalidate_permissions_by_role(&self, role_id: &str) -> Result<(), RbacError> {
        let users = storage::find_users_by_role_id(&self.db, role_id).await?;
        for user in &users {
            self.invalidate_user_permissions(&user.id).await;
        }
        tracing::debug!(%role_id, users = users.len(), "invalidated cached permissions for role");
        Ok(())
    }
}

/// Flatten permission rows into the cached `Resource -> Action` map. Rows
/// that no longer parse against the registry are skipped with a warning;
/// `ensure_action_allowed` keeps new ones from being written.
fn flatten_permissions(rows: &[storage::Permission]) -> UserPermissions {
    let mut map = UserPermissions::new();
    for row in rows {
        match (Resource::parse(&row.resource), Action::parse(&row.action)) {
            (Some(resource), Some(action))
                if registry::ensure_action_allowed(resource, action).is_ok() =>
            {
                map.grant(resource, action);
            }
            _ => {
                tracing::warn!(
                    id = %row.id,
                    resource = %row.resource,
                    action = %row.action,
                    "skipping stale permission row"
                );
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, resource: &str, action: &str) -> storage::Permission {
        storage::Permission {
            id: id.into(),
            resource: resource.into(),
            action: action.into(),
        }
    }

    #[test]
    fn test_flatten_permissions() {
        let rows = vec![
            row("p1", "POST", "UPDATE"),
            row("p2", "POST", "READ"),
            row("p3", "MEDIA", "READ"),
        ];
        let map = flatten_permissions(&rows);
        assert!(map.allows(Resource::Post, Action::Update));
        assert!(map.allows(Resource::Media, Action::Read));
        assert!(!map.allows(Resource::Media, Action::Delete));
    }

    #[test]
    fn test_flatten_skips_stale_rows() {
        let rows = vec![
            row("p1", "WIDGET", "READ"),
            row("p2", "POST", "FROBNICATE"),
            row("p3", "ADMIN_ACCESS", "DELETE"),
            row("p4", "POST", "READ"),
        ];
        let map = flatten_permissions(&rows);
        assert!(map.allows(Resource::Post, Action::Read));
        assert!(!map.allows(Resource::AdminAccess, Action::Delete));
    }
}
