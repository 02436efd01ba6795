use sea_orm::{ConnectionTrait, TransactionTrait};
use serde_json::json;

use crate::rbac::check::can;
use crate::rbac::errors::RbacError;
use crate::rbac::registry::{
    ensure_action_allowed, is_super_admin_only_resource, Action, Resource,
};
use crate::rbac::roles::{
    builtin_role, is_super_admin_role, DEFAULT_FALLBACK_ROLE_KEY, SUPER_ADMIN_ROLE_KEY,
};
use crate::rbac::RbacService;
use crate::storage::{self, AuditEntry, NewRole, Permission, Role, RoleWithPermissions};

#[derive(Debug, Clone)]
pub struct CreateRoleInput {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub permission_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateRoleInput {
    pub name: String,
    pub description: Option<String>,
    pub permission_ids: Vec<String>,
}

/// How to handle users still assigned to a role being deleted.
#[derive(Debug, Clone, Default)]
pub enum RoleFallback {
    /// Migrate affected users to the built-in default fallback role.
    #[default]
    Default,
    /// Migrate affected users to this role id.
    Explicit(String),
    /// Refuse deletion while users remain assigned.
    Deny,
}

impl RbacService {
    /// Create a role with the submitted permission set. No cache invalidation
    /// is needed: no user can reference a brand-new role yet.
    pub async fn create_role(
        &self,
        input: CreateRoleInput,
        actor_id: &str,
    ) -> Result<RoleWithPermissions, RbacError> {
        let actor_is_super = self.actor_is_super_admin(actor_id).await?;

        let txn = self.db().begin().await?;

        if storage::find_role_by_key(&txn, &input.key).await?.is_some() {
            return Err(RbacError::RoleKeyExists { key: input.key });
        }
        if input.is_system && !actor_is_super {
            return Err(RbacError::CannotCreateSystemRole);
        }
        ensure_name_available(&txn, &input.name, None).await?;

        let permissions =
            validate_permission_selection(&txn, &input.permission_ids, actor_is_super).await?;

        let role = storage::create_role(
            &txn,
            NewRole {
                key: input.key,
                name: input.name,
                description: input.description,
                is_system: input.is_system,
            },
        )
        .await?;
        // Validated rows are unique even if the submitted id list repeats
        let link_ids: Vec<String> = permissions.iter().map(|p| p.id.clone()).collect();
        storage::set_role_permissions(&txn, &role.id, &link_ids).await?;

        audit(
            &txn,
            AuditEntry {
                actor_id: actor_id.to_string(),
                action: "role.create".to_string(),
                entity_type: "role".to_string(),
                entity_id: role.id.clone(),
                details: json!({
                    "key": role.key.clone(),
                    "name": role.name.clone(),
                    "is_system": role.is_system(),
                    "permissions": permission_keys(&permissions),
                }),
            },
        )
        .await;

        txn.commit().await?;
        Ok(RoleWithPermissions { role, permissions })
    }

    /// Update a role's name, description, and permission set. The permission
    /// set is replaced wholesale; affected users' cached permissions are
    /// invalidated before this returns.
    pub async fn update_role(
        &self,
        role_id: &str,
        input: UpdateRoleInput,
        actor_id: &str,
    ) -> Result<RoleWithPermissions, RbacError> {
        let actor_is_super = self.actor_is_super_admin(actor_id).await?;

        let txn = self.db().begin().await?;

        let role = storage::find_role_by_id(&txn, role_id)
            .await?
            .ok_or_else(|| RbacError::NotFound {
                entity: "role",
                id: role_id.to_string(),
            })?;
        // System roles are edit-locked for non-super-admins unconditionally,
        // even when the update would not touch permissions.
        if role.is_system() && !actor_is_super {
            return Err(RbacError::CannotEditSystemRole);
        }
        ensure_name_available(&txn, &input.name, Some(&role.id)).await?;

        let permissions =
            validate_permission_selection(&txn, &input.permission_ids, actor_is_super).await?;

        let before = storage::find_role_permissions(&txn, &role.id).await?;
        storage::update_role_meta(&txn, &role.id, &input.name, input.description.as_deref())
            .await?;
        let link_ids: Vec<String> = permissions.iter().map(|p| p.id.clone()).collect();
        storage::set_role_permissions(&txn, &role.id, &link_ids).await?;

        audit(
            &txn,
            AuditEntry {
                actor_id: actor_id.to_string(),
                action: "role.update".to_string(),
                entity_type: "role".to_string(),
                entity_id: role.id.clone(),
                details: json!({
                    "key": role.key.clone(),
                    "name": { "before": role.name.clone(), "after": input.name.clone() },
                    "permissions": {
                        "before": permission_keys(&before),
                        "after": permission_keys(&permissions),
                    },
                }),
            },
        )
        .await;

        txn.commit().await?;

        // Awaited before reporting success so a follow-up check from any
        // affected user cannot read the pre-update permission set.
        self.invalidate_permissions_by_role(role_id).await?;

        let role = Role {
            name: input.name,
            description: input.description,
            ..role
        };
        Ok(RoleWithPermissions { role, permissions })
    }

    /// Delete a role, migrating any assigned users to a fallback role first.
    pub async fn delete_role(
        &self,
        role_id: &str,
        actor_id: &str,
        fallback: RoleFallback,
    ) -> Result<Role, RbacError> {
        let actor_is_super = self.actor_is_super_admin(actor_id).await?;

        let txn = self.db().begin().await?;

        let role = storage::find_role_by_id(&txn, role_id)
            .await?
            .ok_or_else(|| RbacError::NotFound {
                entity: "role",
                id: role_id.to_string(),
            })?;
        if role.is_system() && !actor_is_super {
            return Err(RbacError::CannotDeleteSystemRole);
        }

        let users = storage::find_users_by_role_id(&txn, &role.id).await?;
        let user_ids: Vec<String> = users.iter().map(|u| u.id.clone()).collect();

        let fallback_role = if users.is_empty() {
            None
        } else {
            Some(resolve_fallback(&txn, &role, fallback, actor_is_super).await?)
        };

        if let Some(fallback_role) = &fallback_role {
            storage::bulk_reassign_users(&txn, &user_ids, &fallback_role.id).await?;
        }
        storage::delete_role_row(&txn, &role.id).await?;

        audit(
            &txn,
            AuditEntry {
                actor_id: actor_id.to_string(),
                action: "role.delete".to_string(),
                entity_type: "role".to_string(),
                entity_id: role.id.clone(),
                details: json!({
                    "key": role.key.clone(),
                    "fallback_role_id": fallback_role.as_ref().map(|r| r.id.clone()),
                    "reassigned_user_ids": user_ids.clone(),
                }),
            },
        )
        .await;

        txn.commit().await?;

        // The reassigned users' effective permissions just changed; their
        // entries double as the deleted role's now-orphaned cache bucket.
        for user_id in &user_ids {
            self.invalidate_user_permissions(user_id).await;
        }

        Ok(role)
    }

    /// Assign a role to a user. Assigning an elevated role requires the actor
    /// to hold `ADMIN_ACCESS:ASSIGN`; this is an assignment-time check,
    /// separate from the role's own granted permissions.
    pub async fn assign_role(
        &self,
        user_id: &str,
        role_id: &str,
        actor_id: &str,
    ) -> Result<(), RbacError> {
        let actor = self
            .load_actor(actor_id)
            .await?
            .ok_or_else(|| RbacError::NotFound {
                entity: "actor",
                id: actor_id.to_string(),
            })?;

        let role = storage::find_role_by_id(self.db(), role_id)
            .await?
            .ok_or_else(|| RbacError::NotFound {
                entity: "role",
                id: role_id.to_string(),
            })?;
        storage::find_user_by_id(self.db(), user_id)
            .await?
            .ok_or_else(|| RbacError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            })?;

        if !can(Some(&actor), Resource::Role, Action::Assign) {
            return Err(RbacError::PermissionNotAllowed {
                detail: "ROLE:ASSIGN".to_string(),
            });
        }
        if let Some(def) = builtin_role(&role.key) {
            if !def.is_assignable && !is_super_admin_role(&actor.role_key) {
                return Err(RbacError::PermissionNotAllowed {
                    detail: format!("role `{}`", role.key),
                });
            }
            if def.is_elevated && !can(Some(&actor), Resource::AdminAccess, Action::Assign) {
                return Err(RbacError::PermissionNotAllowed {
                    detail: "ADMIN_ACCESS:ASSIGN".to_string(),
                });
            }
        }

        storage::update_user_role(self.db(), user_id, Some(&role.id)).await?;

        audit(
            self.db(),
            AuditEntry {
                actor_id: actor_id.to_string(),
                action: "user.role_assign".to_string(),
                entity_type: "user".to_string(),
                entity_id: user_id.to_string(),
                details: json!({ "role_id": role.id, "role_key": role.key }),
            },
        )
        .await;

        self.invalidate_user_permissions(user_id).await;
        Ok(())
    }

    async fn actor_is_super_admin(&self, actor_id: &str) -> Result<bool, RbacError> {
        let access = storage::find_user_with_role_and_permissions(self.db(), actor_id)
            .await?
            .ok_or_else(|| RbacError::NotFound {
                entity: "actor",
                id: actor_id.to_string(),
            })?;
        Ok(access
            .role
            .is_some_and(|role| is_super_admin_role(&role.key)))
    }
}

/// Resolve the role users are migrated to before deletion.
async fn resolve_fallback<C: ConnectionTrait>(
    db: &C,
    deleting: &Role,
    fallback: RoleFallback,
    actor_is_super: bool,
) -> Result<Role, RbacError> {
    let resolved = match fallback {
        RoleFallback::Deny => {
            return Err(RbacError::RoleInUse {
                id: deleting.id.clone(),
            });
        }
        RoleFallback::Explicit(id) => {
            if id == deleting.id {
                return Err(RbacError::RoleFallbackInvalid);
            }
            storage::find_role_by_id(db, &id)
                .await?
                .ok_or(RbacError::RoleFallbackNotFound { id })?
        }
        RoleFallback::Default => storage::find_role_by_key(db, DEFAULT_FALLBACK_ROLE_KEY)
            .await?
            .ok_or_else(|| RbacError::RoleFallbackNotFound {
                id: DEFAULT_FALLBACK_ROLE_KEY.to_string(),
            })?,
    };

    // Routing users into super_admin would let a non-super-admin actor hand
    // out a role they could not have assigned directly.
    if resolved.key == SUPER_ADMIN_ROLE_KEY && !actor_is_super {
        return Err(RbacError::PermissionNotAllowed {
            detail: format!("fallback role `{}`", resolved.key),
        });
    }
    Ok(resolved)
}

/// Reject a display name that collides with an existing role's, comparing
/// trimmed and case-folded.
async fn ensure_name_available<C: ConnectionTrait>(
    db: &C,
    name: &str,
    exclude_role_id: Option<&str>,
) -> Result<(), RbacError> {
    let normalized = normalize_name(name);
    for role in storage::list_roles(db).await? {
        if Some(role.id.as_str()) == exclude_role_id {
            continue;
        }
        if normalize_name(&role.name) == normalized {
            return Err(RbacError::NameAlreadyExists {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Resolve and validate a submitted permission id list against the registry.
/// Non-super-admin actors may not grant permissions on super-admin-only
/// resources.
async fn validate_permission_selection<C: ConnectionTrait>(
    db: &C,
    permission_ids: &[String],
    actor_is_super: bool,
) -> Result<Vec<Permission>, RbacError> {
    let found = storage::find_permissions_by_ids(db, permission_ids).await?;

    let missing: Vec<String> = permission_ids
        .iter()
        .filter(|id| !found.iter().any(|p| &p.id == *id))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(RbacError::InvalidPermissionSelection { ids: missing });
    }

    for permission in &found {
        let (Some(resource), Some(action)) = (
            Resource::parse(&permission.resource),
            Action::parse(&permission.action),
        ) else {
            return Err(RbacError::InvalidPermissionSelection {
                ids: vec![permission.id.clone()],
            });
        };
        ensure_action_allowed(resource, action)?;
        if is_super_admin_only_resource(resource) && !actor_is_super {
            return Err(RbacError::PermissionNotAllowed {
                detail: format!("{resource}:{action}"),
            });
        }
    }
    Ok(found)
}

fn permission_keys(permissions: &[Permission]) -> Vec<String> {
    permissions
        .iter()
        .map(|p| format!("{}:{}", p.resource, p.action))
        .collect()
}

/// Audit logging is best-effort observability, not a correctness gate: a
/// failed write is logged and swallowed, never rolls back the mutation.
async fn audit<C: ConnectionTrait>(db: &C, entry: AuditEntry) {
    let action = entry.action.clone();
    if let Err(err) = storage::create_audit_log(db, entry).await {
        tracing::warn!(%action, error = %err, "audit log write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Editors "), "editors");
        assert_eq!(normalize_name("EDITORS"), "editors");
    }

    #[test]
    fn test_permission_keys_formatting() {
        let perms = vec![Permission {
            id: "p1".into(),
            resource: "POST".into(),
            action: "UPDATE".into(),
        }];
        assert_eq!(permission_keys(&perms), vec!["POST:UPDATE".to_string()]);
    }
}
