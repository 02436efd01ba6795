use crate::rbac::errors::RbacError;
use crate::rbac::registry::{
    actions_for_resource, ensure_action_allowed, Action, PermissionKey, Resource,
};

pub const SUPER_ADMIN_ROLE_KEY: &str = "super_admin";
pub const ADMIN_ROLE_KEY: &str = "admin";
pub const EDITOR_ROLE_KEY: &str = "editor";
pub const VIEWER_ROLE_KEY: &str = "viewer";

/// Role users are migrated to when their role is deleted without an explicit
/// fallback.
pub const DEFAULT_FALLBACK_ROLE_KEY: &str = VIEWER_ROLE_KEY;

/// Which actions a preset grants on one resource.
#[derive(Debug, Clone, Copy)]
pub enum ActionGrant {
    /// Every action the registry allows for the resource.
    All,
    Only(&'static [Action]),
}

/// A role's default permission set.
#[derive(Debug, Clone, Copy)]
pub enum RolePreset {
    /// Every permission in the registry.
    All,
    Grants(&'static [(Resource, ActionGrant)]),
}

/// Static description of a role that ships with the product. Persisted roles
/// are seeded from these at startup; `is_system` is immutable afterwards.
#[derive(Debug, Clone, Copy)]
pub struct RoleDefinition {
    pub key: &'static str,
    pub display_name: &'static str,
    pub is_system: bool,
    /// May the role be granted to users through the admin UI at all.
    pub is_assignable: bool,
    pub is_selectable_on_registration: bool,
    /// Assigning this role to a user requires the assigning actor to hold
    /// `ADMIN_ACCESS:ASSIGN` (distinct from the role's own permissions).
    pub is_elevated: bool,
    pub preset: RolePreset,
}

pub const BUILTIN_ROLES: [RoleDefinition; 4] = [
    RoleDefinition {
        key: SUPER_ADMIN_ROLE_KEY,
        display_name: "Super Administrator",
        is_system: true,
        is_assignable: false,
        is_selectable_on_registration: false,
        is_elevated: true,
        preset: RolePreset::All,
    },
    RoleDefinition {
        key: ADMIN_ROLE_KEY,
        display_name: "Administrator",
        is_system: true,
        is_assignable: true,
        is_selectable_on_registration: false,
        is_elevated: true,
        preset: RolePreset::Grants(&[
            (Resource::User, ActionGrant::All),
            (Resource::Media, ActionGrant::All),
            (Resource::Post, ActionGrant::All),
            (Resource::Product, ActionGrant::All),
            (Resource::Settings, ActionGrant::All),
            (Resource::AuditLog, ActionGrant::All),
            (
                Resource::Role,
                ActionGrant::Only(&[Action::Read, Action::Assign]),
            ),
            (Resource::AdminAccess, ActionGrant::Only(&[Action::Assign])),
        ]),
    },
    RoleDefinition {
        key: EDITOR_ROLE_KEY,
        display_name: "Editor",
        is_system: true,
        is_assignable: true,
        is_selectable_on_registration: false,
        is_elevated: false,
        preset: RolePreset::Grants(&[
            (Resource::Media, ActionGrant::All),
            (Resource::Post, ActionGrant::All),
            (
                Resource::Product,
                ActionGrant::Only(&[Action::Read, Action::Update]),
            ),
        ]),
    },
    RoleDefinition {
        key: VIEWER_ROLE_KEY,
        display_name: "Viewer",
        is_system: true,
        is_assignable: true,
        is_selectable_on_registration: true,
        is_elevated: false,
        preset: RolePreset::Grants(&[
            (Resource::Media, ActionGrant::Only(&[Action::Read])),
            (Resource::Post, ActionGrant::Only(&[Action::Read])),
            (Resource::Product, ActionGrant::Only(&[Action::Read])),
        ]),
    },
];

pub fn builtin_role(key: &str) -> Option<&'static RoleDefinition> {
    BUILTIN_ROLES.iter().find(|def| def.key == key)
}

/// Custom (runtime-created) roles are never elevated or system; only the
/// static table can mark a role as such.
pub fn is_elevated_role(key: &str) -> bool {
    builtin_role(key).is_some_and(|def| def.is_elevated)
}

pub fn is_system_role(key: &str) -> bool {
    builtin_role(key).is_some_and(|def| def.is_system)
}

pub fn is_super_admin_role(key: &str) -> bool {
    key == SUPER_ADMIN_ROLE_KEY
}

/// Expand a role preset into the flat permission-key list used at seed time.
pub fn default_permission_keys(def: &RoleDefinition) -> Vec<PermissionKey> {
    let mut keys = Vec::new();
    match def.preset {
        RolePreset::All => {
            for resource in Resource::ALL {
                for &action in actions_for_resource(resource) {
                    keys.push(PermissionKey { resource, action });
                }
            }
        }
        RolePreset::Grants(grants) => {
            for &(resource, grant) in grants {
                match grant {
                    ActionGrant::All => {
                        for &action in actions_for_resource(resource) {
                            keys.push(PermissionKey { resource, action });
                        }
                    }
                    ActionGrant::Only(actions) => {
                        for &action in actions {
                            keys.push(PermissionKey { resource, action });
                        }
                    }
                }
            }
        }
    }
    keys
}

/// Check every built-in preset against the permission registry. Run at process
/// start so a preset referencing an action its resource does not allow aborts
/// boot instead of surfacing as a confusing runtime denial.
pub fn validate_builtin_roles() -> Result<(), RbacError> {
    validate_roles(&BUILTIN_ROLES)
}

fn validate_roles(defs: &[RoleDefinition]) -> Result<(), RbacError> {
    for def in defs {
        if let RolePreset::Grants(grants) = def.preset {
            for &(resource, grant) in grants {
                if let ActionGrant::Only(actions) = grant {
                    for &action in actions {
                        ensure_action_allowed(resource, action)?;
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::registry::list_all_permissions;

    #[test]
    fn test_builtin_roles_validate() {
        validate_builtin_roles().unwrap();
    }

    #[test]
    fn test_malformed_preset_is_rejected() {
        let bad = [RoleDefinition {
            key: "broken",
            display_name: "Broken",
            is_system: false,
            is_assignable: true,
            is_selectable_on_registration: false,
            is_elevated: false,
            // AUDIT_LOG only allows READ
            preset: RolePreset::Grants(&[(Resource::AuditLog, ActionGrant::Only(&[Action::Delete]))]),
        }];
        assert!(matches!(
            validate_roles(&bad),
            Err(RbacError::InvalidActionForResource {
                resource: Resource::AuditLog,
                action: Action::Delete,
            })
        ));
    }

    #[test]
    fn test_all_preset_expands_to_full_universe() {
        let def = builtin_role(SUPER_ADMIN_ROLE_KEY).unwrap();
        let keys = default_permission_keys(def);
        assert_eq!(keys.len(), list_all_permissions().len());
    }

    #[test]
    fn test_grants_preset_expansion() {
        let def = builtin_role(VIEWER_ROLE_KEY).unwrap();
        let keys = default_permission_keys(def);
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&PermissionKey {
            resource: Resource::Post,
            action: Action::Read,
        }));
        assert!(!keys.iter().any(|k| k.action == Action::Delete));
    }

    #[test]
    fn test_per_resource_all_expands_to_allowed_actions() {
        let def = builtin_role(ADMIN_ROLE_KEY).unwrap();
        let keys = default_permission_keys(def);
        // SETTINGS allows READ and UPDATE only
        let settings: Vec<_> = keys
            .iter()
            .filter(|k| k.resource == Resource::Settings)
            .collect();
        assert_eq!(settings.len(), 2);
    }

    #[test]
    fn test_role_flags() {
        assert!(is_super_admin_role(SUPER_ADMIN_ROLE_KEY));
        assert!(!is_super_admin_role(ADMIN_ROLE_KEY));
        assert!(is_elevated_role(ADMIN_ROLE_KEY));
        assert!(!is_elevated_role(EDITOR_ROLE_KEY));
        assert!(!is_elevated_role("some_custom_role"));
        assert!(is_system_role(VIEWER_ROLE_KEY));
        assert!(!is_system_role("some_custom_role"));
    }
}
