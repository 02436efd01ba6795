use crate::rbac::cache::UserPermissions;
use crate::rbac::registry::{Action, Resource};
use crate::rbac::roles::is_super_admin_role;

/// The authenticated subject of an authorization check. Built by the session
/// layer from a verified credential plus the user's resolved permission map;
/// the engine itself never authenticates.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub role_key: String,
    pub permissions: UserPermissions,
}

/// Decide whether `actor` may perform `action` on `resource`.
///
/// Super-admins bypass the permission map entirely; everyone else gets a plain
/// map lookup that defaults to deny. Called on the hot path of every
/// privileged request, so this never touches storage and never fails.
pub fn can(actor: Option<&Actor>, resource: Resource, action: Action) -> bool {
    let Some(actor) = actor else {
        return false;
    };
    if is_super_admin_role(&actor.role_key) {
        return true;
    }
    actor.permissions.allows(resource, action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::roles::{EDITOR_ROLE_KEY, SUPER_ADMIN_ROLE_KEY};

    fn editor_actor() -> Actor {
        let mut permissions = UserPermissions::new();
        permissions.grant(Resource::Post, Action::Update);
        Actor {
            id: "u-editor".into(),
            role_key: EDITOR_ROLE_KEY.into(),
            permissions,
        }
    }

    #[test]
    fn test_unauthenticated_is_denied() {
        assert!(!can(None, Resource::Post, Action::Read));
    }

    #[test]
    fn test_super_admin_bypasses_permission_map() {
        let actor = Actor {
            id: "u-root".into(),
            role_key: SUPER_ADMIN_ROLE_KEY.into(),
            permissions: UserPermissions::new(),
        };
        for resource in Resource::ALL {
            for action in Action::ALL {
                assert!(can(Some(&actor), resource, action));
            }
        }
    }

    #[test]
    fn test_permission_map_lookup_defaults_to_deny() {
        let actor = editor_actor();
        assert!(can(Some(&actor), Resource::Post, Action::Update));
        assert!(!can(Some(&actor), Resource::Post, Action::Delete));
        assert!(!can(Some(&actor), Resource::User, Action::Read));
    }
}
