use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rbac::errors::RbacError;

/// Protected entity categories. This is a closed, compile-time set; adding a
/// resource means adding a variant here and a row in `actions_for_resource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resource {
    User,
    Role,
    Media,
    Post,
    Product,
    Settings,
    AuditLog,
    AdminAccess,
}

impl Resource {
    pub const ALL: [Resource; 8] = [
        Resource::User,
        Resource::Role,
        Resource::Media,
        Resource::Post,
        Resource::Product,
        Resource::Settings,
        Resource::AuditLog,
        Resource::AdminAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::User => "USER",
            Resource::Role => "ROLE",
            Resource::Media => "MEDIA",
            Resource::Post => "POST",
            Resource::Product => "PRODUCT",
            Resource::Settings => "SETTINGS",
            Resource::AuditLog => "AUDIT_LOG",
            Resource::AdminAccess => "ADMIN_ACCESS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Resource::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation kinds a permission can grant on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Assign,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Assign,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Read => "READ",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
            Action::Assign => "ASSIGN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Action::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions a resource supports. Every resource has at least one.
pub fn actions_for_resource(resource: Resource) -> &'static [Action] {
    use Action::*;
    match resource {
        Resource::User => &[Create, Read, Update, Delete],
        Resource::Role => &[Create, Read, Update, Delete, Assign],
        Resource::Media => &[Create, Read, Update, Delete],
        Resource::Post => &[Create, Read, Update, Delete],
        Resource::Product => &[Create, Read, Update, Delete],
        Resource::Settings => &[Read, Update],
        Resource::AuditLog => &[Read],
        Resource::AdminAccess => &[Assign],
    }
}

/// Resources whose permissions may only be granted by a super-admin actor.
pub fn is_super_admin_only_resource(resource: Resource) -> bool {
    matches!(resource, Resource::Role | Resource::AdminAccess)
}

/// Fails if the `(resource, action)` pair is not in the registry. Malformed
/// pairs reaching the authorization layer are a programmer or data error, so
/// this runs wherever externally supplied permission data enters the engine.
pub fn ensure_action_allowed(resource: Resource, action: Action) -> Result<(), RbacError> {
    if actions_for_resource(resource).contains(&action) {
        Ok(())
    } else {
        Err(RbacError::InvalidActionForResource { resource, action })
    }
}

/// A validated `(resource, action)` pair, serialized as `"RESOURCE:ACTION"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionKey {
    pub resource: Resource,
    pub action: Action,
}

impl PermissionKey {
    pub fn new(resource: Resource, action: Action) -> Result<Self, RbacError> {
        ensure_action_allowed(resource, action)?;
        Ok(Self { resource, action })
    }

    /// Parse `"RESOURCE:ACTION"`; returns `None` for unknown names or a pair
    /// the registry does not allow.
    pub fn parse(s: &str) -> Option<Self> {
        let (resource, action) = s.split_once(':')?;
        let resource = Resource::parse(resource)?;
        let action = Action::parse(action)?;
        Self::new(resource, action).ok()
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

/// One entry of the full permission universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionDescriptor {
    pub resource: Resource,
    pub action: Action,
    pub super_admin_only: bool,
}

impl PermissionDescriptor {
    pub fn key(&self) -> PermissionKey {
        PermissionKey {
            resource: self.resource,
            action: self.action,
        }
    }
}

/// Enumerate every valid `(resource, action)` pair. This is the authoritative
/// universe used to validate externally supplied permission id lists and to
/// seed the permission table.
pub fn list_all_permissions() -> Vec<PermissionDescriptor> {
    let mut out = Vec::new();
    for resource in Resource::ALL {
        let super_admin_only = is_super_admin_only_resource(resource);
        for &action in actions_for_resource(resource) {
            out.push(PermissionDescriptor {
                resource,
                action,
                super_admin_only,
            });
        }
    }
    out
}
