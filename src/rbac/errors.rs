use miette::Diagnostic;
use thiserror::Error;

use crate::errors::AdminError;
use crate::rbac::registry::{Action, Resource};

/// Typed failures of the authorization engine. Every variant carries a stable
/// machine-readable code (see [`RbacError::code`]); presentation and
/// localization of that code are the caller's responsibility.
#[derive(Debug, Error, Diagnostic)]
pub enum RbacError {
    #[error("a role with key `{key}` already exists")]
    #[diagnostic(code(lodestone::rbac::role_key_exists))]
    RoleKeyExists { key: String },

    #[error("a role named `{name}` already exists")]
    #[diagnostic(code(lodestone::rbac::name_already_exists))]
    NameAlreadyExists { name: String },

    #[error("only a super-admin may create a system role")]
    #[diagnostic(code(lodestone::rbac::cannot_create_system_role))]
    CannotCreateSystemRole,

    #[error("only a super-admin may edit a system role")]
    #[diagnostic(code(lodestone::rbac::cannot_edit_system_role))]
    CannotEditSystemRole,

    #[error("only a super-admin may delete a system role")]
    #[diagnostic(code(lodestone::rbac::cannot_delete_system_role))]
    CannotDeleteSystemRole,

    #[error("one or more permission ids do not resolve to known permissions: {ids:?}")]
    #[diagnostic(
        code(lodestone::rbac::invalid_permission_selection),
        help("Permission ids must reference rows seeded from the permission registry")
    )]
    InvalidPermissionSelection { ids: Vec<String> },

    #[error("actor is not allowed to grant or assign `{detail}`")]
    #[diagnostic(code(lodestone::rbac::permission_not_allowed))]
    PermissionNotAllowed { detail: String },

    #[error("fallback role `{id}` does not exist")]
    #[diagnostic(code(lodestone::rbac::role_fallback_not_found))]
    RoleFallbackNotFound { id: String },

    #[error("fallback role must differ from the role being deleted")]
    #[diagnostic(code(lodestone::rbac::role_fallback_invalid))]
    RoleFallbackInvalid,

    #[error("role `{id}` still has users assigned and reassignment was refused")]
    #[diagnostic(code(lodestone::rbac::role_in_use))]
    RoleInUse { id: String },

    #[error("{entity} `{id}` not found")]
    #[diagnostic(code(lodestone::rbac::not_found))]
    NotFound { entity: &'static str, id: String },

    #[error("action {action} is not allowed for resource {resource}")]
    #[diagnostic(
        code(lodestone::rbac::invalid_action_for_resource),
        help("See the permission registry for the actions each resource supports")
    )]
    InvalidActionForResource { resource: Resource, action: Action },

    #[error("storage error: {0}")]
    #[diagnostic(code(lodestone::rbac::storage))]
    Storage(#[from] AdminError),
}

impl RbacError {
    /// Stable machine-readable code for callers (HTTP/RPC layers map these to
    /// status codes and localized messages).
    pub fn code(&self) -> &'static str {
        match self {
            RbacError::RoleKeyExists { .. } => "ROLE_KEY_EXISTS",
            RbacError::NameAlreadyExists { .. } => "NAME_ALREADY_EXISTS",
            RbacError::CannotCreateSystemRole => "CANNOT_CREATE_SYSTEM_ROLE",
            RbacError::CannotEditSystemRole => "CANNOT_EDIT_SYSTEM_ROLE",
            RbacError::CannotDeleteSystemRole => "CANNOT_DELETE_SYSTEM_ROLE",
            RbacError::InvalidPermissionSelection { .. } => "INVALID_PERMISSION_SELECTION",
            RbacError::PermissionNotAllowed { .. } => "PERMISSION_NOT_ALLOWED",
            RbacError::RoleFallbackNotFound { .. } => "ROLE_FALLBACK_NOT_FOUND",
            RbacError::RoleFallbackInvalid => "ROLE_FALLBACK_INVALID",
            RbacError::RoleInUse { .. } => "ROLE_IN_USE",
            RbacError::NotFound { .. } => "NOT_FOUND",
            RbacError::InvalidActionForResource { .. } => "INVALID_ACTION_FOR_RESOURCE",
            RbacError::Storage(_) => "INTERNAL",
        }
    }
}

impl From<sea_orm::DbErr> for RbacError {
    fn from(value: sea_orm::DbErr) -> Self {
        RbacError::Storage(AdminError::Db(value))
    }
}
