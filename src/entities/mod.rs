pub mod audit_log;
pub mod permission;
pub mod role;
pub mod role_permission;
pub mod user;

pub use audit_log::Entity as AuditLog;
pub use permission::Entity as Permission;
pub use role::Entity as Role;
pub use role_permission::Entity as RolePermission;
pub use user::Entity as User;
