use crate::entities;
use crate::errors::AdminError;
use crate::rbac::registry::list_all_permissions;
use crate::rbac::roles::{default_permission_keys, BUILTIN_ROLES, SUPER_ADMIN_ROLE_KEY};
use crate::settings::{Bootstrap, Database as DbCfg};
use base64ct::Encoding;
use chrono::Utc;
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub role_id: Option<String>,
    pub created_at: i64,
    pub enabled: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub is_system: i64,
    pub created_at: i64,
}

impl Role {
    pub fn is_system(&self) -> bool {
        self.is_system != 0
    }
}

/// A persisted permission row. `resource`/`action` are stored as the
/// registry's string names; the RBAC layer parses and validates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub resource: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleWithPermissions {
    pub role: Role,
    pub permissions: Vec<Permission>,
}

/// A user together with their role and its flattened permission rows, loaded
/// in one call for permission resolution.
#[derive(Debug, Clone)]
pub struct UserWithAccess {
    pub user: User,
    pub role: Option<Role>,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub actor_id: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: Value,
}

impl From<entities::user::Model> for User {
    fn from(m: entities::user::Model) -> Self {
        User {
            id: m.id,
            username: m.username,
            email: m.email,
            role_id: m.role_id,
            created_at: m.created_at,
            enabled: m.enabled,
        }
    }
}

impl From<entities::role::Model> for Role {
    fn from(m: entities::role::Model) -> Self {
        Role {
            id: m.id,
            key: m.key,
            name: m.name,
            description: m.description,
            is_system: m.is_system,
            created_at: m.created_at,
        }
    }
}

impl From<entities::permission::Model> for Permission {
    fn from(m: entities::permission::Model) -> Self {
        Permission {
            id: m.id,
            resource: m.resource,
            action: m.action,
        }
    }
}

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, AdminError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

fn random_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

// User lookups

pub async fn find_user_by_id<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
) -> Result<Option<User>, AdminError> {
    let model = entities::User::find_by_id(user_id).one(db).await?;
    Ok(model.map(User::from))
}

pub async fn find_user_by_username<C: ConnectionTrait>(
    db: &C,
    username: &str,
) -> Result<Option<User>, AdminError> {
    use entities::user::{Column, Entity};
    let model = Entity::find()
        .filter(Column::Username.eq(username))
        .one(db)
        .await?;
    Ok(model.map(User::from))
}

/// Load a user together with their role and the role's permission rows.
/// Absent user or roleless user both resolve, with `role: None` for the
/// latter; "no role" is not a storage fault.
pub async fn find_user_with_role_and_permissions<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
) -> Result<Option<UserWithAccess>, AdminError> {
    let Some(user) = entities::User::find_by_id(user_id).one(db).await? else {
        return Ok(None);
    };

    let role = match &user.role_id {
        Some(role_id) => entities::Role::find_by_id(role_id).one(db).await?,
        None => None,
    };

    let permissions = match &role {
        Some(role) => find_role_permissions(db, &role.id).await?,
        None => Vec::new(),
    };

    Ok(Some(UserWithAccess {
        user: User::from(user),
        role: role.map(Role::from),
        permissions,
    }))
}

pub async fn find_users_by_role_id<C: ConnectionTrait>(
    db: &C,
    role_id: &str,
) -> Result<Vec<User>, AdminError> {
    use entities::user::{Column, Entity};
    let models = Entity::find()
        .filter(Column::RoleId.eq(role_id))
        .order_by_asc(Column::CreatedAt)
        .all(db)
        .await?;
    Ok(models.into_iter().map(User::from).collect())
}

// Role lookups

pub async fn find_role_by_id<C: ConnectionTrait>(
    db: &C,
    role_id: &str,
) -> Result<Option<Role>, AdminError> {
    let model = entities::Role::find_by_id(role_id).one(db).await?;
    Ok(model.map(Role::from))
}

pub async fn find_role_by_key<C: ConnectionTrait>(
    db: &C,
    key: &str,
) -> Result<Option<Role>, AdminError> {
    use entities::role::{Column, Entity};
    let model = Entity::find().filter(Column::Key.eq(key)).one(db).await?;
    Ok(model.map(Role::from))
}

pub async fn list_roles<C: ConnectionTrait>(db: &C) -> Result<Vec<Role>, AdminError> {
    use entities::role::{Column, Entity};
    let models = Entity::find().order_by_asc(Column::CreatedAt).all(db).await?;
    Ok(models.into_iter().map(Role::from).collect())
}

pub async fn find_role_permissions<C: ConnectionTrait>(
    db: &C,
    role_id: &str,
) -> Result<Vec<Permission>, AdminError> {
    use entities::role_permission::{Column, Entity};
    let links = Entity::find()
        .filter(Column::RoleId.eq(role_id))
        .all(db)
        .await?;
    if links.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = links.into_iter().map(|l| l.permission_id).collect();
    find_permissions_by_ids(db, &ids).await
}

pub async fn find_permissions_by_ids<C: ConnectionTrait>(
    db: &C,
    ids: &[String],
) -> Result<Vec<Permission>, AdminError> {
    use entities::permission::{Column, Entity};
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let models = Entity::find()
        .filter(Column::Id.is_in(ids.iter().cloned()))
        .all(db)
        .await?;
    Ok(models.into_iter().map(Permission::from).collect())
}

// Role mutations. Callers that need atomicity across several of these wrap
// them in a transaction and pass the transaction handle.

pub async fn create_role<C: ConnectionTrait>(db: &C, input: NewRole) -> Result<Role, AdminError> {
    let id = random_id();
    let created_at = Utc::now().timestamp();

    let role = entities::role::ActiveModel {
        id: Set(id.clone()),
        key: Set(input.key.clone()),
        name: Set(input.name.clone()),
        description: Set(input.description.clone()),
        is_system: Set(if input.is_system { 1 } else { 0 }),
        created_at: Set(created_at),
    };
    role.insert(db).await?;

    Ok(Role {
        id,
        key: input.key,
        name: input.name,
        description: input.description,
        is_system: if input.is_system { 1 } else { 0 },
        created_at,
    })
}

pub async fn update_role_meta<C: ConnectionTrait>(
    db: &C,
    role_id: &str,
    name: &str,
    description: Option<&str>,
) -> Result<(), AdminError> {
    let role = entities::role::ActiveModel {
        id: Set(role_id.to_string()),
        name: Set(name.to_string()),
        description: Set(description.map(str::to_string)),
        ..Default::default()
    };
    role.update(db).await?;
    Ok(())
}

/// Replace a role's permission set. Delete-then-recreate, not incremental
/// diffing; run inside the caller's transaction.
pub async fn set_role_permissions<C: ConnectionTrait>(
    db: &C,
    role_id: &str,
    permission_ids: &[String],
) -> Result<(), AdminError> {
    use entities::role_permission::{ActiveModel, Column, Entity};

    Entity::delete_many()
        .filter(Column::RoleId.eq(role_id))
        .exec(db)
        .await?;

    if permission_ids.is_empty() {
        return Ok(());
    }
    let links: Vec<ActiveModel> = permission_ids
        .iter()
        .map(|pid| ActiveModel {
            role_id: Set(role_id.to_string()),
            permission_id: Set(pid.clone()),
        })
        .collect();
    Entity::insert_many(links).exec(db).await?;
    Ok(())
}

pub async fn delete_role_row<C: ConnectionTrait>(db: &C, role_id: &str) -> Result<(), AdminError> {
    entities::Role::delete_by_id(role_id).exec(db).await?;
    Ok(())
}

/// Move every listed user to `new_role_id` in one statement. Returns the
/// number of affected rows.
pub async fn bulk_reassign_users<C: ConnectionTrait>(
    db: &C,
    user_ids: &[String],
    new_role_id: &str,
) -> Result<u64, AdminError> {
    use entities::user::{ActiveModel, Column, Entity};
    if user_ids.is_empty() {
        return Ok(0);
    }
    let res = Entity::update_many()
        .set(ActiveModel {
            role_id: Set(Some(new_role_id.to_string())),
            ..Default::default()
        })
        .filter(Column::Id.is_in(user_ids.iter().cloned()))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

pub async fn update_user_role<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    role_id: Option<&str>,
) -> Result<(), AdminError> {
    let user = entities::user::ActiveModel {
        id: Set(user_id.to_string()),
        role_id: Set(role_id.map(str::to_string)),
        ..Default::default()
    };
    user.update(db).await?;
    Ok(())
}

// Audit log

pub async fn create_audit_log<C: ConnectionTrait>(
    db: &C,
    entry: AuditEntry,
) -> Result<(), AdminError> {
    let log = entities::audit_log::ActiveModel {
        actor_id: Set(entry.actor_id),
        action: Set(entry.action),
        entity_type: Set(entry.entity_type),
        entity_id: Set(entry.entity_id),
        details: Set(serde_json::to_string(&entry.details)?),
        created_at: Set(Utc::now().timestamp()),
        ..Default::default()
    };
    log.insert(db).await?;
    Ok(())
}

// User management

pub async fn create_user(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
    email: Option<String>,
    role_id: Option<String>,
) -> Result<User, AdminError> {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::{Argon2, PasswordHasher};

    let id = random_id();
    let created_at = Utc::now().timestamp();

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AdminError::Other(format!("Password hashing failed: {}", e)))?
        .to_string();

    let user = entities::user::ActiveModel {
        id: Set(id.clone()),
        username: Set(username.to_string()),
        password_hash: Set(password_hash),
        email: Set(email.clone()),
        role_id: Set(role_id.clone()),
        created_at: Set(created_at),
        enabled: Set(1),
    };
    user.insert(db).await?;

    Ok(User {
        id,
        username: username.to_string(),
        email,
        role_id,
        created_at,
        enabled: 1,
    })
}

// Seeding

/// Materialize the static registries in storage: one permission row per
/// registry key, one role row plus permission links per built-in role
/// definition. Idempotent; `is_system` is only ever written here.
pub async fn seed_rbac(db: &DatabaseConnection) -> Result<(), AdminError> {
    use entities::permission::{Column as PermColumn, Entity as PermEntity};
    use entities::role_permission::{
        ActiveModel as LinkActiveModel, Column as LinkColumn, Entity as LinkEntity,
    };

    // Permission rows for the full registry universe
    let mut permission_ids: HashMap<String, String> = HashMap::new();
    for desc in list_all_permissions() {
        let resource = desc.resource.to_string();
        let action = desc.action.to_string();
        let existing = PermEntity::find()
            .filter(PermColumn::Resource.eq(resource.clone()))
            .filter(PermColumn::Action.eq(action.clone()))
            .one(db)
            .await?;
        let id = match existing {
            Some(model) => model.id,
            None => {
                let id = random_id();
                let perm = entities::permission::ActiveModel {
                    id: Set(id.clone()),
                    resource: Set(resource),
                    action: Set(action),
                };
                perm.insert(db).await?;
                id
            }
        };
        permission_ids.insert(desc.key().to_string(), id);
    }

    // Built-in roles and their default permission sets
    for def in &BUILTIN_ROLES {
        let role = match find_role_by_key(db, def.key).await? {
            Some(role) => role,
            None => {
                create_role(
                    db,
                    NewRole {
                        key: def.key.to_string(),
                        name: def.display_name.to_string(),
                        description: None,
                        is_system: def.is_system,
                    },
                )
                .await?
            }
        };

        let existing: Vec<String> = LinkEntity::find()
            .filter(LinkColumn::RoleId.eq(role.id.clone()))
            .all(db)
            .await?
            .into_iter()
            .map(|l| l.permission_id)
            .collect();

        for key in default_permission_keys(def) {
            let Some(pid) = permission_ids.get(&key.to_string()) else {
                continue;
            };
            if !existing.contains(pid) {
                let link = LinkActiveModel {
                    role_id: Set(role.id.clone()),
                    permission_id: Set(pid.clone()),
                };
                link.insert(db).await?;
            }
        }
    }

    tracing::info!(
        permissions = permission_ids.len(),
        roles = BUILTIN_ROLES.len(),
        "RBAC seed complete"
    );
    Ok(())
}

/// Create the initial super-admin user on first start if missing.
pub async fn ensure_bootstrap_admin(
    db: &DatabaseConnection,
    bootstrap: &Bootstrap,
) -> Result<(), AdminError> {
    if find_user_by_username(db, &bootstrap.admin_username)
        .await?
        .is_some()
    {
        return Ok(());
    }

    let Some(password) = bootstrap.admin_password.as_deref() else {
        return Err(AdminError::BadRequest(format!(
            "bootstrap user `{}` does not exist and no bootstrap.admin_password is configured",
            bootstrap.admin_username
        )));
    };

    let role = find_role_by_key(db, SUPER_ADMIN_ROLE_KEY)
        .await?
        .ok_or_else(|| {
            AdminError::Other("super_admin role missing; run the RBAC seed first".to_string())
        })?;

    create_user(
        db,
        &bootstrap.admin_username,
        password,
        None,
        Some(role.id),
    )
    .await?;
    tracing::info!(username = %bootstrap.admin_username, "Created bootstrap super-admin user");
    Ok(())
}
