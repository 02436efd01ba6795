use lodestone::entities;
use lodestone::rbac::RbacService;
use lodestone::storage;
use sea_orm::{ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use sea_orm_migration::MigratorTrait;
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied and the RBAC
    /// registries seeded
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        // Connect to database
        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        // Run migrations
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        // Seed built-in roles and the permission universe
        storage::seed_rbac(&connection)
            .await
            .expect("Failed to seed RBAC");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// RBAC service with a fresh in-memory cache and the default TTL
    pub fn service(&self) -> RbacService {
        RbacService::with_memory_cache(self.connection.clone())
    }
}

/// Create a test user, optionally assigned to a built-in role by key
pub async fn seed_user(
    db: &DatabaseConnection,
    username: &str,
    role_key: Option<&str>,
) -> storage::User {
    let role_id = match role_key {
        Some(key) => Some(role_id_by_key(db, key).await),
        None => None,
    };
    storage::create_user(db, username, "password123", None, role_id)
        .await
        .expect("Failed to create test user")
}

pub async fn role_id_by_key(db: &DatabaseConnection, key: &str) -> String {
    storage::find_role_by_key(db, key)
        .await
        .expect("Failed to look up role")
        .unwrap_or_else(|| panic!("role `{key}` not seeded"))
        .id
}

/// Look up the seeded permission row id for a `(resource, action)` pair
pub async fn permission_id(db: &DatabaseConnection, resource: &str, action: &str) -> String {
    use entities::permission::{Column, Entity};
    Entity::find()
        .filter(Column::Resource.eq(resource))
        .filter(Column::Action.eq(action))
        .one(db)
        .await
        .expect("Failed to query permissions")
        .unwrap_or_else(|| panic!("permission {resource}:{action} not seeded"))
        .id
}

pub async fn permission_ids(db: &DatabaseConnection, pairs: &[(&str, &str)]) -> Vec<String> {
    let mut ids = Vec::with_capacity(pairs.len());
    for (resource, action) in pairs {
        ids.push(permission_id(db, resource, action).await);
    }
    ids
}

/// Audit log actions in insertion order, e.g. `["role.create", "role.delete"]`
pub async fn audit_actions(db: &DatabaseConnection) -> Vec<String> {
    use entities::audit_log::{Column, Entity};
    Entity::find()
        .order_by_asc(Column::Id)
        .all(db)
        .await
        .expect("Failed to query audit logs")
        .into_iter()
        .map(|m| m.action)
        .collect()
}

/// Most recent audit entry for an entity, parsed details included
pub async fn last_audit_for_entity(
    db: &DatabaseConnection,
    entity_type: &str,
    entity_id: &str,
) -> Option<(String, serde_json::Value)> {
    use entities::audit_log::{Column, Entity};
    Entity::find()
        .filter(Column::EntityType.eq(entity_type))
        .filter(Column::EntityId.eq(entity_id))
        .order_by_desc(Column::Id)
        .one(db)
        .await
        .expect("Failed to query audit logs")
        .map(|m| {
            let details = serde_json::from_str(&m.details).expect("audit details not JSON");
            (m.action, details)
        })
}
