mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::db::{permission_ids, seed_user, TestDb};
use lodestone::rbac::cache::MemoryPermissionCache;
use lodestone::rbac::check::can;
use lodestone::rbac::registry::{Action, Resource};
use lodestone::rbac::roles::{EDITOR_ROLE_KEY, SUPER_ADMIN_ROLE_KEY, VIEWER_ROLE_KEY};
use lodestone::rbac::RbacService;
use lodestone::storage;

#[tokio::test]
async fn test_editor_end_to_end() {
    let test_db = TestDb::new().await;
    let svc = test_db.service();

    let user = seed_user(test_db.connection(), "edith", Some(EDITOR_ROLE_KEY)).await;
    let actor = svc.load_actor(&user.id).await.unwrap().unwrap();

    assert!(can(Some(&actor), Resource::Post, Action::Update));
    assert!(can(Some(&actor), Resource::Media, Action::Create));
    assert!(!can(Some(&actor), Resource::User, Action::Read));
    assert!(!can(Some(&actor), Resource::Product, Action::Delete));
    assert!(!can(None, Resource::Post, Action::Read));
}

#[tokio::test]
async fn test_super_admin_always_allowed() {
    let test_db = TestDb::new().await;
    let svc = test_db.service();

    let user = seed_user(test_db.connection(), "root", Some(SUPER_ADMIN_ROLE_KEY)).await;
    let actor = svc.load_actor(&user.id).await.unwrap().unwrap();

    for resource in Resource::ALL {
        for action in Action::ALL {
            assert!(can(Some(&actor), resource, action));
        }
    }
}

#[tokio::test]
async fn test_unknown_or_roleless_user_has_no_permissions() {
    let test_db = TestDb::new().await;
    let svc = test_db.service();

    // Unknown user resolves to an empty map, not an error
    let permissions = svc.user_permissions("no-such-user").await.unwrap();
    assert!(permissions.is_empty());

    // A user without a role likewise has no permissions
    let user = seed_user(test_db.connection(), "limbo", None).await;
    let permissions = svc.user_permissions(&user.id).await.unwrap();
    assert!(permissions.is_empty());
    assert!(svc.load_actor("no-such-user").await.unwrap().is_none());
}

#[tokio::test]
async fn test_permissions_are_cached_until_invalidated() {
    let test_db = TestDb::new().await;
    let svc = test_db.service();
    let db = test_db.connection();

    let user = seed_user(db, "edith", Some(EDITOR_ROLE_KEY)).await;
    let role_id = user.role_id.clone().unwrap();

    // First resolution populates the cache
    let permissions = svc.user_permissions(&user.id).await.unwrap();
    assert!(permissions.allows(Resource::Post, Action::Update));

    // Strip the role's permissions behind the engine's back; the cached map
    // must keep serving until explicitly invalidated
    storage::set_role_permissions(db, &role_id, &[]).await.unwrap();
    let permissions = svc.user_permissions(&user.id).await.unwrap();
    assert!(permissions.allows(Resource::Post, Action::Update));

    svc.invalidate_user_permissions(&user.id).await;
    let permissions = svc.user_permissions(&user.id).await.unwrap();
    assert!(!permissions.allows(Resource::Post, Action::Update));
    assert!(permissions.is_empty());
}

#[tokio::test]
async fn test_cache_entry_expires_after_ttl() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();
    let svc = RbacService::new(
        db.clone(),
        Arc::new(MemoryPermissionCache::new()),
        Duration::from_millis(50),
    );

    let user = seed_user(db, "edith", Some(EDITOR_ROLE_KEY)).await;
    let role_id = user.role_id.clone().unwrap();

    let permissions = svc.user_permissions(&user.id).await.unwrap();
    assert!(permissions.allows(Resource::Post, Action::Update));

    storage::set_role_permissions(db, &role_id, &[]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    // TTL elapsed: the next read falls through to storage
    let permissions = svc.user_permissions(&user.id).await.unwrap();
    assert!(permissions.is_empty());
}

#[tokio::test]
async fn test_invalidate_by_role_spares_other_roles() {
    let test_db = TestDb::new().await;
    let svc = test_db.service();
    let db = test_db.connection();

    let editor = seed_user(db, "edith", Some(EDITOR_ROLE_KEY)).await;
    let viewer = seed_user(db, "vera", Some(VIEWER_ROLE_KEY)).await;
    let editor_role_id = editor.role_id.clone().unwrap();
    let viewer_role_id = viewer.role_id.clone().unwrap();

    // Prime both cache entries
    assert!(svc
        .user_permissions(&editor.id)
        .await
        .unwrap()
        .allows(Resource::Post, Action::Update));
    assert!(svc
        .user_permissions(&viewer.id)
        .await
        .unwrap()
        .allows(Resource::Post, Action::Read));

    // Change both roles in storage, then invalidate only the editor role
    storage::set_role_permissions(db, &editor_role_id, &[]).await.unwrap();
    storage::set_role_permissions(db, &viewer_role_id, &[]).await.unwrap();
    svc.invalidate_permissions_by_role(&editor_role_id)
        .await
        .unwrap();

    // Editor entry was refreshed from storage; viewer entry still serves the
    // cached map
    assert!(svc.user_permissions(&editor.id).await.unwrap().is_empty());
    assert!(svc
        .user_permissions(&viewer.id)
        .await
        .unwrap()
        .allows(Resource::Post, Action::Read));
}

#[tokio::test]
async fn test_seed_rbac_is_idempotent() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    let roles_before = storage::list_roles(db).await.unwrap().len();
    let viewer_id = helpers::db::role_id_by_key(db, VIEWER_ROLE_KEY).await;
    let perms_before = storage::find_role_permissions(db, &viewer_id)
        .await
        .unwrap()
        .len();

    // TestDb::new already seeded once; a second pass must change nothing
    storage::seed_rbac(db).await.unwrap();

    assert_eq!(storage::list_roles(db).await.unwrap().len(), roles_before);
    assert_eq!(
        storage::find_role_permissions(db, &viewer_id)
            .await
            .unwrap()
            .len(),
        perms_before
    );
}

#[tokio::test]
async fn test_viewer_permission_ids_resolve() {
    // Smoke check that seeded permission rows resolve through the id lookup
    // used by the mutation guard
    let test_db = TestDb::new().await;
    let db = test_db.connection();

    let ids = permission_ids(db, &[("POST", "READ"), ("MEDIA", "READ")]).await;
    let found = storage::find_permissions_by_ids(db, &ids).await.unwrap();
    assert_eq!(found.len(), 2);
}
