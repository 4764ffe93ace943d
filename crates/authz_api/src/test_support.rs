//! Fixtures shared by the service tests.

use common::auth::{
    EffectivePermissionSet, MockAuthorizationProvider, Permission, PermissionEnforcer,
    RepositoryPermissionResolver,
};
use common::domain::{
    AssignRoleRepoInputWithId, BindPermissionRepoInputWithId, CreateRoleRepoInputWithId,
    DomainError, PermissionRecord, PermissionRepository, Role, RoleAssignmentRepository,
    RolePermissionRepository, RoleRepository, UpsertPermissionRepoInput,
};
use common::memory::InMemoryAuthorizationStore;
use std::sync::Arc;

pub fn allow_all() -> Arc<MockAuthorizationProvider> {
    let mut mock = MockAuthorizationProvider::new();
    mock.expect_require_permission()
        .returning(|_, _, _| Box::pin(async { Ok(Arc::new(EffectivePermissionSet::empty())) }));
    Arc::new(mock)
}

pub fn deny_all() -> Arc<MockAuthorizationProvider> {
    let mut mock = MockAuthorizationProvider::new();
    mock.expect_require_permission()
        .returning(|_, _, _| Box::pin(async { Err(DomainError::Forbidden) }));
    Arc::new(mock)
}

pub fn role(id: &str, parent: Option<&str>) -> Role {
    Role {
        id: id.to_string(),
        name: id.to_string(),
        description: None,
        parent_role_id: parent.map(str::to_string),
        campus_id: None,
        is_super_role: false,
        archived_at: None,
        created_at: Some(chrono::Utc::now()),
        updated_at: Some(chrono::Utc::now()),
    }
}

/// Enforcer resolving through the store
pub fn store_enforcer(store: &InMemoryAuthorizationStore) -> Arc<PermissionEnforcer> {
    let store = Arc::new(store.clone());
    let resolver = Arc::new(RepositoryPermissionResolver::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store,
    ));
    Arc::new(PermissionEnforcer::new(resolver))
}

pub async fn seed_catalog(store: &InMemoryAuthorizationStore) -> Vec<PermissionRecord> {
    store
        .upsert_permissions(
            Permission::ALL
                .iter()
                .map(|p| UpsertPermissionRepoInput {
                    id: xid::new().to_string(),
                    name: p.as_str().to_string(),
                    description: p.description().to_string(),
                })
                .collect(),
        )
        .await
        .unwrap()
}

pub async fn create_role(
    store: &InMemoryAuthorizationStore,
    id: &str,
    parent: Option<&str>,
    campus_id: Option<&str>,
) -> Role {
    store
        .create_role(CreateRoleRepoInputWithId {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            parent_role_id: parent.map(str::to_string),
            campus_id: campus_id.map(str::to_string),
            is_super_role: false,
            permission_ids: Vec::new(),
        })
        .await
        .unwrap()
}

pub async fn bind(
    store: &InMemoryAuthorizationStore,
    role_id: &str,
    permission: Permission,
    campus_id: Option<&str>,
) {
    let records = store.list_permissions().await.unwrap();
    let record = records
        .iter()
        .find(|r| r.name == permission.as_str())
        .unwrap();
    store
        .bind_permission(BindPermissionRepoInputWithId {
            id: xid::new().to_string(),
            role_id: role_id.to_string(),
            permission_id: record.id.clone(),
            campus_id: campus_id.map(str::to_string),
        })
        .await
        .unwrap();
}

pub async fn assign(
    store: &InMemoryAuthorizationStore,
    user_id: &str,
    role_id: &str,
    campus_id: Option<&str>,
) {
    store
        .assign_role(AssignRoleRepoInputWithId {
            id: xid::new().to_string(),
            user_id: user_id.to_string(),
            role_id: role_id.to_string(),
            campus_id: campus_id.map(str::to_string),
        })
        .await
        .unwrap();
}

/// Seed the catalog and give the user a global role bound to the permissions
pub async fn grant(store: &InMemoryAuthorizationStore, user_id: &str, permissions: &[Permission]) {
    if store.list_permissions().await.unwrap().is_empty() {
        seed_catalog(store).await;
    }
    let role_id = format!("grant-{}", user_id);
    create_role(store, &role_id, None, None).await;
    for permission in permissions {
        bind(store, &role_id, *permission, None).await;
    }
    store.add_user(user_id, user_id).await;
    assign(store, user_id, &role_id, None).await;
}

/// Seed the catalog and make the user a super-role holder
pub async fn grant_super_role(store: &InMemoryAuthorizationStore, user_id: &str) -> Role {
    if store.list_permissions().await.unwrap().is_empty() {
        seed_catalog(store).await;
    }
    let super_role = store
        .create_role(CreateRoleRepoInputWithId {
            id: "super".to_string(),
            name: common::auth::SUPER_ROLE_NAME.to_string(),
            description: None,
            parent_role_id: None,
            campus_id: None,
            is_super_role: true,
            permission_ids: Vec::new(),
        })
        .await
        .unwrap();
    store.add_user(user_id, user_id).await;
    assign(store, user_id, &super_role.id, None).await;
    super_role
}
