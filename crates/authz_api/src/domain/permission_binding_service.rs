use common::auth::{AuthorizationProvider, Permission, PermissionRequirement, RequestContext};
use common::domain::{
    BindPermissionRepoInputWithId, DomainError, DomainResult, GetPermissionByNameRepoInput,
    PermissionRecord, PermissionRepository, RolePermissionBinding, RolePermissionRepository,
    UnbindPermissionRepoInput,
};
use common::garde::optional_id;
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Request to bind a catalog permission to a role
///
/// Without a campus the binding applies wherever the role is evaluated.
#[derive(Debug, Clone, Validate)]
pub struct BindPermissionRequest {
    #[garde(length(min = 1))]
    pub role_id: String,
    #[garde(length(min = 1))]
    pub permission: String,
    #[garde(custom(optional_id))]
    pub campus_id: Option<String>,
}

/// Request to remove one binding
#[derive(Debug, Clone, Validate)]
pub struct UnbindPermissionRequest {
    #[garde(length(min = 1))]
    pub role_id: String,
    #[garde(length(min = 1))]
    pub permission: String,
    #[garde(custom(optional_id))]
    pub campus_id: Option<String>,
}

/// Domain service for role to permission bindings
pub struct PermissionBindingService {
    role_permission_repository: Arc<dyn RolePermissionRepository>,
    permission_repository: Arc<dyn PermissionRepository>,
    authorization_provider: Arc<dyn AuthorizationProvider>,
}

impl PermissionBindingService {
    pub fn new(
        role_permission_repository: Arc<dyn RolePermissionRepository>,
        permission_repository: Arc<dyn PermissionRepository>,
        authorization_provider: Arc<dyn AuthorizationProvider>,
    ) -> Self {
        Self {
            role_permission_repository,
            permission_repository,
            authorization_provider,
        }
    }

    async fn catalog_entry(&self, name: &str) -> DomainResult<PermissionRecord> {
        self.permission_repository
            .get_permission_by_name(GetPermissionByNameRepoInput {
                name: name.to_string(),
            })
            .await?
            .ok_or_else(|| DomainError::UnknownPermission(name.to_string()))
    }

    /// Bind a permission; binding an existing grant returns it unchanged
    #[instrument(
        skip(self, ctx, request),
        fields(
            role_id = %request.role_id,
            permission = %request.permission,
            campus_id = ?request.campus_id
        )
    )]
    pub async fn bind_permission(
        &self,
        ctx: &RequestContext,
        request: BindPermissionRequest,
    ) -> DomainResult<RolePermissionBinding> {
        common::garde::validate_struct(&request)?;

        debug!(role_id = %request.role_id, permission = %request.permission, "binding permission");

        self.authorization_provider
            .require_permission(
                ctx,
                PermissionRequirement::for_campus(
                    Permission::PermissionManage,
                    request.campus_id.as_deref(),
                ),
                request.campus_id.clone(),
            )
            .await?;

        let permission = self.catalog_entry(&request.permission).await?;

        let binding = self
            .role_permission_repository
            .bind_permission(BindPermissionRepoInputWithId {
                id: xid::new().to_string(),
                role_id: request.role_id,
                permission_id: permission.id,
                campus_id: request.campus_id,
            })
            .await?;

        debug!(binding_id = %binding.id, "permission bound");
        Ok(binding)
    }

    /// Remove a binding; returns false when there was nothing to remove
    #[instrument(
        skip(self, ctx, request),
        fields(
            role_id = %request.role_id,
            permission = %request.permission,
            campus_id = ?request.campus_id
        )
    )]
    pub async fn unbind_permission(
        &self,
        ctx: &RequestContext,
        request: UnbindPermissionRequest,
    ) -> DomainResult<bool> {
        common::garde::validate_struct(&request)?;

        self.authorization_provider
            .require_permission(
                ctx,
                PermissionRequirement::for_campus(
                    Permission::PermissionManage,
                    request.campus_id.as_deref(),
                ),
                request.campus_id.clone(),
            )
            .await?;

        let permission = self.catalog_entry(&request.permission).await?;

        let removed = self
            .role_permission_repository
            .unbind_permission(UnbindPermissionRepoInput {
                role_id: request.role_id,
                permission_id: permission.id,
                campus_id: request.campus_id,
            })
            .await?;

        debug!(removed, "permission unbound");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        allow_all, assign, bind, create_role, deny_all, grant, store_enforcer,
    };
    use common::domain::{MockPermissionRepository, MockRolePermissionRepository};
    use common::memory::InMemoryAuthorizationStore;

    const ADMIN_ID: &str = "admin-1";

    fn store_service(store: &InMemoryAuthorizationStore) -> PermissionBindingService {
        let repos = Arc::new(store.clone());
        PermissionBindingService::new(repos.clone(), repos, store_enforcer(store))
    }

    fn bind_request(
        role_id: &str,
        permission: &str,
        campus_id: Option<&str>,
    ) -> BindPermissionRequest {
        BindPermissionRequest {
            role_id: role_id.to_string(),
            permission: permission.to_string(),
            campus_id: campus_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_bind_unknown_permission() {
        let mut permission_repo = MockPermissionRepository::new();
        permission_repo
            .expect_get_permission_by_name()
            .times(1)
            .return_once(|_| Ok(None));
        let mut binding_repo = MockRolePermissionRepository::new();
        binding_repo.expect_bind_permission().never();

        let service = PermissionBindingService::new(
            Arc::new(binding_repo),
            Arc::new(permission_repo),
            allow_all(),
        );

        let result = service
            .bind_permission(
                &RequestContext::authenticated(ADMIN_ID),
                bind_request("teacher", "class:teleport", None),
            )
            .await;
        assert!(matches!(
            result,
            Err(DomainError::UnknownPermission(name)) if name == "class:teleport"
        ));
    }

    #[tokio::test]
    async fn test_bind_forbidden() {
        let service = PermissionBindingService::new(
            Arc::new(MockRolePermissionRepository::new()),
            Arc::new(MockPermissionRepository::new()),
            deny_all(),
        );

        let result = service
            .bind_permission(
                &RequestContext::authenticated("teacher-1"),
                bind_request("teacher", "class:view", None),
            )
            .await;
        assert!(matches!(result, Err(DomainError::Forbidden)));
    }

    #[tokio::test]
    async fn test_bind_empty_role_id() {
        let service = PermissionBindingService::new(
            Arc::new(MockRolePermissionRepository::new()),
            Arc::new(MockPermissionRepository::new()),
            allow_all(),
        );

        let result = service
            .bind_permission(
                &RequestContext::authenticated(ADMIN_ID),
                bind_request("", "class:view", None),
            )
            .await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_bind_is_idempotent() {
        let store = InMemoryAuthorizationStore::new();
        grant(&store, ADMIN_ID, &[Permission::PermissionManage]).await;
        let teacher = create_role(&store, "teacher", None, None).await;
        let service = store_service(&store);
        let ctx = RequestContext::authenticated(ADMIN_ID);

        let first = service
            .bind_permission(&ctx, bind_request(&teacher.id, "class:view", None))
            .await
            .unwrap();
        let second = service
            .bind_permission(&ctx, bind_request(&teacher.id, "class:view", None))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.permission_name, "class:view");
    }

    #[tokio::test]
    async fn test_bind_to_archived_role_is_unknown_role() {
        let store = InMemoryAuthorizationStore::new();
        grant(&store, ADMIN_ID, &[Permission::PermissionManage]).await;
        let mut archived = create_role(&store, "old-role", None, None).await;
        archived.archived_at = Some(chrono::Utc::now());
        store.insert_role_unchecked(archived.clone()).await;

        let result = store_service(&store)
            .bind_permission(
                &RequestContext::authenticated(ADMIN_ID),
                bind_request(&archived.id, "class:view", None),
            )
            .await;
        assert!(matches!(result, Err(DomainError::UnknownRole(_))));
    }

    #[tokio::test]
    async fn test_bind_unknown_campus() {
        let store = InMemoryAuthorizationStore::new();
        grant(&store, ADMIN_ID, &[Permission::PermissionManage]).await;
        let teacher = create_role(&store, "teacher", None, None).await;

        let result = store_service(&store)
            .bind_permission(
                &RequestContext::authenticated(ADMIN_ID),
                bind_request(&teacher.id, "class:view", Some("campus-404")),
            )
            .await;
        assert!(matches!(result, Err(DomainError::CampusNotFound(_))));
    }

    #[tokio::test]
    async fn test_unbind_missing_binding_is_noop() {
        let store = InMemoryAuthorizationStore::new();
        grant(&store, ADMIN_ID, &[Permission::PermissionManage]).await;
        let teacher = create_role(&store, "teacher", None, None).await;

        let removed = store_service(&store)
            .unbind_permission(
                &RequestContext::authenticated(ADMIN_ID),
                UnbindPermissionRequest {
                    role_id: teacher.id,
                    permission: "class:view".to_string(),
                    campus_id: None,
                },
            )
            .await
            .unwrap();
        assert!(!removed);
    }

    #[tokio::test]
    async fn test_campus_binding_needs_campus_grant_only() {
        let store = InMemoryAuthorizationStore::new();
        grant(&store, ADMIN_ID, &[]).await;
        store.add_campus("campus-1", "North").await;
        let manager = create_role(&store, "campus-manager", None, None).await;
        bind(&store, &manager.id, Permission::PermissionManage, Some("campus-1")).await;
        assign(&store, ADMIN_ID, &manager.id, Some("campus-1")).await;
        let teacher = create_role(&store, "teacher", None, None).await;
        let service = store_service(&store);
        let ctx = RequestContext::authenticated(ADMIN_ID);

        let campus_bind = service
            .bind_permission(&ctx, bind_request(&teacher.id, "class:view", Some("campus-1")))
            .await;
        assert!(campus_bind.is_ok());

        let global_bind = service
            .bind_permission(&ctx, bind_request(&teacher.id, "class:view", None))
            .await;
        assert!(matches!(global_bind, Err(DomainError::Forbidden)));
    }
}
