use crate::bootstrap::Bootstrapper;
use crate::domain::{
    PermissionBindingService, PermissionQueryService, ResponsibilityService,
    RoleAssignmentService, RoleService,
};
use crate::grpc::authz_operation_registry;
use common::auth::{AuthorizationProvider, PermissionEnforcer, RepositoryPermissionResolver};
use common::domain::{
    PermissionRepository, ResponsibilityRepository, RoleAssignmentRepository,
    RolePermissionRepository, RoleRepository, UserRepository,
};
use common::grpc::EnforcementLayer;
use common::memory::InMemoryAuthorizationStore;
use common::postgres::{
    PostgresClient, PostgresPermissionRepository, PostgresResponsibilityRepository,
    PostgresRoleAssignmentRepository, PostgresRolePermissionRepository, PostgresRoleRepository,
    PostgresUserRepository,
};
use std::sync::Arc;
use tracing::debug;

/// Storage the authorization engine runs against
#[derive(Clone)]
pub struct AuthzRepositories {
    pub permission: Arc<dyn PermissionRepository>,
    pub role: Arc<dyn RoleRepository>,
    pub role_permission: Arc<dyn RolePermissionRepository>,
    pub role_assignment: Arc<dyn RoleAssignmentRepository>,
    pub responsibility: Arc<dyn ResponsibilityRepository>,
    pub user: Arc<dyn UserRepository>,
}

impl AuthzRepositories {
    pub fn postgres(client: PostgresClient) -> Self {
        Self {
            permission: Arc::new(PostgresPermissionRepository::new(client.clone())),
            role: Arc::new(PostgresRoleRepository::new(client.clone())),
            role_permission: Arc::new(PostgresRolePermissionRepository::new(client.clone())),
            role_assignment: Arc::new(PostgresRoleAssignmentRepository::new(client.clone())),
            responsibility: Arc::new(PostgresResponsibilityRepository::new(client.clone())),
            user: Arc::new(PostgresUserRepository::new(client)),
        }
    }

    pub fn in_memory(store: InMemoryAuthorizationStore) -> Self {
        let store = Arc::new(store);
        Self {
            permission: store.clone(),
            role: store.clone(),
            role_permission: store.clone(),
            role_assignment: store.clone(),
            responsibility: store.clone(),
            user: store,
        }
    }

    pub fn bootstrapper(&self) -> Bootstrapper {
        Bootstrapper::new(
            self.permission.clone(),
            self.role.clone(),
            self.role_assignment.clone(),
            self.user.clone(),
        )
    }
}

/// Administrative services sharing one authorization provider
pub struct AuthzServices {
    pub authorization_provider: Arc<dyn AuthorizationProvider>,
    pub roles: RoleService,
    pub permission_bindings: PermissionBindingService,
    pub role_assignments: RoleAssignmentService,
    pub permission_queries: PermissionQueryService,
    pub responsibilities: ResponsibilityService,
}

impl AuthzServices {
    pub fn new(repositories: &AuthzRepositories) -> Self {
        debug!("Initializing authorization services");

        let resolver = Arc::new(RepositoryPermissionResolver::new(
            repositories.permission.clone(),
            repositories.role.clone(),
            repositories.role_permission.clone(),
            repositories.role_assignment.clone(),
        ));
        let authorization_provider: Arc<dyn AuthorizationProvider> =
            Arc::new(PermissionEnforcer::new(resolver));

        Self {
            roles: RoleService::new(
                repositories.role.clone(),
                repositories.role_permission.clone(),
                repositories.permission.clone(),
                authorization_provider.clone(),
            ),
            permission_bindings: PermissionBindingService::new(
                repositories.role_permission.clone(),
                repositories.permission.clone(),
                authorization_provider.clone(),
            ),
            role_assignments: RoleAssignmentService::new(
                repositories.role_assignment.clone(),
                repositories.role.clone(),
                authorization_provider.clone(),
            ),
            permission_queries: PermissionQueryService::new(authorization_provider.clone()),
            responsibilities: ResponsibilityService::new(
                repositories.responsibility.clone(),
                authorization_provider.clone(),
            ),
            authorization_provider,
        }
    }

    /// Tower layer enforcing the administrative operation table
    pub fn enforcement_layer(&self) -> EnforcementLayer {
        EnforcementLayer::new(self.authorization_provider.clone(), authz_operation_registry())
    }
}
