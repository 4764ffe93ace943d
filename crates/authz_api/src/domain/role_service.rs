use common::auth::{
    AuthorizationProvider, Permission, PermissionRequirement, RequestContext, SUPER_ROLE_NAME,
};
use common::domain::{
    ArchiveRoleRepoInput, CreateRoleRepoInputWithId, DomainError, DomainResult,
    GetRoleRepoInput, ListBindingsRepoInput, ListRolesRepoInput, PermissionRepository, Role,
    RolePermissionRepository, RoleRemoval, RoleRepository, ScopeFilter, SetRoleParentRepoInput,
    MAX_ROLE_DEPTH,
};
use common::garde::{optional_id, role_name};
use garde::Validate;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

// ============================================================================
// Service Request Types
// ============================================================================

/// Request to create a custom role
#[derive(Debug, Clone, Validate)]
pub struct CreateRoleRequest {
    #[garde(length(min = 1, max = 64), custom(role_name))]
    pub name: String,
    #[garde(length(max = 512))]
    pub description: Option<String>,
    #[garde(custom(optional_id))]
    pub parent_role_id: Option<String>,
    #[garde(custom(optional_id))]
    pub campus_id: Option<String>,
}

/// Request to get a role by ID
#[derive(Debug, Clone, Validate)]
pub struct GetRoleRequest {
    #[garde(length(min = 1))]
    pub role_id: String,
}

/// Request to list the roles visible from a scope
#[derive(Debug, Clone, Validate)]
pub struct ListRolesRequest {
    #[garde(custom(optional_id))]
    pub campus_id: Option<String>,
    #[garde(skip)]
    pub include_archived: bool,
}

/// Request to link a role to a new parent, or detach it with `None`
#[derive(Debug, Clone, Validate)]
pub struct SetRoleParentRequest {
    #[garde(length(min = 1))]
    pub role_id: String,
    #[garde(custom(optional_id))]
    pub parent_role_id: Option<String>,
}

/// Request to remove a role
#[derive(Debug, Clone, Validate)]
pub struct ArchiveRoleRequest {
    #[garde(length(min = 1))]
    pub role_id: String,
}

/// Request to list the effective permissions of a role
#[derive(Debug, Clone, Validate)]
pub struct ListRolePermissionsRequest {
    #[garde(length(min = 1))]
    pub role_id: String,
    #[garde(custom(optional_id))]
    pub campus_id: Option<String>,
}

/// Permissions a role grants, own and inherited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePermissions {
    pub role: Role,
    /// Role followed by the ancestors that contribute permissions
    pub chain: Vec<String>,
    /// Sorted permission names
    pub permissions: Vec<String>,
    pub granted_by_super_role: bool,
}

/// Domain service for role administration
pub struct RoleService {
    role_repository: Arc<dyn RoleRepository>,
    role_permission_repository: Arc<dyn RolePermissionRepository>,
    permission_repository: Arc<dyn PermissionRepository>,
    authorization_provider: Arc<dyn AuthorizationProvider>,
}

impl RoleService {
    pub fn new(
        role_repository: Arc<dyn RoleRepository>,
        role_permission_repository: Arc<dyn RolePermissionRepository>,
        permission_repository: Arc<dyn PermissionRepository>,
        authorization_provider: Arc<dyn AuthorizationProvider>,
    ) -> Self {
        Self {
            role_repository,
            role_permission_repository,
            permission_repository,
            authorization_provider,
        }
    }

    async fn get_existing_role(&self, role_id: &str) -> DomainResult<Role> {
        self.role_repository
            .get_role(GetRoleRepoInput {
                role_id: role_id.to_string(),
            })
            .await?
            .ok_or_else(|| DomainError::UnknownRole(role_id.to_string()))
    }

    /// Create a custom role, global or owned by one campus
    ///
    /// The super-role flag is never set here; only the bootstrap seed creates
    /// the super-role.
    #[instrument(
        skip(self, ctx, request),
        fields(
            name = %request.name,
            campus_id = ?request.campus_id
        )
    )]
    pub async fn create_role(
        &self,
        ctx: &RequestContext,
        request: CreateRoleRequest,
    ) -> DomainResult<Role> {
        common::garde::validate_struct(&request)?;

        debug!(name = %request.name, "creating role");

        self.authorization_provider
            .require_permission(
                ctx,
                PermissionRequirement::for_campus(
                    Permission::RoleCreate,
                    request.campus_id.as_deref(),
                ),
                request.campus_id.clone(),
            )
            .await?;

        if request.name == SUPER_ROLE_NAME {
            return Err(DomainError::ValidationError(format!(
                "role name {} is reserved",
                SUPER_ROLE_NAME
            )));
        }

        let repo_input = CreateRoleRepoInputWithId {
            id: xid::new().to_string(),
            name: request.name,
            description: request.description,
            parent_role_id: request.parent_role_id,
            campus_id: request.campus_id,
            is_super_role: false,
            permission_ids: Vec::new(),
        };

        let role = self.role_repository.create_role(repo_input).await?;

        debug!(role_id = %role.id, "role created successfully");
        Ok(role)
    }

    /// Get a role by ID, archived roles included
    #[instrument(skip(self, ctx, request), fields(role_id = %request.role_id))]
    pub async fn get_role(
        &self,
        ctx: &RequestContext,
        request: GetRoleRequest,
    ) -> DomainResult<Role> {
        common::garde::validate_struct(&request)?;

        self.authorization_provider
            .require_permission(ctx, PermissionRequirement::global(Permission::RoleRead), None)
            .await?;

        self.get_existing_role(&request.role_id).await
    }

    /// List global roles, plus the roles owned by the campus when one is given
    #[instrument(skip(self, ctx, request), fields(campus_id = ?request.campus_id))]
    pub async fn list_roles(
        &self,
        ctx: &RequestContext,
        request: ListRolesRequest,
    ) -> DomainResult<Vec<Role>> {
        common::garde::validate_struct(&request)?;

        self.authorization_provider
            .require_permission(
                ctx,
                PermissionRequirement::for_campus(
                    Permission::RoleRead,
                    request.campus_id.as_deref(),
                ),
                request.campus_id.clone(),
            )
            .await?;

        let roles = self
            .role_repository
            .list_roles(ListRolesRepoInput {
                campus_id: request.campus_id,
                include_archived: request.include_archived,
            })
            .await?;

        debug!(count = roles.len(), "listed roles");
        Ok(roles)
    }

    /// Link a role beneath a new parent, or detach it
    #[instrument(
        skip(self, ctx, request),
        fields(
            role_id = %request.role_id,
            parent_role_id = ?request.parent_role_id
        )
    )]
    pub async fn set_role_parent(
        &self,
        ctx: &RequestContext,
        request: SetRoleParentRequest,
    ) -> DomainResult<Role> {
        common::garde::validate_struct(&request)?;

        debug!(role_id = %request.role_id, "re-parenting role");

        self.authorization_provider
            .require_permission(ctx, PermissionRequirement::global(Permission::RoleUpdate), None)
            .await?;

        let role = self.get_existing_role(&request.role_id).await?;
        if role.is_archived() {
            return Err(DomainError::UnknownRole(request.role_id));
        }

        let role = self
            .role_repository
            .set_role_parent(SetRoleParentRepoInput {
                role_id: request.role_id,
                parent_role_id: request.parent_role_id,
            })
            .await?;

        debug!(role_id = %role.id, parent_role_id = ?role.parent_role_id, "role re-parented");
        Ok(role)
    }

    /// Delete a role, or archive it while assignments still reference it
    #[instrument(skip(self, ctx, request), fields(role_id = %request.role_id))]
    pub async fn archive_role(
        &self,
        ctx: &RequestContext,
        request: ArchiveRoleRequest,
    ) -> DomainResult<RoleRemoval> {
        common::garde::validate_struct(&request)?;

        self.authorization_provider
            .require_permission(ctx, PermissionRequirement::global(Permission::RoleDelete), None)
            .await?;

        let role = self.get_existing_role(&request.role_id).await?;
        if role.is_super_role {
            return Err(DomainError::ValidationError(
                "the super-role cannot be archived".to_string(),
            ));
        }
        if role.is_archived() {
            debug!(role_id = %role.id, "role already archived");
            return Ok(RoleRemoval::Archived);
        }

        let removal = self
            .role_repository
            .archive_role(ArchiveRoleRepoInput {
                role_id: request.role_id,
            })
            .await?;

        debug!(role_id = %role.id, ?removal, "role removed");
        Ok(removal)
    }

    /// List the permissions a role grants through its own and inherited bindings
    ///
    /// Unlike resolution, a corrupt ancestor chain is reported as
    /// `IntegrityFault` so administrators can repair it.
    #[instrument(
        skip(self, ctx, request),
        fields(
            role_id = %request.role_id,
            campus_id = ?request.campus_id
        )
    )]
    pub async fn list_role_permissions(
        &self,
        ctx: &RequestContext,
        request: ListRolePermissionsRequest,
    ) -> DomainResult<RolePermissions> {
        common::garde::validate_struct(&request)?;

        self.authorization_provider
            .require_permission(
                ctx,
                PermissionRequirement::for_campus(
                    Permission::RoleRead,
                    request.campus_id.as_deref(),
                ),
                request.campus_id.clone(),
            )
            .await?;

        let role = self.get_existing_role(&request.role_id).await?;

        if role.is_super_role {
            let permissions = self
                .permission_repository
                .list_permissions()
                .await?
                .into_iter()
                .map(|p| p.name)
                .collect();
            return Ok(RolePermissions {
                chain: vec![role.id.clone()],
                role,
                permissions,
                granted_by_super_role: true,
            });
        }

        let chain = self.contributing_chain(&role).await?;
        let bindings = if chain.is_empty() {
            Vec::new()
        } else {
            self.role_permission_repository
                .list_bindings(ListBindingsRepoInput {
                    role_ids: chain.clone(),
                    scope: ScopeFilter::for_campus(request.campus_id),
                })
                .await?
        };

        let permissions: BTreeSet<String> =
            bindings.into_iter().map(|b| b.permission_name).collect();

        Ok(RolePermissions {
            role,
            chain,
            permissions: permissions.into_iter().collect(),
            granted_by_super_role: false,
        })
    }

    /// Role ids whose bindings the role inherits
    ///
    /// Archived roles stop the walk. A dangling parent ends it. A repeated id
    /// or a chain deeper than `MAX_ROLE_DEPTH` is an integrity fault.
    async fn contributing_chain(&self, role: &Role) -> DomainResult<Vec<String>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(role.clone());

        while let Some(role) = current.take() {
            if !visited.insert(role.id.clone()) {
                warn!(role_id = %role.id, "cycle in role hierarchy");
                return Err(DomainError::IntegrityFault(format!(
                    "role {} repeats in its own ancestor chain",
                    role.id
                )));
            }
            if chain.len() >= MAX_ROLE_DEPTH {
                warn!(role_id = %role.id, "role hierarchy exceeds maximum depth");
                return Err(DomainError::IntegrityFault(format!(
                    "ancestor chain deeper than {} roles",
                    MAX_ROLE_DEPTH
                )));
            }
            if role.is_archived() || role.is_super_role {
                break;
            }

            chain.push(role.id.clone());

            if let Some(parent_id) = &role.parent_role_id {
                current = self
                    .role_repository
                    .get_role(GetRoleRepoInput {
                        role_id: parent_id.clone(),
                    })
                    .await?;
            }
        }

        Ok(chain)
    }
}
