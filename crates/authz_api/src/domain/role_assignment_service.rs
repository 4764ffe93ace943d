use common::auth::{AuthorizationProvider, Permission, PermissionRequirement, RequestContext};
use common::domain::{
    AssignRoleRepoInputWithId, DomainError, DomainResult, GetRoleRepoInput,
    ListUserAssignmentsRepoInput, RevokeRoleRepoInput, Role, RoleAssignment,
    RoleAssignmentRepository, RoleRepository, ScopeFilter,
};
use common::garde::optional_id;
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Request to assign a role to a user, globally or for one campus
#[derive(Debug, Clone, Validate)]
pub struct AssignRoleRequest {
    #[garde(length(min = 1))]
    pub user_id: String,
    #[garde(length(min = 1))]
    pub role_id: String,
    #[garde(custom(optional_id))]
    pub campus_id: Option<String>,
}

/// Request to revoke one assignment
#[derive(Debug, Clone, Validate)]
pub struct RevokeRoleRequest {
    #[garde(length(min = 1))]
    pub user_id: String,
    #[garde(length(min = 1))]
    pub role_id: String,
    #[garde(custom(optional_id))]
    pub campus_id: Option<String>,
}

/// Request to list a user's assignments visible from a scope
#[derive(Debug, Clone, Validate)]
pub struct ListUserRolesRequest {
    #[garde(length(min = 1))]
    pub user_id: String,
    #[garde(custom(optional_id))]
    pub campus_id: Option<String>,
}

/// Domain service for user to role assignments
pub struct RoleAssignmentService {
    role_assignment_repository: Arc<dyn RoleAssignmentRepository>,
    role_repository: Arc<dyn RoleRepository>,
    authorization_provider: Arc<dyn AuthorizationProvider>,
}

impl RoleAssignmentService {
    pub fn new(
        role_assignment_repository: Arc<dyn RoleAssignmentRepository>,
        role_repository: Arc<dyn RoleRepository>,
        authorization_provider: Arc<dyn AuthorizationProvider>,
    ) -> Self {
        Self {
            role_assignment_repository,
            role_repository,
            authorization_provider,
        }
    }

    /// Check the caller may grant or withdraw `role_id` in the campus
    ///
    /// The super-role is assigned only globally and only by a super-role
    /// holder. A campus-owned role is assigned only within its campus.
    async fn authorize_assignment(
        &self,
        ctx: &RequestContext,
        role_id: &str,
        campus_id: Option<&str>,
    ) -> DomainResult<Role> {
        let permissions = self
            .authorization_provider
            .require_permission(
                ctx,
                PermissionRequirement::for_campus(Permission::RoleCampusAssign, campus_id),
                campus_id.map(str::to_string),
            )
            .await?;

        let role = self
            .role_repository
            .get_role(GetRoleRepoInput {
                role_id: role_id.to_string(),
            })
            .await?
            .filter(|role| !role.is_archived())
            .ok_or_else(|| DomainError::UnknownRole(role_id.to_string()))?;

        if role.is_super_role {
            if campus_id.is_some() {
                return Err(DomainError::ValidationError(
                    "the super-role can only be assigned globally".to_string(),
                ));
            }
            if !permissions.granted_by_super_role() {
                warn!(role_id = %role.id, "super-role assignment by non super-role holder");
                return Err(DomainError::Forbidden);
            }
        }

        if let Some(owner) = role.campus_id.as_deref() {
            if campus_id != Some(owner) {
                return Err(DomainError::ValidationError(format!(
                    "role {} can only be assigned within campus {}",
                    role.id, owner
                )));
            }
        }

        Ok(role)
    }

    /// Assign a role; assigning an existing grant returns it unchanged
    #[instrument(
        skip(self, ctx, request),
        fields(
            user_id = %request.user_id,
            role_id = %request.role_id,
            campus_id = ?request.campus_id
        )
    )]
    pub async fn assign_role(
        &self,
        ctx: &RequestContext,
        request: AssignRoleRequest,
    ) -> DomainResult<RoleAssignment> {
        common::garde::validate_struct(&request)?;

        debug!(user_id = %request.user_id, role_id = %request.role_id, "assigning role");

        self.authorize_assignment(ctx, &request.role_id, request.campus_id.as_deref())
            .await?;

        let assignment = self
            .role_assignment_repository
            .assign_role(AssignRoleRepoInputWithId {
                id: xid::new().to_string(),
                user_id: request.user_id,
                role_id: request.role_id,
                campus_id: request.campus_id,
            })
            .await?;

        debug!(assignment_id = %assignment.id, "role assigned");
        Ok(assignment)
    }

    /// Revoke an assignment; returns false when there was nothing to revoke
    ///
    /// Takes effect on the next resolution since permission caches only live
    /// for one request.
    #[instrument(
        skip(self, ctx, request),
        fields(
            user_id = %request.user_id,
            role_id = %request.role_id,
            campus_id = ?request.campus_id
        )
    )]
    pub async fn revoke_role(
        &self,
        ctx: &RequestContext,
        request: RevokeRoleRequest,
    ) -> DomainResult<bool> {
        common::garde::validate_struct(&request)?;

        let permissions = self
            .authorization_provider
            .require_permission(
                ctx,
                PermissionRequirement::for_campus(
                    Permission::RoleCampusAssign,
                    request.campus_id.as_deref(),
                ),
                request.campus_id.clone(),
            )
            .await?;

        // Archived roles can still be revoked, so only the super-role rule applies
        let role = self
            .role_repository
            .get_role(GetRoleRepoInput {
                role_id: request.role_id.clone(),
            })
            .await?;
        if matches!(&role, Some(role) if role.is_super_role) && !permissions.granted_by_super_role()
        {
            return Err(DomainError::Forbidden);
        }

        let revoked = self
            .role_assignment_repository
            .revoke_role(RevokeRoleRepoInput {
                user_id: request.user_id,
                role_id: request.role_id,
                campus_id: request.campus_id,
            })
            .await?;

        debug!(revoked, "role revoked");
        Ok(revoked)
    }

    /// List a user's assignments; a user may always list their own
    #[instrument(
        skip(self, ctx, request),
        fields(
            user_id = %request.user_id,
            campus_id = ?request.campus_id
        )
    )]
    pub async fn list_user_roles(
        &self,
        ctx: &RequestContext,
        request: ListUserRolesRequest,
    ) -> DomainResult<Vec<RoleAssignment>> {
        common::garde::validate_struct(&request)?;

        match ctx.user_id() {
            None => return Err(DomainError::Unauthenticated),
            Some(caller) if caller == request.user_id => {}
            Some(_) => {
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
            }
        }

        self.role_assignment_repository
            .list_user_assignments(ListUserAssignmentsRepoInput {
                user_id: request.user_id,
                scope: ScopeFilter::for_campus(request.campus_id),
            })
            .await
    }
}
