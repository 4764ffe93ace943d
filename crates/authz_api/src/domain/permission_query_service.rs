use common::auth::{
    AuthorizationProvider, EffectivePermissionSet, Permission, PermissionRequirement,
    RequestContext,
};
use common::domain::{DomainError, DomainResult};
use common::garde::optional_id;
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Request to resolve a user's effective permissions
#[derive(Debug, Clone, Validate)]
pub struct ResolvePermissionsRequest {
    #[garde(length(min = 1))]
    pub user_id: String,
    #[garde(custom(optional_id))]
    pub campus_id: Option<String>,
}

/// Domain service answering "what may this user do here"
pub struct PermissionQueryService {
    authorization_provider: Arc<dyn AuthorizationProvider>,
}

impl PermissionQueryService {
    pub fn new(authorization_provider: Arc<dyn AuthorizationProvider>) -> Self {
        Self {
            authorization_provider,
        }
    }

    /// Resolve a user's permissions
    ///
    /// Callers resolve their own set with authentication alone. Resolving
    /// another user's set needs `role:read`.
    #[instrument(
        skip(self, ctx, request),
        fields(
            user_id = %request.user_id,
            campus_id = ?request.campus_id
        )
    )]
    pub async fn resolve_permissions(
        &self,
        ctx: &RequestContext,
        request: ResolvePermissionsRequest,
    ) -> DomainResult<Arc<EffectivePermissionSet>> {
        common::garde::validate_struct(&request)?;

        let caller = ctx.user_id().ok_or(DomainError::Unauthenticated)?;
        if caller != request.user_id {
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

        let permissions = self
            .authorization_provider
            .resolve_permissions(ctx, &request.user_id, request.campus_id)
            .await?;

        debug!(
            count = permissions.len(),
            granted_by_super_role = permissions.granted_by_super_role(),
            "permissions resolved"
        );
        Ok(permissions)
    }
}
