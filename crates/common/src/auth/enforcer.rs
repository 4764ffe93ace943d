use crate::auth::{
    AccessDecision, AuthorizationProvider, Denial, EffectivePermissionSet, PermissionRequirement,
    PermissionResolver, RequestContext, ResolvePermissionsInput, ScopeKind,
};
use crate::domain::{DomainError, DomainResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Authorization provider backed by a permission resolver
///
/// Stateless apart from the resolver; memoization lives in the request
/// context passed to each call.
pub struct PermissionEnforcer {
    resolver: Arc<dyn PermissionResolver>,
}

impl PermissionEnforcer {
    pub fn new(resolver: Arc<dyn PermissionResolver>) -> Self {
        Self { resolver }
    }

    fn campus_for(
        requirement: &PermissionRequirement,
        campus_id: Option<String>,
    ) -> DomainResult<Option<String>> {
        match requirement.scope {
            ScopeKind::Global => Ok(None),
            ScopeKind::Campus => match campus_id {
                Some(campus_id) if !campus_id.is_empty() => Ok(Some(campus_id)),
                _ => Err(DomainError::ValidationError(
                    "campus_id is required for a campus-scoped operation".to_string(),
                )),
            },
        }
    }
}

#[async_trait]
impl AuthorizationProvider for PermissionEnforcer {
    #[instrument(skip(self, ctx), fields(user_id = %user_id, campus_id = ?campus_id))]
    async fn resolve_permissions(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        campus_id: Option<String>,
    ) -> DomainResult<Arc<EffectivePermissionSet>> {
        let resolver = self.resolver.clone();
        let input = ResolvePermissionsInput {
            user_id: user_id.to_string(),
            campus_id: campus_id.clone(),
        };

        ctx.permission_cache()
            .get_or_resolve(user_id, campus_id.as_deref(), move || async move {
                resolver.resolve(input).await
            })
            .await
    }

    #[instrument(
        skip(self, ctx),
        fields(
            permission = %requirement.permission,
            scope = ?requirement.scope
        )
    )]
    async fn check_permission(
        &self,
        ctx: &RequestContext,
        requirement: PermissionRequirement,
        campus_id: Option<String>,
    ) -> DomainResult<AccessDecision> {
        let Some(user_id) = ctx.user_id() else {
            debug!("request has no principal");
            return Ok(AccessDecision::Denied(Denial::Unauthenticated));
        };

        let campus_id = Self::campus_for(&requirement, campus_id)?;
        let permissions = self.resolve_permissions(ctx, user_id, campus_id).await?;

        if permissions.contains(requirement.permission) {
            Ok(AccessDecision::Allowed(permissions))
        } else {
            debug!(user_id = %user_id, "permission not granted");
            Ok(AccessDecision::Denied(Denial::Forbidden))
        }
    }

    async fn require_permission(
        &self,
        ctx: &RequestContext,
        requirement: PermissionRequirement,
        campus_id: Option<String>,
    ) -> DomainResult<Arc<EffectivePermissionSet>> {
        match self.check_permission(ctx, requirement, campus_id).await? {
            AccessDecision::Allowed(permissions) => Ok(permissions),
            AccessDecision::Denied(denial) => Err(denial.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MockPermissionResolver, Permission};

    fn resolver_granting(names: &'static [&'static str], times: usize) -> MockPermissionResolver {
        let mut mock = MockPermissionResolver::new();
        mock.expect_resolve()
            .times(times)
            .returning(move |_| Ok(EffectivePermissionSet::from_bindings(names.iter().copied())));
        mock
    }

    #[tokio::test]
    async fn test_unauthenticated_never_touches_resolver() {
        let mut mock = MockPermissionResolver::new();
        mock.expect_resolve().never();
        let enforcer = PermissionEnforcer::new(Arc::new(mock));

        let result = enforcer
            .require_permission(
                &RequestContext::anonymous(),
                PermissionRequirement::global(Permission::RoleCreate),
                None,
            )
            .await;
        assert!(matches!(result, Err(DomainError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_allowed_returns_resolved_set() {
        let enforcer = PermissionEnforcer::new(Arc::new(resolver_granting(
            &["role:create", "role:read"],
            1,
        )));

        let set = enforcer
            .require_permission(
                &RequestContext::authenticated("user-1"),
                PermissionRequirement::global(Permission::RoleCreate),
                None,
            )
            .await
            .unwrap();
        assert!(set.contains(Permission::RoleRead));
    }

    #[tokio::test]
    async fn test_forbidden_message_does_not_name_permission() {
        let enforcer = PermissionEnforcer::new(Arc::new(resolver_granting(&[], 1)));
        let ctx = RequestContext::authenticated("user-1");

        let first = enforcer
            .require_permission(&ctx, PermissionRequirement::global(Permission::RoleCreate), None)
            .await
            .unwrap_err();
        let second = enforcer
            .require_permission(&ctx, PermissionRequirement::global(Permission::CampusDelete), None)
            .await
            .unwrap_err();

        assert!(matches!(first, DomainError::Forbidden));
        assert_eq!(first.to_string(), second.to_string());
        assert!(!first.to_string().contains("role"));
    }

    #[tokio::test]
    async fn test_campus_requirement_needs_campus() {
        let mut mock = MockPermissionResolver::new();
        mock.expect_resolve().never();
        let enforcer = PermissionEnforcer::new(Arc::new(mock));

        let result = enforcer
            .require_permission(
                &RequestContext::authenticated("user-1"),
                PermissionRequirement::campus(Permission::CampusManage),
                None,
            )
            .await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_campus_requirement_resolves_for_campus() {
        let mut mock = MockPermissionResolver::new();
        mock.expect_resolve()
            .withf(|input: &ResolvePermissionsInput| {
                input.user_id == "user-1" && input.campus_id.as_deref() == Some("campus-1")
            })
            .times(1)
            .returning(|_| Ok(EffectivePermissionSet::from_bindings(["campus:manage"])));
        let enforcer = PermissionEnforcer::new(Arc::new(mock));

        let decision = enforcer
            .check_permission(
                &RequestContext::authenticated("user-1"),
                PermissionRequirement::campus(Permission::CampusManage),
                Some("campus-1".to_string()),
            )
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn test_request_context_memoizes_resolution() {
        // Two checks in the same request resolve once
        let enforcer = PermissionEnforcer::new(Arc::new(resolver_granting(&["role:read"], 1)));
        let ctx = RequestContext::authenticated("user-1");

        for permission in [Permission::RoleRead, Permission::RoleCreate] {
            let _ = enforcer
                .check_permission(&ctx, PermissionRequirement::global(permission), None)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_new_request_resolves_again() {
        let enforcer = PermissionEnforcer::new(Arc::new(resolver_granting(&["role:read"], 2)));

        for _ in 0..2 {
            let ctx = RequestContext::authenticated("user-1");
            enforcer
                .require_permission(&ctx, PermissionRequirement::global(Permission::RoleRead), None)
                .await
                .unwrap();
        }
    }
}
