use crate::auth::{AccessDecision, EffectivePermissionSet, PermissionRequirement, RequestContext};
use crate::domain::DomainResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for authorization operations
/// Enables mocking in tests while resolving through the repositories in production
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait AuthorizationProvider: Send + Sync {
    /// Resolve the effective permissions of any user, memoized in the request context
    async fn resolve_permissions(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        campus_id: Option<String>,
    ) -> DomainResult<Arc<EffectivePermissionSet>>;

    /// Decide whether the caller meets a requirement
    ///
    /// `campus_id` is required for campus-scoped requirements and ignored for
    /// global ones.
    async fn check_permission(
        &self,
        ctx: &RequestContext,
        requirement: PermissionRequirement,
        campus_id: Option<String>,
    ) -> DomainResult<AccessDecision>;

    /// Check a requirement and return Unauthenticated or Forbidden when not met
    async fn require_permission(
        &self,
        ctx: &RequestContext,
        requirement: PermissionRequirement,
        campus_id: Option<String>,
    ) -> DomainResult<Arc<EffectivePermissionSet>>;
}
