use crate::domain::result::DomainResult;
use crate::domain::ScopeFilter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Grant of one catalog permission to a role
///
/// `campus_id == None` applies wherever the role is evaluated. A campus binding
/// applies only when the role is evaluated for that campus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePermissionBinding {
    pub id: String,
    pub role_id: String,
    pub permission_id: String,
    pub permission_name: String,
    pub campus_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Input for binding a permission with a generated ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindPermissionRepoInputWithId {
    pub id: String,
    pub role_id: String,
    pub permission_id: String,
    pub campus_id: Option<String>,
}

/// Input for removing one binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbindPermissionRepoInput {
    pub role_id: String,
    pub permission_id: String,
    pub campus_id: Option<String>,
}

/// Input for listing the bindings of several roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListBindingsRepoInput {
    pub role_ids: Vec<String>,
    pub scope: ScopeFilter,
}

/// Repository trait for role to permission bindings
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RolePermissionRepository: Send + Sync {
    /// Bind a permission, returning the existing binding when already bound
    async fn bind_permission(
        &self,
        input: BindPermissionRepoInputWithId,
    ) -> DomainResult<RolePermissionBinding>;

    /// Remove a binding, returning whether one existed
    async fn unbind_permission(&self, input: UnbindPermissionRepoInput) -> DomainResult<bool>;

    /// List bindings of the given roles visible through the scope filter
    async fn list_bindings(
        &self,
        input: ListBindingsRepoInput,
    ) -> DomainResult<Vec<RolePermissionBinding>>;
}
