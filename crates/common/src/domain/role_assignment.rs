use crate::domain::result::DomainResult;
use crate::domain::ScopeFilter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Assignment of a role to a user, globally or for one campus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub id: String,
    pub user_id: String,
    pub role_id: String,
    pub campus_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Input for assigning a role with a generated ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignRoleRepoInputWithId {
    pub id: String,
    pub user_id: String,
    pub role_id: String,
    pub campus_id: Option<String>,
}

/// Input for revoking one assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeRoleRepoInput {
    pub user_id: String,
    pub role_id: String,
    pub campus_id: Option<String>,
}

/// Input for listing a user's assignments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListUserAssignmentsRepoInput {
    pub user_id: String,
    pub scope: ScopeFilter,
}

/// Input for counting the assignments that reference a role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountRoleAssignmentsRepoInput {
    pub role_id: String,
}

/// Repository trait for user to role assignments
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RoleAssignmentRepository: Send + Sync {
    /// Assign a role, returning the existing assignment when already assigned
    async fn assign_role(&self, input: AssignRoleRepoInputWithId) -> DomainResult<RoleAssignment>;

    /// Revoke an assignment, returning whether one existed
    async fn revoke_role(&self, input: RevokeRoleRepoInput) -> DomainResult<bool>;

    /// List a user's assignments visible through the scope filter
    async fn list_user_assignments(
        &self,
        input: ListUserAssignmentsRepoInput,
    ) -> DomainResult<Vec<RoleAssignment>>;

    /// Count the assignments that reference a role
    async fn count_role_assignments(&self, input: CountRoleAssignmentsRepoInput)
        -> DomainResult<i64>;
}
