use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Role domain entity
///
/// A role links to at most one parent and inherits every binding of its
/// ancestor chain. `campus_id` is set only for custom roles owned by one
/// campus; global roles carry `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_role_id: Option<String>,
    pub campus_id: Option<String>,
    pub is_super_role: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Role {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// Input for creating a role with a generated ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleRepoInputWithId {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_role_id: Option<String>,
    pub campus_id: Option<String>,
    pub is_super_role: bool,
    /// Permissions bound globally in the same transaction as the insert
    pub permission_ids: Vec<String>,
}

/// Input for getting a role by ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRoleRepoInput {
    pub role_id: String,
}

/// Input for getting several roles at once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRolesRepoInput {
    pub role_ids: Vec<String>,
}

/// Input for getting a role by name within its owning scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRoleByNameRepoInput {
    pub name: String,
    pub campus_id: Option<String>,
}

/// Input for listing roles
///
/// With a campus, global roles and the roles owned by that campus are
/// returned. Without one, only global roles are returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRolesRepoInput {
    pub campus_id: Option<String>,
    pub include_archived: bool,
}

/// Input for re-parenting a role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetRoleParentRepoInput {
    pub role_id: String,
    pub parent_role_id: Option<String>,
}

/// Input for removing a role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRoleRepoInput {
    pub role_id: String,
}

/// How a role was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleRemoval {
    /// No assignment referenced the role, so it was deleted
    Deleted,
    /// Assignments still reference the role, so it was archived
    Archived,
}

/// Repository trait for role storage operations
///
/// `create_role` and `set_role_parent` validate the ancestor chain inside the
/// same transaction as the write.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Create a role with its initial global bindings
    ///
    /// Invalid parents are reported before duplicate names, and an unknown
    /// permission id leaves the store unchanged.
    async fn create_role(&self, input: CreateRoleRepoInputWithId) -> DomainResult<Role>;

    /// Get a role by ID, archived roles included
    async fn get_role(&self, input: GetRoleRepoInput) -> DomainResult<Option<Role>>;

    /// Get every existing role among the given IDs
    async fn get_roles(&self, input: GetRolesRepoInput) -> DomainResult<Vec<Role>>;

    /// Get a role by name within its owning scope
    async fn get_role_by_name(&self, input: GetRoleByNameRepoInput) -> DomainResult<Option<Role>>;

    /// Get the super-role, if it has been bootstrapped
    async fn get_super_role(&self) -> DomainResult<Option<Role>>;

    /// List roles visible from a scope
    async fn list_roles(&self, input: ListRolesRepoInput) -> DomainResult<Vec<Role>>;

    /// Link a role to a new parent, or detach it
    async fn set_role_parent(&self, input: SetRoleParentRepoInput) -> DomainResult<Role>;

    /// Delete a role, or archive it when assignments reference it
    async fn archive_role(&self, input: ArchiveRoleRepoInput) -> DomainResult<RoleRemoval>;
}
