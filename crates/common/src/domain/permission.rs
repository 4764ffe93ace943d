use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persisted catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Input for inserting a catalog entry when its name is missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertPermissionRepoInput {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Input for looking up a catalog entry by its stable name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetPermissionByNameRepoInput {
    pub name: String,
}

/// Repository trait for the persisted permission catalog
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    /// List the whole catalog ordered by name
    async fn list_permissions(&self) -> DomainResult<Vec<PermissionRecord>>;

    /// Get a catalog entry by name
    async fn get_permission_by_name(
        &self,
        input: GetPermissionByNameRepoInput,
    ) -> DomainResult<Option<PermissionRecord>>;

    /// Insert the entries whose names are missing and return the stored rows
    ///
    /// Existing names keep their id and description.
    async fn upsert_permissions(
        &self,
        input: Vec<UpsertPermissionRepoInput>,
    ) -> DomainResult<Vec<PermissionRecord>>;
}
