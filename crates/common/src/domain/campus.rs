use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Campus tenant boundary, owned by campus management
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campus {
    pub id: String,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for getting a campus by ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCampusRepoInput {
    pub campus_id: String,
}

/// Read-only access to campuses
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CampusRepository: Send + Sync {
    /// Get a campus by ID
    async fn get_campus(&self, input: GetCampusRepoInput) -> DomainResult<Option<Campus>>;
}
