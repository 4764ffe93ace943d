use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// User as seen by the authorization engine
///
/// The user directory owns these records. The engine only reads them to
/// validate the ids passed to administrative calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for getting a user by ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetUserRepoInput {
    pub user_id: String,
}

/// Read-only access to the user directory
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Get a user by ID
    async fn get_user(&self, input: GetUserRepoInput) -> DomainResult<Option<User>>;
}
