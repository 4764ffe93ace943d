use crate::domain::{Campus, CampusRepository, DomainError, DomainResult, GetCampusRepoInput};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Campus row for PostgreSQL storage with timestamp metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampusRow {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CampusRow> for Campus {
    fn from(row: CampusRow) -> Self {
        Campus {
            id: row.id,
            name: row.name,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

/// PostgreSQL implementation of CampusRepository trait
#[derive(Clone)]
pub struct PostgresCampusRepository {
    client: PostgresClient,
}

impl PostgresCampusRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CampusRepository for PostgresCampusRepository {
    #[instrument(skip(self), fields(campus_id = %input.campus_id))]
    async fn get_campus(&self, input: GetCampusRepoInput) -> DomainResult<Option<Campus>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT id, name, created_at, updated_at FROM campuses WHERE id = $1",
                &[&input.campus_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| {
            CampusRow {
                id: row.get("id"),
                name: row.get("name"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            }
            .into()
        }))
    }
}
