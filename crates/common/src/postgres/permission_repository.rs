use crate::domain::{
    DomainError, DomainResult, GetPermissionByNameRepoInput, PermissionRecord,
    PermissionRepository, UpsertPermissionRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use tracing::{debug, instrument};

/// Permission row for PostgreSQL storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Row> for PermissionRow {
    fn from(row: &Row) -> Self {
        PermissionRow {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            created_at: row.get("created_at"),
        }
    }
}

impl From<PermissionRow> for PermissionRecord {
    fn from(row: PermissionRow) -> Self {
        PermissionRecord {
            id: row.id,
            name: row.name,
            description: row.description,
            created_at: Some(row.created_at),
        }
    }
}

/// PostgreSQL implementation of PermissionRepository trait
#[derive(Clone)]
pub struct PostgresPermissionRepository {
    client: PostgresClient,
}

impl PostgresPermissionRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PermissionRepository for PostgresPermissionRepository {
    #[instrument(skip(self))]
    async fn list_permissions(&self) -> DomainResult<Vec<PermissionRecord>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT id, name, description, created_at FROM permissions ORDER BY name",
                &[],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| PermissionRow::from(row).into())
            .collect())
    }

    #[instrument(skip(self), fields(name = %input.name))]
    async fn get_permission_by_name(
        &self,
        input: GetPermissionByNameRepoInput,
    ) -> DomainResult<Option<PermissionRecord>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT id, name, description, created_at FROM permissions WHERE name = $1",
                &[&input.name],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(|row| PermissionRow::from(row).into()))
    }

    #[instrument(skip(self, input), fields(count = input.len()))]
    async fn upsert_permissions(
        &self,
        input: Vec<UpsertPermissionRepoInput>,
    ) -> DomainResult<Vec<PermissionRecord>> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let now = Utc::now();
        let mut inserted = 0;
        for entry in &input {
            inserted += tx
                .execute(
                    "INSERT INTO permissions (id, name, description, created_at)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (name) DO NOTHING",
                    &[&entry.id, &entry.name, &entry.description, &now],
                )
                .await
                .map_err(|e| DomainError::RepositoryError(e.into()))?;
        }

        let names: Vec<String> = input.iter().map(|entry| entry.name.clone()).collect();
        let rows = tx
            .query(
                "SELECT id, name, description, created_at FROM permissions
                 WHERE name = ANY($1)
                 ORDER BY name",
                &[&names],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(inserted, total = rows.len(), "permission catalog upserted");
        Ok(rows
            .iter()
            .map(|row| PermissionRow::from(row).into())
            .collect())
    }
}
