use crate::domain::{
    BindPermissionRepoInputWithId, DomainError, DomainResult, ListBindingsRepoInput,
    RolePermissionBinding, RolePermissionRepository, UnbindPermissionRepoInput,
};
use crate::postgres::scope::scope_params;
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use tracing::{debug, instrument};

/// Role permission row joined with the permission name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePermissionRow {
    pub id: String,
    pub role_id: String,
    pub permission_id: String,
    pub permission_name: String,
    pub campus_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Row> for RolePermissionRow {
    fn from(row: &Row) -> Self {
        RolePermissionRow {
            id: row.get("id"),
            role_id: row.get("role_id"),
            permission_id: row.get("permission_id"),
            permission_name: row.get("permission_name"),
            campus_id: row.get("campus_id"),
            created_at: row.get("created_at"),
        }
    }
}

impl From<RolePermissionRow> for RolePermissionBinding {
    fn from(row: RolePermissionRow) -> Self {
        RolePermissionBinding {
            id: row.id,
            role_id: row.role_id,
            permission_id: row.permission_id,
            permission_name: row.permission_name,
            campus_id: row.campus_id,
            created_at: Some(row.created_at),
        }
    }
}

/// PostgreSQL implementation of RolePermissionRepository trait
#[derive(Clone)]
pub struct PostgresRolePermissionRepository {
    client: PostgresClient,
}

impl PostgresRolePermissionRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RolePermissionRepository for PostgresRolePermissionRepository {
    #[instrument(
        skip(self),
        fields(
            role_id = %input.role_id,
            permission_id = %input.permission_id
        )
    )]
    async fn bind_permission(
        &self,
        input: BindPermissionRepoInputWithId,
    ) -> DomainResult<RolePermissionBinding> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        // Lock the role so it cannot be deleted underneath the binding
        let role = tx
            .query_opt(
                "SELECT archived_at FROM roles WHERE id = $1 FOR SHARE",
                &[&input.role_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;
        match role {
            Some(row) if row.get::<_, Option<DateTime<Utc>>>("archived_at").is_none() => {}
            _ => return Err(DomainError::UnknownRole(input.role_id.clone())),
        }

        let permission_name: String = tx
            .query_opt(
                "SELECT name FROM permissions WHERE id = $1",
                &[&input.permission_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?
            .map(|row| row.get("name"))
            .ok_or_else(|| DomainError::UnknownPermission(input.permission_id.clone()))?;

        if let Some(campus_id) = &input.campus_id {
            let campus = tx
                .query_opt("SELECT id FROM campuses WHERE id = $1", &[campus_id])
                .await
                .map_err(|e| DomainError::RepositoryError(e.into()))?;
            if campus.is_none() {
                return Err(DomainError::CampusNotFound(campus_id.clone()));
            }
        }

        let now = Utc::now();
        let inserted = tx
            .query_opt(
                "INSERT INTO role_permissions (id, role_id, permission_id, campus_id, created_at)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (role_id, permission_id, (COALESCE(campus_id, ''))) DO NOTHING
                 RETURNING id, created_at",
                &[
                    &input.id,
                    &input.role_id,
                    &input.permission_id,
                    &input.campus_id,
                    &now,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let row = match inserted {
            Some(row) => row,
            None => tx
                .query_one(
                    "SELECT id, created_at FROM role_permissions
                     WHERE role_id = $1 AND permission_id = $2
                       AND campus_id IS NOT DISTINCT FROM $3",
                    &[&input.role_id, &input.permission_id, &input.campus_id],
                )
                .await
                .map_err(|e| DomainError::RepositoryError(e.into()))?,
        };

        tx.commit()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(role_id = %input.role_id, permission = %permission_name, "permission bound");
        Ok(RolePermissionBinding {
            id: row.get("id"),
            role_id: input.role_id,
            permission_id: input.permission_id,
            permission_name,
            campus_id: input.campus_id,
            created_at: Some(row.get("created_at")),
        })
    }

    #[instrument(
        skip(self),
        fields(
            role_id = %input.role_id,
            permission_id = %input.permission_id
        )
    )]
    async fn unbind_permission(&self, input: UnbindPermissionRepoInput) -> DomainResult<bool> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows_affected = conn
            .execute(
                "DELETE FROM role_permissions
                 WHERE role_id = $1 AND permission_id = $2
                   AND campus_id IS NOT DISTINCT FROM $3",
                &[&input.role_id, &input.permission_id, &input.campus_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(rows_affected, "permission unbound");
        Ok(rows_affected > 0)
    }

    #[instrument(skip(self, input), fields(roles = input.role_ids.len(), scope = ?input.scope))]
    async fn list_bindings(
        &self,
        input: ListBindingsRepoInput,
    ) -> DomainResult<Vec<RolePermissionBinding>> {
        if input.role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let (all_campuses, campus_id) = scope_params(&input.scope);
        let rows = conn
            .query(
                "SELECT rp.id, rp.role_id, rp.permission_id, p.name AS permission_name,
                        rp.campus_id, rp.created_at
                 FROM role_permissions rp
                 JOIN permissions p ON p.id = rp.permission_id
                 WHERE rp.role_id = ANY($1)
                   AND ($2 OR rp.campus_id IS NULL OR rp.campus_id = $3)
                 ORDER BY p.name, rp.campus_id NULLS FIRST",
                &[&input.role_ids, &all_campuses, &campus_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| RolePermissionRow::from(row).into())
            .collect())
    }
}
