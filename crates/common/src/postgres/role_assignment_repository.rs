use crate::domain::{
    AssignRoleRepoInputWithId, CountRoleAssignmentsRepoInput, DomainError, DomainResult,
    ListUserAssignmentsRepoInput, RevokeRoleRepoInput, RoleAssignment, RoleAssignmentRepository,
};
use crate::postgres::scope::scope_params;
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use tracing::{debug, instrument};

/// User role row for PostgreSQL storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRoleRow {
    pub id: String,
    pub user_id: String,
    pub role_id: String,
    pub campus_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Row> for UserRoleRow {
    fn from(row: &Row) -> Self {
        UserRoleRow {
            id: row.get("id"),
            user_id: row.get("user_id"),
            role_id: row.get("role_id"),
            campus_id: row.get("campus_id"),
            created_at: row.get("created_at"),
        }
    }
}

impl From<UserRoleRow> for RoleAssignment {
    fn from(row: UserRoleRow) -> Self {
        RoleAssignment {
            id: row.id,
            user_id: row.user_id,
            role_id: row.role_id,
            campus_id: row.campus_id,
            created_at: Some(row.created_at),
        }
    }
}

/// PostgreSQL implementation of RoleAssignmentRepository trait
#[derive(Clone)]
pub struct PostgresRoleAssignmentRepository {
    client: PostgresClient,
}

impl PostgresRoleAssignmentRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RoleAssignmentRepository for PostgresRoleAssignmentRepository {
    #[instrument(
        skip(self),
        fields(
            user_id = %input.user_id,
            role_id = %input.role_id,
            campus_id = ?input.campus_id
        )
    )]
    async fn assign_role(&self, input: AssignRoleRepoInputWithId) -> DomainResult<RoleAssignment> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let user = tx
            .query_opt("SELECT id FROM users WHERE id = $1", &[&input.user_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;
        if user.is_none() {
            return Err(DomainError::UnknownUser(input.user_id.clone()));
        }

        // FOR SHARE keeps a concurrent archive from deleting the role
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
                "INSERT INTO user_roles (id, user_id, role_id, campus_id, created_at)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (user_id, role_id, (COALESCE(campus_id, ''))) DO NOTHING
                 RETURNING id, user_id, role_id, campus_id, created_at",
                &[
                    &input.id,
                    &input.user_id,
                    &input.role_id,
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
                    "SELECT id, user_id, role_id, campus_id, created_at FROM user_roles
                     WHERE user_id = $1 AND role_id = $2
                       AND campus_id IS NOT DISTINCT FROM $3",
                    &[&input.user_id, &input.role_id, &input.campus_id],
                )
                .await
                .map_err(|e| DomainError::RepositoryError(e.into()))?,
        };

        tx.commit()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(user_id = %input.user_id, role_id = %input.role_id, "role assigned");
        Ok(UserRoleRow::from(&row).into())
    }

    #[instrument(
        skip(self),
        fields(
            user_id = %input.user_id,
            role_id = %input.role_id,
            campus_id = ?input.campus_id
        )
    )]
    async fn revoke_role(&self, input: RevokeRoleRepoInput) -> DomainResult<bool> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows_affected = conn
            .execute(
                "DELETE FROM user_roles
                 WHERE user_id = $1 AND role_id = $2
                   AND campus_id IS NOT DISTINCT FROM $3",
                &[&input.user_id, &input.role_id, &input.campus_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(rows_affected, "role revoked");
        Ok(rows_affected > 0)
    }

    #[instrument(skip(self), fields(user_id = %input.user_id))]
    async fn list_user_assignments(
        &self,
        input: ListUserAssignmentsRepoInput,
    ) -> DomainResult<Vec<RoleAssignment>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let (all_campuses, campus_id) = scope_params(&input.scope);
        let rows = conn
            .query(
                "SELECT id, user_id, role_id, campus_id, created_at FROM user_roles
                 WHERE user_id = $1
                   AND ($2 OR campus_id IS NULL OR campus_id = $3)
                 ORDER BY created_at, id",
                &[&input.user_id, &all_campuses, &campus_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| UserRoleRow::from(row).into())
            .collect())
    }

    #[instrument(skip(self), fields(role_id = %input.role_id))]
    async fn count_role_assignments(
        &self,
        input: CountRoleAssignmentsRepoInput,
    ) -> DomainResult<i64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_one(
                "SELECT COUNT(*) FROM user_roles WHERE role_id = $1",
                &[&input.role_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.get(0))
    }
}
