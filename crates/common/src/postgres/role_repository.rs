use crate::domain::{
    validate_parent_link, ArchiveRoleRepoInput, CreateRoleRepoInputWithId, DomainError,
    DomainResult, GetRoleByNameRepoInput, GetRoleRepoInput, GetRolesRepoInput, LinkCandidate,
    ListRolesRepoInput, Role, RoleLink, RoleRemoval, RoleRepository, SetRoleParentRepoInput,
    MAX_ROLE_DEPTH,
};
use crate::postgres::transaction::{is_unique_violation, with_retry, TxFailure};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::{IsolationLevel, Row};
use tracing::{debug, instrument};

const ROLE_COLUMNS: &str = "id, name, description, parent_role_id, campus_id, is_super_role, \
                            archived_at, created_at, updated_at";

/// Role row for PostgreSQL storage with timestamp metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_role_id: Option<String>,
    pub campus_id: Option<String>,
    pub is_super_role: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Row> for RoleRow {
    fn from(row: &Row) -> Self {
        RoleRow {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            parent_role_id: row.get("parent_role_id"),
            campus_id: row.get("campus_id"),
            is_super_role: row.get("is_super_role"),
            archived_at: row.get("archived_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: row.id,
            name: row.name,
            description: row.description,
            parent_role_id: row.parent_role_id,
            campus_id: row.campus_id,
            is_super_role: row.is_super_role,
            archived_at: row.archived_at,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

fn role_from_row(row: &Row) -> Role {
    RoleRow::from(row).into()
}

/// Load the ancestor chain of a role, the role itself first
///
/// Bounded by depth so a corrupted cycle still terminates; repeated ids are
/// left for `validate_parent_link` to report.
async fn load_ancestor_chain(
    tx: &deadpool_postgres::Transaction<'_>,
    role_id: &str,
) -> Result<Vec<RoleLink>, TxFailure> {
    let max_depth = (MAX_ROLE_DEPTH + 1) as i32;
    let rows = tx
        .query(
            "WITH RECURSIVE chain
                 (id, name, parent_role_id, campus_id, is_super_role, archived_at, depth) AS (
                 SELECT id, name, parent_role_id, campus_id, is_super_role, archived_at, 1
                 FROM roles
                 WHERE id = $1
                 UNION ALL
                 SELECT r.id, r.name, r.parent_role_id, r.campus_id, r.is_super_role,
                        r.archived_at, c.depth + 1
                 FROM roles r
                 JOIN chain c ON r.id = c.parent_role_id
                 WHERE c.depth < $2
             )
             SELECT id, name, parent_role_id, campus_id, is_super_role, archived_at
             FROM chain
             ORDER BY depth",
            &[&role_id, &max_depth],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let archived_at: Option<DateTime<Utc>> = row.get("archived_at");
            RoleLink {
                id: row.get("id"),
                name: row.get("name"),
                parent_role_id: row.get("parent_role_id"),
                campus_id: row.get("campus_id"),
                is_super_role: row.get("is_super_role"),
                archived: archived_at.is_some(),
            }
        })
        .collect())
}

/// Levels hanging from a role, the role itself included
async fn load_subtree_depth(
    tx: &deadpool_postgres::Transaction<'_>,
    role_id: &str,
) -> Result<usize, TxFailure> {
    let max_depth = (MAX_ROLE_DEPTH + 1) as i32;
    let row = tx
        .query_one(
            "WITH RECURSIVE subtree (id, depth) AS (
                 SELECT id, 1 FROM roles WHERE id = $1
                 UNION
                 SELECT r.id, s.depth + 1
                 FROM roles r
                 JOIN subtree s ON r.parent_role_id = s.id
                 WHERE s.depth < $2
             )
             SELECT COALESCE(MAX(depth), 1)::BIGINT AS depth FROM subtree",
            &[&role_id, &max_depth],
        )
        .await?;
    let depth: i64 = row.get("depth");
    Ok(usize::try_from(depth).unwrap_or(1))
}

/// Fail with the first requested permission id missing from the catalog
async fn require_permissions(
    tx: &deadpool_postgres::Transaction<'_>,
    permission_ids: &[String],
) -> Result<(), TxFailure> {
    if permission_ids.is_empty() {
        return Ok(());
    }
    let rows = tx
        .query("SELECT id FROM permissions WHERE id = ANY($1)", &[&permission_ids])
        .await?;
    let found: Vec<String> = rows.iter().map(|row| row.get("id")).collect();
    match permission_ids.iter().find(|id| !found.contains(*id)) {
        Some(missing) => Err(DomainError::UnknownPermission(missing.clone()).into()),
        None => Ok(()),
    }
}

async fn require_campus(
    tx: &deadpool_postgres::Transaction<'_>,
    campus_id: Option<&str>,
) -> Result<(), TxFailure> {
    if let Some(campus_id) = campus_id {
        let row = tx
            .query_opt("SELECT id FROM campuses WHERE id = $1", &[&campus_id])
            .await?;
        if row.is_none() {
            return Err(DomainError::CampusNotFound(campus_id.to_string()).into());
        }
    }
    Ok(())
}

/// PostgreSQL implementation of RoleRepository trait
#[derive(Clone)]
pub struct PostgresRoleRepository {
    client: PostgresClient,
}

impl PostgresRoleRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    async fn try_create_role(&self, input: &CreateRoleRepoInputWithId) -> Result<Role, TxFailure> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;
        let tx = conn
            .build_transaction()
            .isolation_level(IsolationLevel::Serializable)
            .start()
            .await?;

        // Parent problems take precedence over a duplicate name
        if let Some(parent_role_id) = input.parent_role_id.as_deref() {
            let chain = load_ancestor_chain(&tx, parent_role_id).await?;
            let candidate = LinkCandidate {
                role_id: &input.id,
                name: &input.name,
                campus_id: input.campus_id.as_deref(),
                subtree_depth: 1,
            };
            validate_parent_link(&candidate, parent_role_id, &chain)?;
        }

        require_campus(&tx, input.campus_id.as_deref()).await?;

        let existing = tx
            .query_opt(
                "SELECT id FROM roles WHERE name = $1 AND campus_id IS NOT DISTINCT FROM $2",
                &[&input.name, &input.campus_id],
            )
            .await?;
        if existing.is_some() {
            return Err(DomainError::DuplicateName(input.name.clone()).into());
        }

        require_permissions(&tx, &input.permission_ids).await?;

        let now = Utc::now();
        let sql = format!(
            "INSERT INTO roles
                 (id, name, description, parent_role_id, campus_id, is_super_role,
                  created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING {}",
            ROLE_COLUMNS
        );
        let row = match tx
            .query_one(
                sql.as_str(),
                &[
                    &input.id,
                    &input.name,
                    &input.description,
                    &input.parent_role_id,
                    &input.campus_id,
                    &input.is_super_role,
                    &now,
                ],
            )
            .await
        {
            Ok(row) => row,
            // Also covers a second super-role
            Err(e) if is_unique_violation(&e) => {
                return Err(DomainError::DuplicateName(input.name.clone()).into())
            }
            Err(e) => return Err(e.into()),
        };

        for permission_id in &input.permission_ids {
            tx.execute(
                "INSERT INTO role_permissions (id, role_id, permission_id, campus_id, created_at)
                 VALUES ($1, $2, $3, NULL, $4)
                 ON CONFLICT (role_id, permission_id, (COALESCE(campus_id, ''))) DO NOTHING",
                &[&xid::new().to_string(), &input.id, permission_id, &now],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(role_from_row(&row))
    }

    async fn try_set_role_parent(&self, input: &SetRoleParentRepoInput) -> Result<Role, TxFailure> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;
        let tx = conn
            .build_transaction()
            .isolation_level(IsolationLevel::Serializable)
            .start()
            .await?;

        let sql = format!("SELECT {} FROM roles WHERE id = $1 FOR UPDATE", ROLE_COLUMNS);
        let role = match tx.query_opt(sql.as_str(), &[&input.role_id]).await? {
            Some(row) => role_from_row(&row),
            None => return Err(DomainError::UnknownRole(input.role_id.clone()).into()),
        };
        if role.is_archived() {
            return Err(DomainError::UnknownRole(input.role_id.clone()).into());
        }
        if role.is_super_role && input.parent_role_id.is_some() {
            return Err(DomainError::InvalidParent(
                "the super-role cannot inherit from another role".to_string(),
            )
            .into());
        }

        if let Some(parent_role_id) = input.parent_role_id.as_deref() {
            let chain = load_ancestor_chain(&tx, parent_role_id).await?;
            let candidate = LinkCandidate {
                role_id: &role.id,
                name: &role.name,
                campus_id: role.campus_id.as_deref(),
                subtree_depth: load_subtree_depth(&tx, &role.id).await?,
            };
            validate_parent_link(&candidate, parent_role_id, &chain)?;
        }

        let sql = format!(
            "UPDATE roles SET parent_role_id = $1, updated_at = $2 WHERE id = $3 RETURNING {}",
            ROLE_COLUMNS
        );
        let row = tx
            .query_one(
                sql.as_str(),
                &[&input.parent_role_id, &Utc::now(), &input.role_id],
            )
            .await?;

        tx.commit().await?;
        Ok(role_from_row(&row))
    }
}

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    #[instrument(skip(self, input), fields(role_id = %input.id, name = %input.name))]
    async fn create_role(&self, input: CreateRoleRepoInputWithId) -> DomainResult<Role> {
        let role = with_retry("create_role", || self.try_create_role(&input)).await?;
        debug!(
            role_id = %role.id,
            bindings = input.permission_ids.len(),
            "role created in database"
        );
        Ok(role)
    }

    #[instrument(skip(self), fields(role_id = %input.role_id))]
    async fn get_role(&self, input: GetRoleRepoInput) -> DomainResult<Option<Role>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!("SELECT {} FROM roles WHERE id = $1", ROLE_COLUMNS);
        let row = conn
            .query_opt(sql.as_str(), &[&input.role_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(role_from_row))
    }

    #[instrument(skip(self, input), fields(count = input.role_ids.len()))]
    async fn get_roles(&self, input: GetRolesRepoInput) -> DomainResult<Vec<Role>> {
        if input.role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!("SELECT {} FROM roles WHERE id = ANY($1)", ROLE_COLUMNS);
        let rows = conn
            .query(sql.as_str(), &[&input.role_ids])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.iter().map(role_from_row).collect())
    }

    #[instrument(skip(self), fields(name = %input.name))]
    async fn get_role_by_name(&self, input: GetRoleByNameRepoInput) -> DomainResult<Option<Role>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!(
            "SELECT {} FROM roles WHERE name = $1 AND campus_id IS NOT DISTINCT FROM $2",
            ROLE_COLUMNS
        );
        let row = conn
            .query_opt(sql.as_str(), &[&input.name, &input.campus_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(role_from_row))
    }

    #[instrument(skip(self))]
    async fn get_super_role(&self) -> DomainResult<Option<Role>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!("SELECT {} FROM roles WHERE is_super_role", ROLE_COLUMNS);
        let row = conn
            .query_opt(sql.as_str(), &[])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(role_from_row))
    }

    #[instrument(skip(self), fields(campus_id = ?input.campus_id))]
    async fn list_roles(&self, input: ListRolesRepoInput) -> DomainResult<Vec<Role>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!(
            "SELECT {} FROM roles
             WHERE (campus_id IS NULL OR campus_id = $1)
               AND ($2 OR archived_at IS NULL)
             ORDER BY name, id",
            ROLE_COLUMNS
        );
        let rows = conn
            .query(sql.as_str(), &[&input.campus_id, &input.include_archived])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(count = rows.len(), "listed roles");
        Ok(rows.iter().map(role_from_row).collect())
    }

    #[instrument(
        skip(self),
        fields(
            role_id = %input.role_id,
            parent_role_id = ?input.parent_role_id
        )
    )]
    async fn set_role_parent(&self, input: SetRoleParentRepoInput) -> DomainResult<Role> {
        let role = with_retry("set_role_parent", || self.try_set_role_parent(&input)).await?;
        debug!(role_id = %role.id, "role parent updated in database");
        Ok(role)
    }

    #[instrument(skip(self), fields(role_id = %input.role_id))]
    async fn archive_role(&self, input: ArchiveRoleRepoInput) -> DomainResult<RoleRemoval> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let sql = format!("SELECT {} FROM roles WHERE id = $1 FOR UPDATE", ROLE_COLUMNS);
        let role = tx
            .query_opt(sql.as_str(), &[&input.role_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?
            .as_ref()
            .map(role_from_row)
            .filter(|role| !role.is_archived())
            .ok_or_else(|| DomainError::UnknownRole(input.role_id.clone()))?;

        if role.is_super_role {
            return Err(DomainError::ValidationError(
                "the super-role cannot be archived".to_string(),
            ));
        }

        let assignments: i64 = tx
            .query_one(
                "SELECT COUNT(*) FROM user_roles WHERE role_id = $1",
                &[&input.role_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?
            .get(0);

        // Bindings cascade and children are detached by the foreign keys
        let removal = if assignments > 0 {
            let now = Utc::now();
            tx.execute(
                "UPDATE roles SET archived_at = $1, updated_at = $1 WHERE id = $2",
                &[&now, &input.role_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;
            RoleRemoval::Archived
        } else {
            tx.execute("DELETE FROM roles WHERE id = $1", &[&input.role_id])
                .await
                .map_err(|e| DomainError::RepositoryError(e.into()))?;
            RoleRemoval::Deleted
        };

        tx.commit()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(role_id = %input.role_id, removal = ?removal, "role removed in database");
        Ok(removal)
    }
}
