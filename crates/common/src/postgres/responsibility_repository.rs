use crate::domain::{
    DomainError, DomainResult, GetResponsibilityRepoInput, Responsibility, ResponsibilityKind,
    ResponsibilityRepository, ResponsibilityTransfer, TransferResponsibilityRepoInputWithId,
    DEFAULT_RESPONSIBILITY_CAPACITY,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};

fn responsibility_from_row(row: &Row, kind: ResponsibilityKind) -> Responsibility {
    Responsibility {
        resource_id: row.get("resource_id"),
        kind,
        holder_id: row.get("holder_id"),
        created_at: Some(row.get::<_, DateTime<Utc>>("created_at")),
        updated_at: Some(row.get::<_, DateTime<Utc>>("updated_at")),
    }
}

/// PostgreSQL implementation of ResponsibilityRepository trait
#[derive(Clone)]
pub struct PostgresResponsibilityRepository {
    client: PostgresClient,
}

impl PostgresResponsibilityRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResponsibilityRepository for PostgresResponsibilityRepository {
    #[instrument(skip(self), fields(resource_id = %input.resource_id, kind = %input.kind))]
    async fn get_responsibility(
        &self,
        input: GetResponsibilityRepoInput,
    ) -> DomainResult<Option<Responsibility>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT resource_id, holder_id, created_at, updated_at
                 FROM responsibilities
                 WHERE resource_id = $1 AND kind = $2",
                &[&input.resource_id, &input.kind.as_str()],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| responsibility_from_row(&row, input.kind)))
    }

    #[instrument(
        skip(self),
        fields(
            resource_id = %input.resource_id,
            kind = %input.kind,
            from_user_id = %input.from_user_id,
            to_user_id = %input.to_user_id
        )
    )]
    async fn transfer_responsibility(
        &self,
        input: TransferResponsibilityRepoInputWithId,
    ) -> DomainResult<ResponsibilityTransfer> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;
        let kind = input.kind.as_str();

        let holder = tx
            .query_opt(
                "SELECT holder_id FROM responsibilities
                 WHERE resource_id = $1 AND kind = $2
                 FOR UPDATE",
                &[&input.resource_id, &kind],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;
        let holder_id: String = match holder {
            Some(row) => row.get("holder_id"),
            None => {
                return Err(DomainError::ResponsibilityNotFound(format!(
                    "{} {}",
                    input.kind, input.resource_id
                )))
            }
        };

        if holder_id != input.from_user_id {
            return Err(DomainError::ValidationError(format!(
                "user {} does not hold {} {}",
                input.from_user_id, input.kind, input.resource_id
            )));
        }
        if input.from_user_id == input.to_user_id {
            return Err(DomainError::ValidationError(
                "cannot transfer a responsibility to its current holder".to_string(),
            ));
        }

        let recipient = tx
            .query_opt("SELECT id FROM users WHERE id = $1", &[&input.to_user_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;
        if recipient.is_none() {
            return Err(DomainError::UnknownUser(input.to_user_id.clone()));
        }

        // Serializes concurrent transfers towards the same recipient so the
        // load count below cannot be raced past the capacity
        let lock_key = format!("responsibility:{}:{}", input.to_user_id, kind);
        tx.execute("SELECT pg_advisory_xact_lock(hashtext($1))", &[&lock_key])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let max_load: i64 = tx
            .query_opt(
                "SELECT max_load FROM responsibility_capacities
                 WHERE user_id = $1 AND kind = $2",
                &[&input.to_user_id, &kind],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?
            .map(|row| row.get::<_, i32>("max_load") as i64)
            .unwrap_or(DEFAULT_RESPONSIBILITY_CAPACITY);

        let load: i64 = tx
            .query_one(
                "SELECT COUNT(*) FROM responsibilities WHERE holder_id = $1 AND kind = $2",
                &[&input.to_user_id, &kind],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?
            .get(0);

        if load >= max_load {
            debug!(load, max_load, "recipient at capacity");
            return Err(DomainError::CapacityExceeded(
                input.to_user_id.clone(),
                input.kind.to_string(),
            ));
        }

        let now = Utc::now();
        tx.execute(
            "UPDATE responsibilities SET holder_id = $1, updated_at = $2
             WHERE resource_id = $3 AND kind = $4",
            &[&input.to_user_id, &now, &input.resource_id, &kind],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        tx.execute(
            "INSERT INTO responsibility_transfers
                 (id, resource_id, kind, from_user_id, to_user_id, notes, transferred_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &input.transfer_id,
                &input.resource_id,
                &kind,
                &input.from_user_id,
                &input.to_user_id,
                &input.notes,
                &now,
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(transfer_id = %input.transfer_id, "responsibility transferred");

        Ok(ResponsibilityTransfer {
            id: input.transfer_id,
            resource_id: input.resource_id,
            kind: input.kind,
            from_user_id: input.from_user_id,
            to_user_id: input.to_user_id,
            notes: input.notes,
            transferred_at: now,
        })
    }
}
