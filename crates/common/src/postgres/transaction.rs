use crate::domain::{DomainError, DomainResult};
use std::future::Future;
use tracing::warn;

/// Attempts made for a transaction that keeps hitting serialization conflicts
pub const MAX_TRANSACTION_ATTEMPTS: usize = 3;

/// Why one transaction attempt failed
pub(crate) enum TxFailure {
    /// Serialization failure or deadlock; the whole transaction may be retried
    Conflict(tokio_postgres::Error),
    /// Anything else; returned to the caller as is
    Domain(DomainError),
}

impl From<tokio_postgres::Error> for TxFailure {
    fn from(error: tokio_postgres::Error) -> Self {
        if is_retryable(&error) {
            TxFailure::Conflict(error)
        } else {
            TxFailure::Domain(DomainError::RepositoryError(error.into()))
        }
    }
}

impl From<DomainError> for TxFailure {
    fn from(error: DomainError) -> Self {
        TxFailure::Domain(error)
    }
}

fn sql_state(error: &tokio_postgres::Error) -> Option<&str> {
    error.as_db_error().map(|db_err| db_err.code().code())
}

/// PostgreSQL error code 40001 is serialization_failure, 40P01 is deadlock_detected
pub(crate) fn is_retryable(error: &tokio_postgres::Error) -> bool {
    matches!(sql_state(error), Some("40001") | Some("40P01"))
}

/// PostgreSQL error code 23505 is unique_violation
pub(crate) fn is_unique_violation(error: &tokio_postgres::Error) -> bool {
    sql_state(error) == Some("23505")
}

/// Run a transaction, retrying the whole attempt on serialization conflicts
pub(crate) async fn with_retry<T, F, Fut>(
    operation: &'static str,
    mut attempt: F,
) -> DomainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TxFailure>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(TxFailure::Domain(error)) => return Err(error),
            Err(TxFailure::Conflict(error)) if attempts < MAX_TRANSACTION_ATTEMPTS => {
                warn!(
                    operation = operation,
                    attempt = attempts,
                    error = %error,
                    "transaction conflict, retrying"
                );
            }
            Err(TxFailure::Conflict(error)) => {
                return Err(DomainError::RepositoryError(error.into()));
            }
        }
    }
}
