use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Message returned for every authentication failure
pub const UNAUTHENTICATED_MESSAGE: &str = "Authentication required";

/// Message returned for every authorization failure, whichever permission was missing
pub const FORBIDDEN_MESSAGE: &str = "Permission denied";

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied")]
    Forbidden,

    #[error("Role name already exists: {0}")]
    DuplicateName(String),

    #[error("Unknown permission: {0}")]
    UnknownPermission(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Campus not found: {0}")]
    CampusNotFound(String),

    #[error("Invalid parent role: {0}")]
    InvalidParent(String),

    #[error("User {0} has reached the maximum {1} load")]
    CapacityExceeded(String, String),

    #[error("Responsibility not found: {0}")]
    ResponsibilityNotFound(String),

    #[error("Role hierarchy integrity fault: {0}")]
    IntegrityFault(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
