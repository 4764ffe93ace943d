use crate::domain::{DomainError, FORBIDDEN_MESSAGE, UNAUTHENTICATED_MESSAGE};
use tonic::Status;

/// Convert domain error to gRPC Status
pub fn domain_error_to_status(error: DomainError) -> Status {
    match error {
        DomainError::Unauthenticated => Status::unauthenticated(UNAUTHENTICATED_MESSAGE),

        DomainError::Forbidden => Status::permission_denied(FORBIDDEN_MESSAGE),

        DomainError::DuplicateName(name) => {
            Status::already_exists(format!("Role name already exists: {}", name))
        }

        DomainError::UnknownPermission(msg)
        | DomainError::UnknownRole(msg)
        | DomainError::UnknownUser(msg)
        | DomainError::CampusNotFound(msg)
        | DomainError::ResponsibilityNotFound(msg) => Status::not_found(msg),

        DomainError::InvalidParent(msg) => {
            Status::invalid_argument(format!("Invalid parent role: {}", msg))
        }

        DomainError::CapacityExceeded(user_id, kind) => Status::failed_precondition(format!(
            "User {} has reached the maximum {} load",
            user_id, kind
        )),

        DomainError::IntegrityFault(msg) => {
            Status::internal(format!("Role hierarchy integrity fault: {}", msg))
        }

        DomainError::RepositoryError(err) => Status::internal(format!("Internal error: {}", err)),

        DomainError::ValidationError(msg) => Status::invalid_argument(msg),
    }
}
