mod permission_binding_service;
mod permission_query_service;
mod responsibility_service;
mod role_assignment_service;
mod role_service;

pub use permission_binding_service::*;
pub use permission_query_service::*;
pub use responsibility_service::*;
pub use role_assignment_service::*;
pub use role_service::*;
