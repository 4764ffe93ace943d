mod campus_repository;
mod client;
mod config;
mod permission_repository;
mod responsibility_repository;
mod role_assignment_repository;
mod role_permission_repository;
mod role_repository;
mod scope;
pub(crate) mod transaction;
mod user_repository;

pub use campus_repository::*;
pub use client::*;
pub use config::*;
pub use permission_repository::*;
pub use responsibility_repository::*;
pub use role_assignment_repository::*;
pub use role_permission_repository::*;
pub use role_repository::*;
pub use user_repository::*;
