mod authorization_service;
mod cache;
mod catalog;
mod context;
mod effective_permissions;
mod enforcer;
mod requirement;
mod resolver;

pub use authorization_service::*;
pub use cache::*;
pub use catalog::*;
pub use context::*;
pub use effective_permissions::*;
pub use enforcer::*;
pub use requirement::*;
pub use resolver::*;
