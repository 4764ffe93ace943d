mod campus;
mod permission;
mod responsibility;
mod result;
mod role;
mod role_assignment;
mod role_hierarchy;
mod role_permission;
mod scope;
mod user;

pub use campus::*;
pub use permission::*;
pub use responsibility::*;
pub use result::*;
pub use role::*;
pub use role_assignment::*;
pub use role_hierarchy::*;
pub use role_permission::*;
pub use scope::*;
pub use user::*;
