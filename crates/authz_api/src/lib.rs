pub mod bootstrap;
pub mod domain;
pub mod grpc;
pub mod services;

#[cfg(test)]
mod test_support;

pub use bootstrap::*;
pub use domain::*;
pub use grpc::*;
pub use services::*;
