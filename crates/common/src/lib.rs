pub mod auth;
pub mod domain;
pub mod garde;
pub mod grpc;
pub mod memory;
pub mod postgres;
pub mod telemetry;
