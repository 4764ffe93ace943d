mod config;
mod init;
mod trace_context_processor;

pub use config::*;
pub use init::*;
pub use trace_context_processor::*;
