mod enforcement;
mod error;

pub use enforcement::*;
pub use error::*;
