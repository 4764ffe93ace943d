mod operations;

pub use operations::*;
