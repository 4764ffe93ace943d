mod authorization_store;

pub use authorization_store::*;
