//! Adapters from CRD specs to storage providers and resolved secrets

mod secrets;
mod storage_config;

pub use secrets::*;
pub use storage_config::*;
