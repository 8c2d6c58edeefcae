pub mod config;
pub mod database_ops;
pub mod error;
pub mod models;
pub mod normalization;
pub mod pipeline;
pub mod tracing;

pub mod util {
    pub mod env;
}

pub use config::EtlConfig;
pub use error::{EtlError, Result};
