//! This crate is intended to contain code that is required to provide or
//! improve the observability of the data access layer. That includes
//! initialization logic for metrics and logging.
pub mod config;
pub mod metrics;
pub mod tracing;

pub use config::Config;
