//! Configuration loading.
//!
//! The manager section is threaded into every registry at construction;
//! the logging section only matters to the binary.

mod loader;
mod types;

pub use loader::ConfigError;
pub use types::{Config, LoggingConfig, ManagerConfig, MAX_REQUEST_SLOTS};
