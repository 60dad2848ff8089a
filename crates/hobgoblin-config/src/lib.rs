//! Configuration loading and logger bootstrap shared by every Hobgoblin
//! host (spec.md §3 AMBIENT: configuration/logging).

pub mod config;
pub mod error;
pub mod logging;

pub use config::{AppConfig, RuntimeConfig, TransportConfig, DEFAULT_PORT};
pub use error::{ConfigError, LoggingError};
