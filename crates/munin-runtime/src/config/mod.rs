//! Layered node configuration.
//!
//! Sources, lowest precedence first: built-in defaults, the profile file,
//! the base file (or an explicit file), `MUNIN_*` environment variables and
//! programmatic overrides.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, MuninConfig, NodeConfig,
    OutputConfig, PluginsConfig, SpanEventConfig, TransportConfig,
};
pub use validation::validate_config;
