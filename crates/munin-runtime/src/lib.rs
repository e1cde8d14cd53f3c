//! Munin Runtime - configuration, logging and orchestration for the Munin node.
//!
//! This crate provides:
//! - Layered configuration (`MuninConfig`, `ConfigLoader`)
//! - Logging configuration on top of `tracing-subscriber`
//! - Runtime orchestration (`MuninRuntime`)
//!
//! ```ignore
//! use munin_runtime::MuninRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = MuninRuntime::new();
//!     runtime.register_plugins(munin_plugins::builtin_plugins())?;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, MuninConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{MuninRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
