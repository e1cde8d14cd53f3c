//! Runtime error types.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use munin_core::RegistryError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plugin could not be registered.
    #[error("Plugin registration failed: {0}")]
    Registry(#[from] RegistryError),

    /// The listen address could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The runtime has already served its plugins.
    #[error("Runtime has already been started")]
    AlreadyStarted,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
