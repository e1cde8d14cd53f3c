//! Unified error types for the Munin protocol core.
//!
//! Transport errors describe what the transport collaborator reports back to
//! the core; plugin and registry errors cover the metric side.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors reported by a [`Transport`](crate::Transport) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The send window or the unacknowledged-segment queue cannot take the data
    /// right now. Recoverable: retry after the next acknowledgement or poll.
    #[error("insufficient send resources")]
    InsufficientResources,

    /// The peer reset the connection.
    #[error("connection reset by peer")]
    ConnectionReset,

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Returns `true` for the recoverable "try again later" condition.
    pub fn is_insufficient_resources(&self) -> bool {
        matches!(self, Self::InsufficientResources)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe => {
                Self::ConnectionReset
            }
            std::io::ErrorKind::NotConnected => Self::Closed,
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

// =============================================================================
// Plugin Errors
// =============================================================================

/// Errors a plugin capability may return while producing output.
///
/// The node logs these; the client still receives the `.` terminator.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The metric source could not be read.
    #[error("metric source unavailable: {0}")]
    Unavailable(String),

    /// I/O error while collecting a metric.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Formatting into the output sink failed.
    #[error("failed to format plugin output")]
    Format(#[from] std::fmt::Error),
}

impl PluginError {
    /// Creates an `Unavailable` error with the given reason.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }
}

/// Result type for plugin capabilities.
pub type PluginResult<T> = Result<T, PluginError>;

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors raised while building a [`PluginRegistry`](crate::PluginRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A plugin with this name is already registered.
    #[error("plugin '{0}' is already registered")]
    DuplicateName(String),

    /// The plugin name cannot be addressed by a protocol command.
    #[error("invalid plugin name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl RegistryError {
    /// Creates an invalid-name error.
    pub fn invalid_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason,
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
