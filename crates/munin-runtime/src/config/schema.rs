//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use munin_core::{BackpressurePolicy, WriterConfig};
use munin_transport::TcpTransportConfig;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MuninConfig {
    /// Node identity and listen address.
    #[serde(default)]
    pub node: NodeConfig,

    /// TCP buffer limits and poll timing.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Output backpressure handling.
    #[serde(default)]
    pub output: OutputConfig,

    /// Plugin selection.
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MuninConfig {
    /// Converts to the core node settings.
    pub fn to_core_config(&self) -> munin_core::NodeConfig {
        munin_core::NodeConfig {
            name: self.node.name.clone(),
            writer: self.output.to_writer_config(),
        }
    }
}

// =============================================================================
// Node
// =============================================================================

/// Node identity and listen address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name announced in the banner and the `nodes` reply.
    #[serde(default = "default_node_name")]
    pub name: String,

    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl NodeConfig {
    /// `host:port`, suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_node_name() -> String {
    munin_core::DEFAULT_NODE_NAME.to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    munin_core::MUNIN_PORT
}

// =============================================================================
// Transport
// =============================================================================

/// TCP connection limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Outbound bytes buffered per connection.
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,

    /// Outbound segments buffered per connection.
    #[serde(default = "default_queue_limit")]
    pub queue_limit: usize,

    /// Bytes consecutive writes may share in one segment.
    #[serde(default = "default_segment_size")]
    pub segment_size: usize,

    /// Inbound bytes held before the node acknowledges them.
    #[serde(default = "default_receive_window")]
    pub receive_window: usize,

    /// Largest single socket read.
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,

    /// Idle poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_buffer: default_send_buffer(),
            queue_limit: default_queue_limit(),
            segment_size: default_segment_size(),
            receive_window: default_receive_window(),
            read_chunk: default_read_chunk(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl TransportConfig {
    /// Converts to the TCP transport settings.
    pub fn to_tcp_config(&self) -> TcpTransportConfig {
        TcpTransportConfig {
            send_buffer: self.send_buffer,
            queue_limit: self.queue_limit,
            segment_size: self.segment_size,
            receive_window: self.receive_window,
            read_chunk: self.read_chunk,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

fn default_send_buffer() -> usize {
    8192
}

fn default_queue_limit() -> usize {
    16
}

fn default_segment_size() -> usize {
    1460
}

fn default_receive_window() -> usize {
    4096
}

fn default_read_chunk() -> usize {
    512
}

fn default_poll_interval_ms() -> u64 {
    500
}

// =============================================================================
// Output
// =============================================================================

/// Output writer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// `requeue` keeps unsent output for later; `lossy` drops it.
    #[serde(default)]
    pub backpressure: BackpressurePolicy,

    /// Largest deferred chunk in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Upper bound for deferred output per connection.
    #[serde(default = "default_pending_limit")]
    pub pending_limit: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            backpressure: BackpressurePolicy::default(),
            chunk_size: default_chunk_size(),
            pending_limit: default_pending_limit(),
        }
    }
}

impl OutputConfig {
    /// Converts to the core writer settings.
    pub fn to_writer_config(&self) -> WriterConfig {
        WriterConfig {
            policy: self.backpressure,
            chunk_size: self.chunk_size,
            pending_limit: self.pending_limit,
        }
    }
}

fn default_chunk_size() -> usize {
    256
}

fn default_pending_limit() -> usize {
    4096
}

// =============================================================================
// Plugins
// =============================================================================

/// Plugin selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PluginsConfig {
    /// Plugin names that are skipped at registration.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl PluginsConfig {
    /// Returns `true` if `name` is disabled.
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|disabled| disabled == name)
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lowercase name, as accepted by `EnvFilter` directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation of the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Global level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Include thread IDs.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-target levels, e.g. `munin_core = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,

    #[serde(default)]
    pub span_events: SpanEventConfig,
}
