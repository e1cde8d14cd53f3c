//! # Munin
//!
//! A Munin node: answers the munin-node text protocol on TCP port 4949 for
//! one client at a time, serving metrics from registered plugins.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  events   ┌────────────┐  commands  ┌────────────────┐
//! │ MuninListener│──────────▶│ MuninNode  │───────────▶│ PluginRegistry │
//! │ (tokio TCP)  │◀──────────│ (sans-IO)  │◀───────────│ uptime, load…  │
//! └──────────────┘   writes  └────────────┘   output   └────────────────┘
//! ```
//!
//! - **Core**: connection state machine, command parsing, output backpressure
//! - **Transport**: tokio TCP connection and the single-task event loop
//! - **Runtime**: layered configuration, logging, signal handling
//! - **Plugins**: built-in metric sources
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use munin::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = MuninRuntime::new();
//!     runtime.register_plugins(builtin_plugins())?;
//!     runtime.register_plugin(FnPlugin::new(
//!         "volt",
//!         |out| {
//!             out.put_str("graph_title Voltage\nvolt.label V\n");
//!             Ok(())
//!         },
//!         |out| {
//!             out.put_str("volt.value 229\n");
//!             Ok(())
//!         },
//!     ))?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log format

pub use munin_core as core;
pub use munin_plugins as plugins;
pub use munin_runtime as runtime;
pub use munin_transport as transport;

/// Prelude module for convenient imports.
pub mod prelude {
    // Runtime - main entry point
    pub use munin_runtime::{MuninConfig, MuninRuntime, RuntimeError, RuntimeResult};

    // Plugin interface
    pub use munin_core::{
        BoxedPlugin, FnPlugin, Plugin, PluginError, PluginOutput, PluginRegistry, PluginResult,
    };

    // Built-in plugins
    pub use munin_plugins::builtin_plugins;
}
