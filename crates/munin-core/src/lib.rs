//! # Munin Core
//!
//! The protocol engine of a single-client Munin node.
//!
//! This crate performs no I/O. A transport collaborator implements
//! [`Transport`] and feeds notifications into a [`MuninNode`], which parses
//! commands, runs plugins, and writes replies back through the transport with
//! backpressure handling.
//!
//! ## Data Flow
//!
//! ```text
//! ┌───────────┐ bytes ┌─────────────┐ line ┌────────────┐      ┌─────────┐
//! │ Transport │──────▶│ Accumulator │─────▶│ Dispatcher │─────▶│ Plugins │
//! └───────────┘       └─────────────┘      └────────────┘      └─────────┘
//!       ▲                                        │                  │
//!       │            ┌──────────────┐            │  ┌────────────┐  │
//!       └────────────│ OutputWriter │◀───────────┴──│ CharBuffer │◀─┘
//!                    └──────────────┘               └────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use munin_core::{FnPlugin, MuninNode, NodeConfig, PluginRegistry};
//!
//! let mut registry = PluginRegistry::new();
//! registry.register(FnPlugin::new(
//!     "volt",
//!     |out| { out.put_str("graph_title Voltage\nvolt.label V\n"); Ok(()) },
//!     |out| { out.put_str("volt.value 229\n"); Ok(()) },
//! ))?;
//!
//! let mut node = MuninNode::new(NodeConfig::default(), registry);
//! node.on_accept(transport);
//! node.on_receive(Ok(b"fetch volt\n"));
//! ```

pub mod accumulator;
mod connection;
pub mod dispatcher;
pub mod error;
pub mod node;
pub mod output;
pub mod plugin;
pub mod sink;
pub mod transport;

#[cfg(test)]
mod testing;

/// Well-known Munin TCP port.
pub const MUNIN_PORT: u16 = 4949;

pub use accumulator::{COMMAND_BUFFER_CAPACITY, CommandAccumulator};
pub use connection::ConnectionState;
pub use dispatcher::Command;
pub use error::{
    PluginError, PluginResult, RegistryError, RegistryResult, TransportError, TransportResult,
};
pub use node::{Accept, DEFAULT_NODE_NAME, MuninNode, NodeConfig};
pub use output::{BackpressurePolicy, OutputWriter, WriterConfig};
pub use plugin::{BoxedPlugin, FnPlugin, MAX_PLUGIN_NAME_LEN, Plugin, PluginRegistry};
pub use sink::{CharSink, OUTPUT_BUFFER_CAPACITY, PluginOutput};
pub use transport::Transport;
