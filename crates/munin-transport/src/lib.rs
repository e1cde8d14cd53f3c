//! # Munin Transport
//!
//! Tokio TCP transport for the Munin node.
//!
//! This crate implements the transport capability set defined in
//! `munin-core` on top of tokio sockets and drives a
//! [`MuninNode`](munin_core::MuninNode) from a single event-loop task.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  munin-runtime      │  (config, logging, signals)
//! ├─────────────────────┤
//! │  munin-transport    │  <- This crate (listener, event loop, TCP handle)
//! ├─────────────────────┤
//! │  munin-core         │  (state machine, dispatcher, plugins)
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use munin_core::{MuninNode, NodeConfig, PluginRegistry};
//! use munin_transport::{MuninListener, TcpTransportConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let listener = MuninListener::bind("0.0.0.0:4949", TcpTransportConfig::default()).await?;
//! let node = MuninNode::new(NodeConfig::default(), PluginRegistry::new());
//! listener.serve(node, CancellationToken::new()).await;
//! ```

pub mod server;
pub mod tcp;

pub use server::MuninListener;
pub use tcp::{TcpConnection, TcpTransportConfig};
