//! The Munin node: one connection slot driven by transport notifications.
//!
//! [`MuninNode`] owns everything a session needs and is driven entirely from
//! the outside. The event loop calls one `on_*` method per notification; each
//! call runs to completion without blocking.
//!
//! ```text
//!            on_accept            quit / peer close, output pending
//!   Idle ───────────────► Accepted ─────────────────────────────► Closing
//!    ▲                       │                                       │
//!    │   quit / peer close,  │                 on_sent / on_poll,    │
//!    │   nothing pending     │                 nothing pending       │
//!    └───────────────────────┴───────────────────────────────────────┘
//!              on_error or abort: back to Idle from any state
//! ```

use tracing::{debug, info, trace, warn};

use crate::accumulator::CommandAccumulator;
use crate::connection::{Connection, ConnectionState};
use crate::dispatcher::{self, Command};
use crate::error::TransportResult;
use crate::output::WriterConfig;
use crate::plugin::PluginRegistry;
use crate::transport::Transport;

/// Node name used when none is configured.
pub const DEFAULT_NODE_NAME: &str = "metering";

/// Node settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Name announced in the banner and the `nodes` reply.
    pub name: String,
    /// Output writer settings.
    pub writer: WriterConfig,
}

impl NodeConfig {
    /// Default settings with a custom node name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NODE_NAME.to_string(),
            writer: WriterConfig::default(),
        }
    }
}

/// Outcome of [`MuninNode::on_accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    /// The handle was installed; route its notifications to the node.
    Accepted,
    /// The node was busy; the new handle has already been closed.
    Rejected,
}

/// Single-client Munin node.
#[derive(Debug)]
pub struct MuninNode<T> {
    config: NodeConfig,
    registry: PluginRegistry,
    accumulator: CommandAccumulator,
    conn: Connection<T>,
}

impl<T: Transport> MuninNode<T> {
    /// Creates an idle node serving `registry`.
    pub fn new(config: NodeConfig, registry: PluginRegistry) -> Self {
        let conn = Connection::new(config.writer);
        Self {
            config,
            registry,
            accumulator: CommandAccumulator::new(),
            conn,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    /// Returns `true` while a client handle is held.
    pub fn has_client(&self) -> bool {
        self.conn.transport().is_some()
    }

    /// The active transport handle, if any.
    pub fn transport(&self) -> Option<&T> {
        self.conn.transport()
    }

    /// Mutable access to the active transport handle, for the event loop.
    pub fn transport_mut(&mut self) -> Option<&mut T> {
        self.conn.transport_mut()
    }

    /// Node settings.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Registered plugins.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Returns `true` while output waits in the pending queue.
    pub fn has_pending_output(&self) -> bool {
        self.conn.writer().has_pending()
    }

    /// A new connection arrived.
    ///
    /// While another client is connected or closing, the new handle is closed
    /// and the active session is left untouched.
    pub fn on_accept(&mut self, transport: T) -> Accept {
        if self.conn.state() != ConnectionState::Idle {
            warn!(
                peer = ?transport.peer_addr(),
                state = ?self.conn.state(),
                "Node busy, rejecting connection"
            );
            transport.close();
            return Accept::Rejected;
        }

        let peer = transport.peer_addr();
        self.accumulator.reset();
        self.conn.install(transport);
        let span = self.conn.span();
        let _entered = span.enter();
        info!(peer = ?peer, node = %self.config.name, "Munin session accepted");

        let banner = format!("# munin node at {}\n", self.config.name);
        self.conn.write(banner.as_bytes());
        Accept::Accepted
    }

    /// Data arrived, the peer closed (`Ok` with no bytes), or reception
    /// failed (`Err`). The last two close the connection gracefully.
    pub fn on_receive(&mut self, received: TransportResult<&[u8]>) {
        let span = self.conn.span();
        let _entered = span.enter();
        let bytes = match received {
            Ok([]) => {
                debug!("Peer closed the connection");
                self.close();
                return;
            }
            Ok(bytes) => bytes,
            Err(error) => {
                debug!(%error, "Reception failed, closing");
                self.close();
                return;
            }
        };

        if self.conn.state() == ConnectionState::Accepted {
            for &byte in bytes {
                if let Some(line) = self.accumulator.feed(byte) {
                    dispatcher::execute(
                        Command::parse(line),
                        &self.config.name,
                        &self.registry,
                        &mut self.conn,
                    );
                    if self.conn.state() != ConnectionState::Accepted {
                        break;
                    }
                }
            }
        } else {
            trace!(len = bytes.len(), state = ?self.conn.state(), "Ignoring input");
        }

        self.conn.acknowledge_received(bytes.len());
    }

    /// The transport acknowledged `len` sent bytes.
    pub fn on_sent(&mut self, len: usize) {
        let span = self.conn.span();
        let _entered = span.enter();
        trace!(len, "Sent acknowledged");
        self.conn.resume();
    }

    /// Periodic poll while a client is connected.
    pub fn on_poll(&mut self) {
        let span = self.conn.span();
        let _entered = span.enter();
        self.conn.resume();
    }

    /// The transport invalidated the handle. It is dropped without being
    /// touched again.
    pub fn on_error(&mut self, error: &crate::error::TransportError) {
        let span = self.conn.span();
        let _entered = span.enter();
        warn!(%error, state = ?self.conn.state(), "Transport error, resetting");
        self.accumulator.reset();
        self.conn.abandon();
    }

    /// Closes the session once pending output has drained.
    pub fn close(&mut self) {
        let span = self.conn.span();
        let _entered = span.enter();
        self.conn.close();
    }

    /// Drops pending output and aborts the transport immediately.
    pub fn abort(&mut self) {
        let span = self.conn.span();
        let _entered = span.enter();
        self.accumulator.reset();
        self.conn.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::VERSION_LINE;
    use crate::error::TransportError;
    use crate::output::BackpressurePolicy;
    use crate::plugin::FnPlugin;
    use crate::testing::MockTransport;

    const BANNER: &str = "# munin node at metering\n";

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry
            .register(FnPlugin::new(
                "temp",
                |out| {
                    out.put_str("graph_title Temperature\ntemp.label C\n");
                    Ok(())
                },
                |out| {
                    out.put_str("temp.value 21\n");
                    Ok(())
                },
            ))
            .unwrap();
        registry
            .register(FnPlugin::new(
                "volt",
                |out| {
                    out.put_str("graph_title Voltage\nvolt.label V\n");
                    Ok(())
                },
                |out| {
                    out.put_str("volt.value 229\n");
                    Ok(())
                },
            ))
            .unwrap();
        registry
    }

    fn node() -> MuninNode<MockTransport> {
        MuninNode::new(NodeConfig::default(), registry())
    }

    /// Accepts `transport` and returns what was sent after the banner for
    /// `input`.
    fn converse(input: &[u8]) -> String {
        let transport = MockTransport::unbounded();
        let mut node = node();
        assert_eq!(node.on_accept(transport.clone()), Accept::Accepted);
        node.on_receive(Ok(input));
        let sent = transport.sent_string();
        sent.strip_prefix(BANNER).unwrap().to_string()
    }

    #[test]
    fn test_banner_on_accept() {
        let transport = MockTransport::unbounded();
        let mut node = node();
        node.on_accept(transport.clone());
        assert_eq!(transport.sent_string(), BANNER);
        assert_eq!(node.state(), ConnectionState::Accepted);
    }

    #[test]
    fn test_banner_uses_configured_name() {
        let transport = MockTransport::unbounded();
        let mut node = MuninNode::new(NodeConfig::named("plant"), registry());
        node.on_accept(transport.clone());
        node.on_receive(Ok(b"nodes\n"));
        assert_eq!(transport.sent_string(), "# munin node at plant\nplant\n.\n");
    }

    #[test]
    fn test_version_scenario() {
        assert_eq!(converse(b"version\n"), VERSION_LINE);
    }

    #[test]
    fn test_list_scenario() {
        assert_eq!(converse(b"list\n"), "temp volt\n");
    }

    #[test]
    fn test_config_scenario() {
        assert_eq!(
            converse(b"config volt\n"),
            "graph_title Voltage\nvolt.label V\n.\n"
        );
    }

    #[test]
    fn test_unknown_plugin_scenario() {
        assert_eq!(converse(b"fetch unknown\n"), "# unknown plugin unknown\n");
    }

    #[test]
    fn test_config_without_name_scenario() {
        assert_eq!(converse(b"config \n"), "# no plugin given\n");
    }

    #[test]
    fn test_quit_scenario() {
        let transport = MockTransport::unbounded();
        let mut node = node();
        node.on_accept(transport.clone());
        node.on_receive(Ok(b"quit\n"));
        assert_eq!(node.state(), ConnectionState::Idle);
        assert!(!node.has_client());
        assert!(transport.state().closed);
    }

    #[test]
    fn test_commands_across_fragments() {
        let transport = MockTransport::unbounded();
        let mut node = node();
        node.on_accept(transport.clone());
        node.on_receive(Ok(b"fet"));
        node.on_receive(Ok(b"ch te"));
        node.on_receive(Ok(b"mp\r\nversion\r\n"));
        assert_eq!(
            transport.sent_string(),
            format!("{BANNER}temp.value 21\n.\n{VERSION_LINE}")
        );
        assert_eq!(transport.state().received_acked, 3 + 5 + 13);
    }

    #[test]
    fn test_commands_after_quit_are_not_dispatched() {
        let transport = MockTransport::unbounded();
        let mut node = node();
        node.on_accept(transport.clone());
        node.on_receive(Ok(b"quit\nversion\n"));
        assert_eq!(transport.sent_string(), BANNER);
    }

    #[test]
    fn test_second_accept_rejected() {
        let first = MockTransport::unbounded();
        let second = MockTransport::unbounded();
        let mut node = node();

        assert_eq!(node.on_accept(first.clone()), Accept::Accepted);
        assert_eq!(node.on_accept(second.clone()), Accept::Rejected);
        assert!(second.state().closed);
        assert!(second.state().sent.is_empty());

        node.on_receive(Ok(b"version\n"));
        assert_eq!(first.sent_string(), format!("{BANNER}{VERSION_LINE}"));
        assert!(!first.state().closed);
    }

    #[test]
    fn test_accept_after_close_starts_fresh_session() {
        let first = MockTransport::unbounded();
        let second = MockTransport::unbounded();
        let mut node = node();

        node.on_accept(first.clone());
        node.on_receive(Ok(b"garbage without newline"));
        node.on_receive(Ok(b""));
        assert!(first.state().closed);

        assert_eq!(node.on_accept(second.clone()), Accept::Accepted);
        node.on_receive(Ok(b"version\n"));
        assert_eq!(second.sent_string(), format!("{BANNER}{VERSION_LINE}"));
    }

    #[test]
    fn test_reception_error_closes() {
        let transport = MockTransport::unbounded();
        let mut node = node();
        node.on_accept(transport.clone());
        node.on_receive(Err(TransportError::ConnectionReset));
        assert_eq!(node.state(), ConnectionState::Idle);
        assert!(transport.state().closed);
    }

    #[test]
    fn test_error_abandons_handle() {
        let transport = MockTransport::unbounded();
        let mut node = node();
        node.on_accept(transport.clone());
        node.on_error(&TransportError::ConnectionReset);
        assert_eq!(node.state(), ConnectionState::Idle);
        assert!(!node.has_client());
        assert!(!transport.state().closed);
        assert!(!transport.state().aborted);

        let next = MockTransport::unbounded();
        assert_eq!(node.on_accept(next), Accept::Accepted);
    }

    #[test]
    fn test_quit_with_pending_output_drains_before_release() {
        let transport = MockTransport::with_limits(BANNER.len(), 16);
        let mut node = node();
        node.on_accept(transport.clone());
        node.on_receive(Ok(b"version\nquit\n"));

        assert_eq!(node.state(), ConnectionState::Closing);
        assert!(node.has_pending_output());
        assert!(!transport.state().closed);
        // The receive credit waits for the reply it produced.
        assert_eq!(transport.state().received_acked, 0);

        node.on_receive(Ok(b"list\n"));
        assert_eq!(transport.state().received_acked, 0);

        transport.peer_ack(256);
        node.on_sent(BANNER.len());
        assert_eq!(transport.sent_string(), format!("{BANNER}{VERSION_LINE}"));
        assert_eq!(transport.state().received_acked, 13 + 5);
        assert_eq!(node.state(), ConnectionState::Closing);

        node.on_poll();
        assert_eq!(node.state(), ConnectionState::Idle);
        assert!(transport.state().closed);
    }

    #[test]
    fn test_accept_while_closing_rejected() {
        let transport = MockTransport::with_limits(BANNER.len(), 16);
        let mut node = node();
        node.on_accept(transport.clone());
        node.on_receive(Ok(b"version\nquit\n"));
        assert_eq!(node.state(), ConnectionState::Closing);

        let second = MockTransport::unbounded();
        assert_eq!(node.on_accept(second.clone()), Accept::Rejected);
        assert!(second.state().closed);
        assert!(second.state().sent.is_empty());
        assert_eq!(node.state(), ConnectionState::Closing);
        assert!(!transport.state().closed);

        transport.peer_ack(256);
        node.on_sent(BANNER.len());
        node.on_poll();
        assert_eq!(transport.sent_string(), format!("{BANNER}{VERSION_LINE}"));
        assert!(transport.state().closed);
    }

    #[test]
    fn test_long_reply_terminated_under_backpressure() {
        let body: String = (0..120)
            .map(|n| format!("field{n}.label some long label text here\n"))
            .collect();
        let mut registry = PluginRegistry::new();
        let config = body.clone();
        registry
            .register(FnPlugin::new(
                "labels",
                move |out| {
                    out.put_str(&config);
                    Ok(())
                },
                |_| Ok(()),
            ))
            .unwrap();
        let transport = MockTransport::with_limits(512, 16);
        let mut node = MuninNode::new(NodeConfig::default(), registry);
        node.on_accept(transport.clone());
        node.on_receive(Ok(b"config labels\n"));

        for _ in 0..64 {
            if !node.has_pending_output() {
                break;
            }
            transport.peer_ack(512);
            node.on_poll();
        }

        let sent = transport.sent_string();
        let dropped = node.conn.writer().dropped_bytes() as usize;
        assert!(dropped > 0);
        assert!(sent.starts_with(&format!("{BANNER}field0.label")));
        assert!(sent.ends_with("\n.\n"));
        assert_eq!(sent.len() + dropped, BANNER.len() + body.len() + 2);
    }

    #[test]
    fn test_requeue_preserves_output_order() {
        let transport = MockTransport::with_limits(BANNER.len() + 10, 16);
        let mut node = node();
        node.on_accept(transport.clone());
        node.on_receive(Ok(b"config temp\nfetch volt\n"));
        assert!(node.has_pending_output());

        for _ in 0..8 {
            transport.peer_ack(16);
            node.on_poll();
        }
        assert!(!node.has_pending_output());
        assert_eq!(
            transport.sent_string(),
            format!("{BANNER}graph_title Temperature\ntemp.label C\n.\nvolt.value 229\n.\n")
        );
    }

    #[test]
    fn test_lossy_policy_drops_unsent_output() {
        let transport = MockTransport::with_limits(BANNER.len(), 16);
        let config = NodeConfig {
            writer: WriterConfig {
                policy: BackpressurePolicy::Lossy,
                ..WriterConfig::default()
            },
            ..NodeConfig::default()
        };
        let mut node = MuninNode::new(config, registry());
        node.on_accept(transport.clone());
        node.on_receive(Ok(b"version\n"));

        assert!(!node.has_pending_output());
        assert_eq!(transport.sent_string(), BANNER);
        assert_eq!(transport.state().received_acked, 8);

        node.on_receive(Ok(b"quit\n"));
        assert_eq!(node.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_abort_discards_pending_output() {
        let transport = MockTransport::with_limits(0, 16);
        let mut node = node();
        node.on_accept(transport.clone());
        assert!(node.has_pending_output());

        node.abort();
        assert!(transport.state().aborted);
        assert!(!node.has_pending_output());
        assert_eq!(node.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_events_without_client_are_ignored() {
        let mut node = node();
        node.on_sent(4);
        node.on_poll();
        node.close();
        node.abort();
        assert_eq!(node.state(), ConnectionState::Idle);
    }
}
