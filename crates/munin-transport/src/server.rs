//! Listener and event loop.
//!
//! A single task owns the [`MuninNode`] and turns socket events into node
//! notifications:
//!
//! ```text
//! listener.accept() ──► on_accept
//! socket readable   ──► on_receive
//! socket writable   ──► flush ──► on_sent
//! poll interval     ──► on_poll
//! I/O failure       ──► on_error
//! shutdown token    ──► abort, return
//! ```
//!
//! Because the node never leaves this task, no locking is involved.

use std::io;
use std::net::SocketAddr;

use tokio::io::Ready;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use munin_core::{Accept, MuninNode, TransportError};

use crate::tcp::{TcpConnection, TcpTransportConfig};

/// What woke the event loop.
enum Event {
    Shutdown,
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    Ready(io::Result<Ready>),
    Poll,
}

/// A bound Munin listener.
#[derive(Debug)]
pub struct MuninListener {
    listener: TcpListener,
    config: TcpTransportConfig,
}

impl MuninListener {
    /// Binds the listening socket.
    pub async fn bind(addr: impl ToSocketAddrs, config: TcpTransportConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, config })
    }

    /// The address actually bound, including an ephemeral port.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves `node` until `shutdown` is cancelled.
    ///
    /// On shutdown an active session is aborted.
    pub async fn serve(self, mut node: MuninNode<TcpConnection>, shutdown: CancellationToken) {
        let Self { listener, config } = self;
        let mut buf = vec![0u8; config.read_chunk.max(1)];
        let mut poll = tokio::time::interval(config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if let Ok(addr) = listener.local_addr() {
            info!(%addr, node = %node.config().name, "Munin node listening");
        }

        loop {
            let event = {
                let connection = node.transport();
                let polling = connection.is_some();
                // The active session is served before new connections.
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => Event::Shutdown,
                    ready = wait_ready(connection) => Event::Ready(ready),
                    _ = poll.tick(), if polling => Event::Poll,
                    accepted = listener.accept() => Event::Accepted(accepted),
                }
            };

            match event {
                Event::Shutdown => {
                    if node.has_client() {
                        node.abort();
                    }
                    info!("Munin node stopped");
                    return;
                }
                Event::Accepted(Ok((stream, peer))) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
                    }
                    let connection = TcpConnection::new(stream, peer, &config);
                    if node.on_accept(connection) == Accept::Accepted {
                        poll.reset();
                        flush(&mut node);
                    }
                }
                Event::Accepted(Err(e)) => {
                    warn!(error = %e, "Failed to accept connection");
                }
                Event::Ready(Ok(ready)) => {
                    if ready.is_readable() || ready.is_read_closed() {
                        receive(&mut node, &mut buf);
                    }
                    flush(&mut node);
                }
                Event::Ready(Err(e)) => {
                    node.on_error(&TransportError::from(e));
                }
                Event::Poll => {
                    node.on_poll();
                    flush(&mut node);
                }
            }
        }
    }
}

/// Resolves when the connection's socket is ready; never resolves without a
/// connection or without anything to wait for.
async fn wait_ready(connection: Option<&TcpConnection>) -> io::Result<Ready> {
    match connection.and_then(|c| c.interest().map(|interest| (c, interest))) {
        Some((connection, interest)) => connection.ready(interest).await,
        None => std::future::pending().await,
    }
}

fn receive(node: &mut MuninNode<TcpConnection>, buf: &mut [u8]) {
    let Some(connection) = node.transport_mut() else {
        return;
    };
    match connection.try_read(buf) {
        Ok(n) => node.on_receive(Ok(&buf[..n])),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(e) => node.on_receive(Err(TransportError::from(e))),
    }
}

/// Writes queued output to the socket and reports progress to the node.
fn flush(node: &mut MuninNode<TcpConnection>) {
    let Some(connection) = node.transport_mut() else {
        return;
    };
    match connection.flush() {
        Ok(0) => {}
        Ok(n) => {
            node.on_sent(n);
            // Pending output resumed by on_sent sits in the socket buffer now.
            if let Some(connection) = node.transport_mut()
                && let Err(e) = connection.flush()
            {
                node.on_error(&TransportError::from(e));
            }
        }
        Err(e) => node.on_error(&TransportError::from(e)),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use munin_core::{FnPlugin, NodeConfig, PluginRegistry};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);
    const BANNER: &str = "# munin node at metering\n";

    /// A configuration reply well past the node's pending output limit.
    fn label_lines() -> String {
        (0..120)
            .map(|n| format!("field{n}.label some long label text here\n"))
            .collect()
    }

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry
            .register(FnPlugin::new(
                "labels",
                |out| {
                    out.put_str(&label_lines());
                    Ok(())
                },
                |_| Ok(()),
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

    async fn start() -> (SocketAddr, CancellationToken, JoinHandle<()>) {
        let config = TcpTransportConfig {
            poll_interval: Duration::from_millis(20),
            ..TcpTransportConfig::default()
        };
        let listener = MuninListener::bind("127.0.0.1:0", config).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let node = MuninNode::new(NodeConfig::default(), registry());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(listener.serve(node, shutdown.clone()));
        (addr, shutdown, handle)
    }

    async fn read_line(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        timeout(TIMEOUT, reader.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();
        line
    }

    async fn connect(addr: SocketAddr) -> BufReader<TcpStream> {
        let stream = TcpStream::connect(addr).await.unwrap();
        BufReader::new(stream)
    }

    /// Connects until the node greets instead of rejecting.
    async fn connect_when_free(addr: SocketAddr) -> BufReader<TcpStream> {
        for _ in 0..50 {
            let mut client = connect(addr).await;
            if read_line(&mut client).await == BANNER {
                return client;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("node never became free");
    }

    #[tokio::test]
    async fn test_banner_and_version() {
        let (addr, shutdown, handle) = start().await;
        let mut client = connect(addr).await;

        assert_eq!(read_line(&mut client).await, BANNER);
        client.get_mut().write_all(b"version\n").await.unwrap();
        assert_eq!(read_line(&mut client).await, "munin lwIP node version: 0.1\n");

        shutdown.cancel();
        timeout(TIMEOUT, handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_list_and_fetch() {
        let (addr, shutdown, _handle) = start().await;
        let mut client = connect(addr).await;
        read_line(&mut client).await;

        client
            .get_mut()
            .write_all(b"list\r\nfetch volt\r\nconfig nope\r\n")
            .await
            .unwrap();
        assert_eq!(read_line(&mut client).await, "labels volt\n");
        assert_eq!(read_line(&mut client).await, "volt.value 229\n");
        assert_eq!(read_line(&mut client).await, ".\n");
        assert_eq!(read_line(&mut client).await, "# unknown plugin nope\n");

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_long_reply_arrives_whole() {
        let (addr, shutdown, _handle) = start().await;
        let mut client = connect(addr).await;
        read_line(&mut client).await;

        client.get_mut().write_all(b"config labels\n").await.unwrap();
        let mut body = String::new();
        loop {
            let line = read_line(&mut client).await;
            assert!(!line.is_empty(), "connection closed before terminator");
            if line == ".\n" {
                break;
            }
            body.push_str(&line);
        }
        assert!(body.len() > 4096);
        assert_eq!(body, label_lines());

        client.get_mut().write_all(b"version\n").await.unwrap();
        assert_eq!(read_line(&mut client).await, "munin lwIP node version: 0.1\n");

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_second_client_rejected() {
        let (addr, shutdown, _handle) = start().await;
        let mut first = connect(addr).await;
        read_line(&mut first).await;

        let mut second = connect(addr).await;
        let mut rest = Vec::new();
        timeout(TIMEOUT, second.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert!(rest.is_empty());

        first.get_mut().write_all(b"nodes\n").await.unwrap();
        assert_eq!(read_line(&mut first).await, "metering\n");
        assert_eq!(read_line(&mut first).await, ".\n");

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_quit_closes_and_frees_slot() {
        let (addr, shutdown, _handle) = start().await;
        let mut client = connect(addr).await;
        read_line(&mut client).await;

        client.get_mut().write_all(b"version\nquit\n").await.unwrap();
        let mut rest = String::new();
        timeout(TIMEOUT, client.read_to_string(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rest, "munin lwIP node version: 0.1\n");

        let mut next = connect(addr).await;
        assert_eq!(read_line(&mut next).await, BANNER);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_peer_close_frees_slot() {
        let (addr, shutdown, _handle) = start().await;
        let mut client = connect(addr).await;
        read_line(&mut client).await;
        drop(client);

        let mut next = connect_when_free(addr).await;
        next.get_mut().write_all(b"cap\n").await.unwrap();
        assert_eq!(read_line(&mut next).await, "cap\n");

        shutdown.cancel();
    }
}
