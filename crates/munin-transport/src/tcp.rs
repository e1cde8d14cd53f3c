//! Tokio TCP implementation of the core transport capability set.
//!
//! The core expects an lwIP-like transport: a bounded send buffer with a
//! segment limit, and an explicit receive window that only grows when the
//! node acknowledges consumed bytes. [`TcpConnection`] emulates both on top
//! of a non-blocking [`TcpStream`]; the kernel's own flow control then pushes
//! back on the peer whenever the emulated receive window is exhausted.
//!
//! Small writes are merged into the last queued segment until it reaches
//! `segment_size`, so a reply emitted a few bytes at a time costs segments in
//! proportion to its length, not to the number of writes.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, Interest};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use munin_core::{Transport, TransportError, TransportResult};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Buffer limits and timing for TCP connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpTransportConfig {
    /// Outbound bytes buffered before writes report insufficient resources.
    pub send_buffer: usize,
    /// Outbound segments buffered before the socket must drain.
    pub queue_limit: usize,
    /// Size up to which consecutive writes share one segment.
    pub segment_size: usize,
    /// Inbound bytes the node may hold unacknowledged.
    pub receive_window: usize,
    /// Largest single socket read.
    pub read_chunk: usize,
    /// Interval of the idle poll notification.
    pub poll_interval: Duration,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            send_buffer: 8192,
            queue_limit: 16,
            segment_size: 1460,
            receive_window: 4096,
            read_chunk: 512,
            poll_interval: Duration::from_millis(500),
        }
    }
}

// ─── Connection ───────────────────────────────────────────────────────────────

/// One accepted client connection.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
    /// Bytes queued by the node and not yet written to the socket.
    outbound: Vec<u8>,
    /// Lengths of the segments still (partly) in `outbound`, oldest first.
    segments: VecDeque<usize>,
    /// The front segment has been partly written to the socket.
    front_flushed: bool,
    send_buffer: usize,
    queue_limit: usize,
    segment_size: usize,
    /// Bytes read and not yet acknowledged by the node.
    unacknowledged: usize,
    receive_window: usize,
    read_closed: bool,
}

impl TcpConnection {
    /// Wraps an accepted stream.
    pub fn new(stream: TcpStream, peer: SocketAddr, config: &TcpTransportConfig) -> Self {
        Self {
            stream,
            peer,
            outbound: Vec::with_capacity(config.send_buffer),
            segments: VecDeque::with_capacity(config.queue_limit),
            front_flushed: false,
            send_buffer: config.send_buffer,
            queue_limit: config.queue_limit,
            segment_size: config.segment_size.max(1),
            unacknowledged: 0,
            receive_window: config.receive_window,
            read_closed: false,
        }
    }

    /// Bytes waiting to be written to the socket.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Remaining receive window.
    pub fn receive_capacity(&self) -> usize {
        self.receive_window.saturating_sub(self.unacknowledged)
    }

    /// Socket readiness worth waiting for, if any.
    pub fn interest(&self) -> Option<Interest> {
        let read = !self.read_closed && self.receive_capacity() > 0;
        let write = !self.outbound.is_empty();
        match (read, write) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }

    /// Waits until the socket is ready for `interest`.
    pub async fn ready(&self, interest: Interest) -> io::Result<tokio::io::Ready> {
        self.stream.ready(interest).await
    }

    /// Reads without blocking, bounded by the receive window.
    ///
    /// `Ok(0)` means the peer closed its side. Afterwards the connection no
    /// longer asks for read readiness.
    pub fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = buf.len().min(self.receive_capacity());
        if limit == 0 || self.read_closed {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        match self.stream.try_read(&mut buf[..limit]) {
            Ok(0) => {
                self.read_closed = true;
                Ok(0)
            }
            Ok(n) => {
                self.unacknowledged += n;
                trace!(peer = %self.peer, len = n, "Read");
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(e),
            Err(e) => {
                self.read_closed = true;
                Err(e)
            }
        }
    }

    /// Writes buffered output until the socket would block.
    ///
    /// Returns the number of bytes written, which counts as acknowledged.
    pub fn flush(&mut self) -> io::Result<usize> {
        let mut written = 0;
        while written < self.outbound.len() {
            match self.stream.try_write(&self.outbound[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        if written > 0 {
            self.outbound.drain(..written);
            self.retire_segments(written);
            trace!(peer = %self.peer, len = written, "Flushed");
        }
        Ok(written)
    }

    fn retire_segments(&mut self, mut written: usize) {
        while let Some(front) = self.segments.front_mut() {
            if *front > written {
                *front -= written;
                self.front_flushed |= written > 0;
                return;
            }
            written -= *front;
            self.segments.pop_front();
            self.front_flushed = false;
        }
    }

    /// Whether the next write may be merged into the last segment.
    fn tail_accepts(&self, len: usize) -> bool {
        let Some(&tail) = self.segments.back() else {
            return false;
        };
        let tail_in_flight = self.segments.len() == 1 && self.front_flushed;
        !tail_in_flight && tail + len <= self.segment_size
    }
}

impl Transport for TcpConnection {
    fn write(&mut self, data: &[u8]) -> TransportResult<()> {
        if data.len() > self.send_capacity() {
            return Err(TransportError::InsufficientResources);
        }
        if self.tail_accepts(data.len()) {
            if let Some(tail) = self.segments.back_mut() {
                *tail += data.len();
            }
        } else if self.segments.len() >= self.queue_limit {
            return Err(TransportError::InsufficientResources);
        } else {
            self.segments.push_back(data.len());
        }
        self.outbound.extend_from_slice(data);
        Ok(())
    }

    fn send_capacity(&self) -> usize {
        self.send_buffer.saturating_sub(self.outbound.len())
    }

    fn queued_segments(&self) -> usize {
        self.segments.len()
    }

    fn queue_limit(&self) -> usize {
        self.queue_limit
    }

    fn acknowledge_received(&mut self, len: usize) {
        self.unacknowledged = self.unacknowledged.saturating_sub(len);
    }

    fn close(self) {
        let Self {
            mut stream,
            peer,
            outbound,
            ..
        } = self;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(%peer, "No runtime to finish close, dropping socket");
            return;
        };
        handle.spawn(async move {
            if !outbound.is_empty()
                && let Err(e) = stream.write_all(&outbound).await
            {
                debug!(%peer, error = %e, "Failed to deliver final output");
                return;
            }
            if let Err(e) = stream.shutdown().await {
                trace!(%peer, error = %e, "Shutdown failed");
            }
        });
    }

    fn abort(self) {
        debug!(peer = %self.peer, pending = self.outbound.len(), "Aborting connection");
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}
