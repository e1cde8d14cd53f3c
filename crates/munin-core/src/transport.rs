//! Transport capability interface.
//!
//! The core never touches sockets. Whatever carries the bytes (a tokio TCP
//! stream, an embedded TCP stack, a test double) implements [`Transport`] and
//! feeds notifications into [`MuninNode`](crate::MuninNode).
//!
//! # Handle lifecycle
//!
//! The node owns the handle as `Option<T>` for the duration of one session.
//! Releasing it (`close`/`abort`) consumes the handle, so a released
//! connection cannot be touched again.

use std::net::SocketAddr;

use crate::error::TransportResult;

/// The capability set the protocol core consumes from its transport.
pub trait Transport {
    /// Queues `data` for sending, copying it.
    ///
    /// The call is all-or-nothing and never blocks: either every byte is
    /// queued, or nothing is and [`TransportError::InsufficientResources`]
    /// (or another error) is returned.
    ///
    /// [`TransportError::InsufficientResources`]: crate::TransportError::InsufficientResources
    fn write(&mut self, data: &[u8]) -> TransportResult<()>;

    /// Free space in the send window, in bytes.
    fn send_capacity(&self) -> usize;

    /// Number of writes queued but not yet acknowledged by the peer.
    fn queued_segments(&self) -> usize;

    /// Ceiling for [`queued_segments`](Self::queued_segments).
    fn queue_limit(&self) -> usize;

    /// Tells the transport that `len` received bytes have been consumed so
    /// the receive window can grow again.
    fn acknowledge_received(&mut self, len: usize);

    /// Graceful release. Already-queued bytes may still be delivered.
    fn close(self)
    where
        Self: Sized;

    /// Immediate release. Queued bytes are discarded.
    fn abort(self)
    where
        Self: Sized;

    /// Remote address, used for log context only.
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}
