//! Backpressure-aware output writer.
//!
//! Every response byte reaches the transport through [`OutputWriter::write`].
//! Writes never block. When the transport reports
//! [`TransportError::InsufficientResources`] the writer halves the attempted
//! length and retries, then applies the configured [`BackpressurePolicy`] to
//! whatever still did not fit:
//!
//! | Policy | Unsent remainder |
//! |--------|------------------|
//! | [`Lossy`](BackpressurePolicy::Lossy) | dropped (Munin polls again anyway) |
//! | [`Requeue`](BackpressurePolicy::Requeue) | appended to the pending queue, drained on ack/poll |
//!
//! The pending queue is bounded by [`WriterConfig::pending_limit`]; bytes
//! beyond it are dropped and counted. Block terminators written with
//! [`OutputWriter::write_terminator`] are exempt under both policies, so a
//! client always sees the end of a reply it has started reading.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::transport::Transport;

/// What happens to output the transport cannot take right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressurePolicy {
    /// Halve-and-retry once per write; the unsent suffix is lost.
    Lossy,
    /// Keep retrying the exact unsent suffix; defer what does not fit.
    #[default]
    Requeue,
}

/// Output writer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    /// Backpressure policy.
    pub policy: BackpressurePolicy,
    /// Largest pending chunk. Must not exceed the transport's send buffer, or
    /// the chunk can never be written.
    pub chunk_size: usize,
    /// Upper bound for bytes held in the pending queue.
    pub pending_limit: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            policy: BackpressurePolicy::Requeue,
            chunk_size: 256,
            pending_limit: 4096,
        }
    }
}

/// A deferred piece of output.
#[derive(Debug)]
struct Chunk {
    data: Vec<u8>,
    /// Received bytes to acknowledge once this chunk reaches the transport.
    credit: usize,
}

/// Outcome of one halve-and-retry attempt.
enum Attempt {
    /// This many leading bytes were queued.
    Sent(usize),
    /// Nothing fits until the transport drains.
    Exhausted,
    /// A non-recoverable error for this attempt.
    Failed(TransportError),
}

/// Turns response text into non-blocking transport writes.
#[derive(Debug)]
pub struct OutputWriter {
    config: WriterConfig,
    pending: VecDeque<Chunk>,
    pending_bytes: usize,
    dropped_bytes: u64,
}

impl OutputWriter {
    /// Creates a writer with the given settings.
    pub fn new(config: WriterConfig) -> Self {
        Self {
            config,
            pending: VecDeque::new(),
            pending_bytes: 0,
            dropped_bytes: 0,
        }
    }

    /// Writes `data`, best effort.
    pub fn write<T: Transport>(&mut self, transport: &mut T, data: &[u8]) {
        self.send(transport, data, false);
    }

    /// Writes a block terminator. It is deferred rather than dropped, even
    /// past `pending_limit` and under the lossy policy.
    pub fn write_terminator<T: Transport>(&mut self, transport: &mut T, data: &[u8]) {
        self.send(transport, data, true);
    }

    fn send<T: Transport>(&mut self, transport: &mut T, data: &[u8], terminator: bool) {
        if data.is_empty() {
            return;
        }

        // Preserve byte order behind anything already deferred.
        if !self.pending.is_empty() {
            self.defer(data, terminator);
            return;
        }

        let lossy = self.config.policy == BackpressurePolicy::Lossy && !terminator;
        let mut rest = data;
        while !rest.is_empty() {
            match Self::attempt(transport, rest) {
                Attempt::Sent(len) => {
                    rest = &rest[len..];
                    if lossy && !rest.is_empty() {
                        self.drop_bytes(rest.len(), "partial write");
                        return;
                    }
                }
                Attempt::Exhausted => {
                    if lossy {
                        self.drop_bytes(rest.len(), "send window exhausted");
                    } else {
                        self.defer(rest, terminator);
                    }
                    return;
                }
                Attempt::Failed(error) => {
                    warn!(error = %error, len = rest.len(), "Transport write failed");
                    self.drop_bytes(rest.len(), "transport error");
                    return;
                }
            }
        }
    }

    /// Writes pending chunks while each fits in the send window.
    ///
    /// Receive credit attached to a chunk is acknowledged to the transport
    /// once that chunk is queued.
    pub fn send_pending<T: Transport>(&mut self, transport: &mut T) {
        while let Some(front) = self.pending.front() {
            if front.data.len() > transport.send_capacity() {
                break;
            }
            match transport.write(&front.data) {
                Ok(()) => {
                    if let Some(chunk) = self.pending.pop_front() {
                        self.pending_bytes -= chunk.data.len();
                        trace!(len = chunk.data.len(), "Pending chunk sent");
                        if chunk.credit > 0 {
                            transport.acknowledge_received(chunk.credit);
                        }
                    }
                }
                Err(error) if error.is_insufficient_resources() => break,
                Err(error) => {
                    warn!(error = %error, "Failed to send pending output");
                    break;
                }
            }
        }
    }

    /// Defers acknowledgement of `len` received bytes until the last pending
    /// chunk is sent. Returns `false` if nothing is pending.
    pub fn attach_credit(&mut self, len: usize) -> bool {
        match self.pending.back_mut() {
            Some(chunk) => {
                chunk.credit += len;
                true
            }
            None => false,
        }
    }

    /// Returns `true` while deferred output is waiting.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Bytes waiting in the pending queue.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Bytes dropped since the last [`reset`](Self::reset).
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    /// Discards pending output and counters.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.pending_bytes = 0;
        self.dropped_bytes = 0;
    }

    fn attempt<T: Transport>(transport: &mut T, data: &[u8]) -> Attempt {
        let mut len = data.len();
        loop {
            match transport.write(&data[..len]) {
                Ok(()) => return Attempt::Sent(len),
                Err(error) if error.is_insufficient_resources() => {
                    if transport.send_capacity() == 0
                        || transport.queued_segments() >= transport.queue_limit()
                    {
                        return Attempt::Exhausted;
                    }
                    len /= 2;
                    if len == 0 {
                        return Attempt::Exhausted;
                    }
                }
                Err(error) => return Attempt::Failed(error),
            }
        }
    }

    fn defer(&mut self, mut data: &[u8], unbounded: bool) {
        let chunk_size = self.config.chunk_size.max(1);
        while !data.is_empty() {
            let room = if unbounded {
                usize::MAX
            } else {
                self.config.pending_limit.saturating_sub(self.pending_bytes)
            };
            if room == 0 {
                self.drop_bytes(data.len(), "pending queue full");
                return;
            }

            let tail_room = match self.pending.back() {
                Some(chunk) if chunk.data.len() < chunk_size => chunk_size - chunk.data.len(),
                _ => 0,
            };

            let take = if tail_room > 0 {
                let take = data.len().min(tail_room).min(room);
                if let Some(chunk) = self.pending.back_mut() {
                    chunk.data.extend_from_slice(&data[..take]);
                }
                take
            } else {
                let take = data.len().min(chunk_size).min(room);
                self.pending.push_back(Chunk {
                    data: data[..take].to_vec(),
                    credit: 0,
                });
                take
            };

            self.pending_bytes += take;
            data = &data[take..];
        }
        trace!(pending = self.pending_bytes, "Output deferred");
    }

    fn drop_bytes(&mut self, len: usize, reason: &'static str) {
        self.dropped_bytes += len as u64;
        debug!(len, reason, "Output dropped under backpressure");
    }
}
