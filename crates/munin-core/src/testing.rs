//! In-memory transport double for unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{TransportError, TransportResult};
use crate::transport::Transport;

#[derive(Debug)]
pub(crate) struct MockState {
    /// Every byte accepted by `write`, in order.
    pub sent: Vec<u8>,
    /// Individual successful writes.
    pub writes: Vec<Vec<u8>>,
    /// Free send window.
    pub capacity: usize,
    /// Writes accepted but not yet acknowledged.
    pub segments: usize,
    pub queue_limit: usize,
    /// Sum of `acknowledge_received` calls.
    pub received_acked: usize,
    /// Error returned by every `write` when set.
    pub fail_with: Option<TransportError>,
    pub closed: bool,
    pub aborted: bool,
}

/// Cloning shares the state, so a test keeps observing a handle after the
/// node has consumed it.
#[derive(Debug, Clone)]
pub(crate) struct MockTransport {
    state: Rc<RefCell<MockState>>,
}

impl MockTransport {
    /// A transport that never pushes back.
    pub fn unbounded() -> Self {
        Self::with_limits(usize::MAX, usize::MAX)
    }

    pub fn with_limits(capacity: usize, queue_limit: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState {
                sent: Vec::new(),
                writes: Vec::new(),
                capacity,
                segments: 0,
                queue_limit,
                received_acked: 0,
                fail_with: None,
                closed: false,
                aborted: false,
            })),
        }
    }

    pub fn state(&self) -> std::cell::Ref<'_, MockState> {
        self.state.borrow()
    }

    pub fn sent_string(&self) -> String {
        String::from_utf8_lossy(&self.state.borrow().sent).into_owned()
    }

    /// Simulates the peer acknowledging `len` bytes and all segments.
    pub fn peer_ack(&self, len: usize) {
        let mut state = self.state.borrow_mut();
        state.capacity = state.capacity.saturating_add(len);
        state.segments = 0;
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.state.borrow_mut().capacity = capacity;
    }

    pub fn fail_with(&self, error: TransportError) {
        self.state.borrow_mut().fail_with = Some(error);
    }
}

impl Transport for MockTransport {
    fn write(&mut self, data: &[u8]) -> TransportResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(err) = state.fail_with.clone() {
            return Err(err);
        }
        if data.len() > state.capacity || state.segments >= state.queue_limit {
            return Err(TransportError::InsufficientResources);
        }
        if state.capacity != usize::MAX {
            state.capacity -= data.len();
        }
        state.segments += 1;
        state.sent.extend_from_slice(data);
        state.writes.push(data.to_vec());
        Ok(())
    }

    fn send_capacity(&self) -> usize {
        self.state.borrow().capacity
    }

    fn queued_segments(&self) -> usize {
        self.state.borrow().segments
    }

    fn queue_limit(&self) -> usize {
        self.state.borrow().queue_limit
    }

    fn acknowledge_received(&mut self, len: usize) {
        self.state.borrow_mut().received_acked += len;
    }

    fn close(self) {
        self.state.borrow_mut().closed = true;
    }

    fn abort(self) {
        self.state.borrow_mut().aborted = true;
    }
}
