//! Per-connection state: transport handle, lifecycle state, and output path.

use tracing::{Span, debug, info, info_span};

use crate::output::{OutputWriter, WriterConfig};
use crate::sink::{CharBuffer, CharSink, Push};
use crate::transport::Transport;

/// Lifecycle of the single client slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No client.
    #[default]
    Idle,
    /// A client is connected and may send commands.
    Accepted,
    /// Close requested; draining pending output before release.
    Closing,
}

/// The one connection slot a node owns for its whole lifetime.
///
/// Buffers are reused across sessions; nothing is allocated per accept.
#[derive(Debug)]
pub(crate) struct Connection<T> {
    transport: Option<T>,
    state: ConnectionState,
    writer: OutputWriter,
    output: CharBuffer,
    /// Printable output was emitted since the last newline.
    line_open: bool,
    commands: u64,
    /// `session` span of the current client.
    span: Span,
}

impl<T: Transport> Connection<T> {
    pub(crate) fn new(writer: WriterConfig) -> Self {
        Self {
            transport: None,
            state: ConnectionState::Idle,
            writer: OutputWriter::new(writer),
            output: CharBuffer::new(),
            line_open: false,
            commands: 0,
            span: Span::none(),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    pub(crate) fn transport_mut(&mut self) -> Option<&mut T> {
        self.transport.as_mut()
    }

    /// Span covering the current session; disabled while idle.
    pub(crate) fn span(&self) -> Span {
        self.span.clone()
    }

    pub(crate) fn writer(&self) -> &OutputWriter {
        &self.writer
    }

    /// Installs a freshly accepted handle and resets all buffers.
    pub(crate) fn install(&mut self, transport: T) {
        self.writer.reset();
        self.output.clear();
        self.line_open = false;
        self.commands = 0;
        self.span = info_span!("session", peer = ?transport.peer_addr());
        self.transport = Some(transport);
        self.state = ConnectionState::Accepted;
    }

    pub(crate) fn count_command(&mut self) {
        self.commands += 1;
    }

    /// Writes `data` through the output writer. A no-op without a client.
    pub(crate) fn write(&mut self, data: &[u8]) {
        if let Some(transport) = self.transport.as_mut() {
            self.writer.write(transport, data);
        }
    }

    /// Writes a block terminator, which is never dropped under backpressure.
    pub(crate) fn write_terminator(&mut self, data: &[u8]) {
        if let Some(transport) = self.transport.as_mut() {
            self.writer.write_terminator(transport, data);
        }
    }

    /// Sends whatever sits in the char buffer.
    pub(crate) fn flush_output(&mut self) {
        if self.output.is_empty() {
            return;
        }
        if let Some(transport) = self.transport.as_mut() {
            self.writer.write(transport, self.output.as_bytes());
        }
        self.output.clear();
    }

    /// Terminates a plugin's last line if it did not end with a newline.
    pub(crate) fn finish_line(&mut self) {
        if self.line_open {
            self.put_char(b'\n');
        }
    }

    /// Acknowledges `len` received bytes, or defers the acknowledgement until
    /// pending output produced for them has been handed to the transport.
    pub(crate) fn acknowledge_received(&mut self, len: usize) {
        if self.writer.attach_credit(len) {
            return;
        }
        if let Some(transport) = self.transport.as_mut() {
            transport.acknowledge_received(len);
        }
    }

    /// Acknowledgement / poll handling: resume pending output, or finish a
    /// requested close once nothing is left.
    pub(crate) fn resume(&mut self) {
        if self.writer.has_pending() {
            if let Some(transport) = self.transport.as_mut() {
                self.writer.send_pending(transport);
            }
        } else if self.state == ConnectionState::Closing {
            self.release();
        }
    }

    /// Graceful close: defer while output is pending, otherwise release now.
    pub(crate) fn close(&mut self) {
        if self.transport.is_none() {
            self.state = ConnectionState::Idle;
            return;
        }
        self.flush_output();
        if self.writer.has_pending() {
            debug!(
                pending = self.writer.pending_bytes(),
                "Close deferred until pending output drains"
            );
            self.state = ConnectionState::Closing;
        } else {
            self.release();
        }
    }

    /// Drops pending output and aborts the transport.
    pub(crate) fn abort(&mut self) {
        self.writer.reset();
        self.output.clear();
        if let Some(transport) = self.transport.take() {
            transport.abort();
            info!(commands = self.commands, "Munin session aborted");
        }
        self.state = ConnectionState::Idle;
        self.span = Span::none();
    }

    /// Forgets a handle the transport already invalidated. The handle is
    /// dropped without calling `close` or `abort` on it.
    pub(crate) fn abandon(&mut self) {
        self.writer.reset();
        self.output.clear();
        drop(self.transport.take());
        self.state = ConnectionState::Idle;
        self.span = Span::none();
    }

    fn release(&mut self) {
        self.output.clear();
        if let Some(transport) = self.transport.take() {
            let peer = transport.peer_addr();
            transport.close();
            info!(
                peer = ?peer,
                commands = self.commands,
                dropped_bytes = self.writer.dropped_bytes(),
                "Munin session closed"
            );
        }
        self.state = ConnectionState::Idle;
        self.span = Span::none();
    }
}

impl<T: Transport> CharSink for Connection<T> {
    fn put_char(&mut self, c: u8) {
        match self.output.push(c) {
            Push::Buffered => {}
            Push::Full => self.flush_output(),
            Push::Newline => {
                self.flush_output();
                self.write(b"\n");
            }
        }
        if c == b'\n' {
            self.line_open = false;
        } else if crate::sink::is_printable(c) {
            self.line_open = true;
        }
    }
}
