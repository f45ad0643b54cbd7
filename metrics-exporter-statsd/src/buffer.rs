use tracing::{debug, trace};

use crate::{
    error::StatsdError,
    transport::{
        sink::{send_with_retry, MetricSink},
        TransportMode,
    },
};

/// Maximum size of a datagram payload, in bytes.
///
/// This follows the multi-metric packet convention used across StatsD implementations, which keeps packets small
/// enough to never be fragmented.
pub const MAX_PACKET_LEN: usize = 512;

/// Encoded metrics waiting to be sent.
///
/// In datagram mode, lines are joined with newlines into a single packet, which is flushed whenever the next line would
/// push it past the maximum packet length. A line that is longer than the maximum by itself is still sent, alone, as a
/// best effort.
///
/// In stream mode, there is nothing to gain from batching once a connection exists, so every line is terminated with a
/// newline and flushed as soon as it is appended.
///
/// Flushing always empties the buffer, whether or not the write succeeded: a server that keeps failing would otherwise
/// make the buffer grow without bound.
pub(crate) struct PendingBuffer {
    mode: TransportMode,
    max_packet_len: usize,
    buf: Vec<u8>,
}

impl PendingBuffer {
    /// Creates a new `PendingBuffer` for the given transport mode.
    pub fn new(mode: TransportMode) -> Self {
        Self::with_max_packet_len(mode, MAX_PACKET_LEN)
    }

    fn with_max_packet_len(mode: TransportMode, max_packet_len: usize) -> Self {
        PendingBuffer { mode, max_packet_len, buf: Vec::new() }
    }

    /// Returns the number of pending bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends an encoded line, flushing to `sink` as the transport mode requires.
    ///
    /// When `send_now` is `true`, the buffer is flushed after appending regardless of the transport mode.
    ///
    /// # Errors
    ///
    /// If `line` is empty, an error is returned and nothing is appended.
    ///
    /// If a flush fails, the error is returned. When the failed flush was the one making room for `line` in datagram
    /// mode, `line` has still been buffered.
    pub fn append<S: MetricSink + ?Sized>(
        &mut self,
        line: &str,
        send_now: bool,
        sink: &mut S,
    ) -> Result<(), StatsdError> {
        if line.is_empty() {
            return Err(StatsdError::invalid_argument("metric line cannot be empty"));
        }

        match self.mode {
            TransportMode::Datagram => {
                let mut result = Ok(());

                // Would this line put us over the maximum packet length? If so, send what we have first.
                if !self.buf.is_empty() && self.buf.len() + line.len() + 1 > self.max_packet_len {
                    trace!(
                        pending_len = self.buf.len(),
                        line_len = line.len(),
                        "Packet full, flushing before appending."
                    );
                    result = self.flush(sink);
                }

                if !self.buf.is_empty() {
                    self.buf.push(b'\n');
                }
                self.buf.extend_from_slice(line.as_bytes());

                if send_now {
                    result = result.and(self.flush(sink));
                }

                result
            }
            TransportMode::Stream => {
                // A byte stream has no message boundaries of its own, so every line must be terminated.
                self.buf.extend_from_slice(line.as_bytes());
                self.buf.push(b'\n');

                self.flush(sink)
            }
        }
    }

    /// Writes all pending bytes to `sink`.
    ///
    /// Does nothing if there are no pending bytes. Interrupted writes are retried; the pending bytes are discarded once
    /// the write has either succeeded or failed for any other reason.
    ///
    /// # Errors
    ///
    /// If the write fails, an error is returned.
    pub fn flush<S: MetricSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), StatsdError> {
        if self.is_empty() {
            return Ok(());
        }

        let pending_len = self.buf.len();
        let result = send_with_retry(sink, &self.buf);
        self.buf.clear();

        match result {
            Ok(sent) => {
                trace!(sent, pending_len, "Sent metrics data.");
                Ok(())
            }
            Err(source) => {
                debug!(error = %source, pending_len, "Failed to send metrics data.");
                Err(StatsdError::Transmission { bytes: pending_len, source })
            }
        }
    }
}
