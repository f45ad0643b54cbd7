use std::net::SocketAddr;

use tracing::{debug, error};

use crate::{
    buffer::PendingBuffer,
    encoder::{MetricEncoder, Namespace},
    error::StatsdError,
    transport::{
        sink::{open_sink, MetricSink},
        TransportMode,
    },
};

/// A StatsD client.
///
/// The client owns its socket and its buffer of pending metrics, and is meant to be owned by a single caller: every
/// operation runs synchronously on the caller's thread, and the only point where it may block is while writing to the
/// socket. Callers that need to share a client between threads must serialize access to it themselves.
///
/// Recording a metric never fails because of the network. Metrics are telemetry, and a StatsD server that is down or
/// unreachable must not affect the application emitting them, so send failures that happen while recording are logged
/// and the affected metrics are dropped. Explicit calls to [`flush`][Self::flush] and [`close`][Self::close] do report
/// send failures, but the client remains usable either way.
pub struct StatsdClient {
    remote_addr: SocketAddr,
    mode: TransportMode,
    encoder: MetricEncoder,
    pending: PendingBuffer,
    sink: Box<dyn MetricSink>,
}

impl StatsdClient {
    /// Opens a client that sends metrics to `remote_addr`.
    ///
    /// `sampling_rate` is the fraction, in `(0.0, 1.0]`, of events the caller is reporting; it is written into every
    /// counter and timer line. `prefix` and `suffix` are added to every metric name, with a `.` delimiter.
    ///
    /// In datagram mode, an ephemeral local UDP socket is bound. In stream mode, a TCP connection is established.
    ///
    /// # Errors
    ///
    /// If the sampling rate is out of range, or the socket cannot be opened or connected, an error is returned.
    pub fn open(
        remote_addr: SocketAddr,
        mode: TransportMode,
        sampling_rate: f32,
        prefix: Option<&str>,
        suffix: Option<&str>,
    ) -> Result<Self, StatsdError> {
        validate_sampling_rate(sampling_rate)?;

        let sink = open_sink(remote_addr, mode).map_err(|e| {
            debug!(error = %e, %remote_addr, transport = mode.transport_id(), "Failed to open StatsD socket.");
            e
        })?;

        Ok(Self::with_sink(remote_addr, mode, sampling_rate, Namespace::new(prefix, suffix), sink))
    }

    pub(crate) fn with_sink(
        remote_addr: SocketAddr,
        mode: TransportMode,
        sampling_rate: f32,
        namespace: Namespace,
        sink: Box<dyn MetricSink>,
    ) -> Self {
        StatsdClient {
            remote_addr,
            mode,
            encoder: MetricEncoder::new(namespace, sampling_rate),
            pending: PendingBuffer::new(mode),
            sink,
        }
    }

    /// Returns the address metrics are sent to.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Returns the transport mode.
    pub fn transport_mode(&self) -> TransportMode {
        self.mode
    }

    /// Returns the sampling rate.
    pub fn sampling_rate(&self) -> f32 {
        self.encoder.sampling_rate()
    }

    /// Returns the namespace applied to every metric name.
    pub fn namespace(&self) -> &Namespace {
        self.encoder.namespace()
    }

    /// Returns the number of bytes waiting to be sent.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Records a counter increment.
    ///
    /// Unless `ignore_sampling` is `true`, the line is labeled with the client's sampling rate. The label is all this
    /// controls: deciding whether to report a sampled event at all is up to the caller.
    ///
    /// # Errors
    ///
    /// If `name` is empty, an error is returned.
    pub fn record_counter(
        &mut self,
        name: &str,
        delta: i64,
        ignore_sampling: bool,
    ) -> Result<(), StatsdError> {
        let line = self.encoder.encode_counter(name, delta, ignore_sampling)?;
        write_line(&mut self.pending, &mut *self.sink, line)
    }

    /// Records a timing, in milliseconds.
    ///
    /// Timings longer than one year are truncated. Sampling is handled as for
    /// [`record_counter`][Self::record_counter].
    ///
    /// # Errors
    ///
    /// If `name` is empty, an error is returned.
    pub fn record_timer(
        &mut self,
        name: &str,
        ms: u64,
        ignore_sampling: bool,
    ) -> Result<(), StatsdError> {
        let line = self.encoder.encode_timer(name, ms, ignore_sampling)?;
        write_line(&mut self.pending, &mut *self.sink, line)
    }

    /// Records a gauge.
    ///
    /// When `adjust` is `false`, the gauge is set to `value`, clamped to zero if negative. When `adjust` is `true`,
    /// `value` is added to the current gauge value. Gauges are never sampled.
    ///
    /// # Errors
    ///
    /// If `name` is empty, an error is returned.
    pub fn record_gauge(&mut self, name: &str, value: i64, adjust: bool) -> Result<(), StatsdError> {
        let line = self.encoder.encode_gauge(name, value, adjust)?;
        write_line(&mut self.pending, &mut *self.sink, line)
    }

    /// Sends any pending metrics immediately.
    ///
    /// Does nothing if no metrics are pending.
    ///
    /// # Errors
    ///
    /// If the pending metrics could not be sent, an error is returned. They are discarded regardless.
    pub fn flush(&mut self) -> Result<(), StatsdError> {
        self.pending.flush(&mut *self.sink)
    }

    /// Flushes any pending metrics and closes the socket.
    ///
    /// # Errors
    ///
    /// If the pending metrics could not be sent, an error is returned. The socket is closed regardless.
    pub fn close(mut self) -> Result<(), StatsdError> {
        self.flush()
    }

    /// Replaces the client's sink.
    ///
    /// The previous sink is closed. Nothing pending is flushed to it first, so pending metrics will go to the new sink.
    pub fn override_sink<S: MetricSink + 'static>(&mut self, sink: S) {
        self.sink = Box::new(sink);
    }
}

impl Drop for StatsdClient {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!(error = %e, "Failed to flush pending metrics on drop.");
        }
    }
}

fn write_line(
    pending: &mut PendingBuffer,
    sink: &mut dyn MetricSink,
    line: &str,
) -> Result<(), StatsdError> {
    match pending.append(line, false, sink) {
        Err(e) if e.is_transmission() => {
            // Already logged by the buffer. Dropped metrics must not be allowed to fail the caller.
            Ok(())
        }
        result => result,
    }
}

pub(crate) fn validate_sampling_rate(sampling_rate: f32) -> Result<(), StatsdError> {
    if sampling_rate > 0.0 && sampling_rate <= 1.0 {
        Ok(())
    } else {
        Err(StatsdError::invalid_argument(format!(
            "sampling rate must be greater than 0.0 and at most 1.0 (got {sampling_rate})"
        )))
    }
}
