use std::sync::Arc;

use metrics::{
    Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{client::StatsdClient, error::StatsdError};

/// A recorder that sends metrics to a StatsD server.
///
/// Every update is encoded and buffered as soon as it happens: there is no local aggregation. Pending metrics are sent
/// when the buffer fills up, when [`flush`][Self::flush] is called, and when the recorder and all of its handles have
/// been dropped.
///
/// Every update is sent, so counters and timers are never labeled with a sampling rate, whatever rate the client was
/// opened with. Gauge adjustments are sent in whole units: fractional deltas accumulate per gauge until they add up to
/// at least one.
///
/// Labels are not supported by the StatsD line format, and are ignored.
pub struct StatsdRecorder {
    client: Option<Arc<Mutex<StatsdClient>>>,
}

impl StatsdRecorder {
    pub(crate) fn new(client: StatsdClient) -> Self {
        StatsdRecorder { client: Some(Arc::new(Mutex::new(client))) }
    }

    /// Creates a recorder that discards every metric.
    pub fn noop() -> Self {
        StatsdRecorder { client: None }
    }

    /// Sends any pending metrics immediately.
    ///
    /// # Errors
    ///
    /// If the pending metrics could not be sent, an error is returned.
    pub fn flush(&self) -> Result<(), StatsdError> {
        match &self.client {
            Some(client) => client.lock().flush(),
            None => Ok(()),
        }
    }

    fn handle(&self, key: &Key) -> Option<Arc<MetricHandle>> {
        self.client
            .as_ref()
            .map(|client| {
                Arc::new(MetricHandle {
                    name: key.name().to_string(),
                    client: Arc::clone(client),
                    gauge_remainder: Mutex::new(0.0),
                })
            })
    }
}

impl Recorder for StatsdRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        self.handle(key).map_or_else(Counter::noop, Counter::from_arc)
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        self.handle(key).map_or_else(Gauge::noop, Gauge::from_arc)
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        self.handle(key).map_or_else(Histogram::noop, Histogram::from_arc)
    }
}

/// A registered metric, bound to the client it reports through.
struct MetricHandle {
    name: String,
    client: Arc<Mutex<StatsdClient>>,
    gauge_remainder: Mutex<f64>,
}

impl MetricHandle {
    fn report<F>(&self, f: F)
    where
        F: FnOnce(&mut StatsdClient, &str) -> Result<(), StatsdError>,
    {
        let mut client = self.client.lock();
        if let Err(e) = f(&mut client, &self.name) {
            debug!(error = %e, metric = %self.name, "Failed to record metric.");
        }
    }

    fn adjust_gauge(&self, delta: f64) {
        if !delta.is_finite() {
            debug!(delta, metric = %self.name, "Ignoring non-finite gauge adjustment.");
            return;
        }

        let whole = {
            let mut remainder = self.gauge_remainder.lock();
            *remainder += delta;
            let whole = remainder.trunc();
            *remainder -= whole;
            whole
        };

        // On the wire, an unsigned zero would set the gauge rather than adjust it.
        if whole == 0.0 {
            trace!(delta, metric = %self.name, "Accumulating fractional gauge adjustment.");
            return;
        }

        self.report(|client, name| client.record_gauge(name, whole as i64, true));
    }
}

impl CounterFn for MetricHandle {
    fn increment(&self, value: u64) {
        let delta = i64::try_from(value).unwrap_or(i64::MAX);
        self.report(|client, name| client.record_counter(name, delta, true));
    }

    fn absolute(&self, value: u64) {
        // Counters only carry deltas on the wire.
        let value = i64::try_from(value).unwrap_or(i64::MAX);
        self.report(|client, name| client.record_gauge(name, value, false));
    }
}

impl GaugeFn for MetricHandle {
    fn increment(&self, value: f64) {
        self.adjust_gauge(value);
    }

    fn decrement(&self, value: f64) {
        self.adjust_gauge(-value);
    }

    fn set(&self, value: f64) {
        *self.gauge_remainder.lock() = 0.0;
        self.report(|client, name| client.record_gauge(name, value as i64, false));
    }
}

impl HistogramFn for MetricHandle {
    fn record(&self, value: f64) {
        // Values are in seconds; negative values saturate to zero.
        let elapsed_ms = (value * 1000.0) as u64;
        self.report(|client, name| client.record_timer(name, elapsed_ms, true));
    }
}

#[cfg(test)]
mod tests {
    use metrics::{Key, Recorder as _};

    use super::StatsdRecorder;
    use crate::{
        client::StatsdClient,
        encoder::Namespace,
        test_util::{ScriptedSink, SinkHandle},
        transport::TransportMode,
    };

    static METADATA: metrics::Metadata =
        metrics::Metadata::new(module_path!(), metrics::Level::INFO, Some(module_path!()));

    fn scripted_recorder(sampling_rate: f32) -> (StatsdRecorder, SinkHandle) {
        let (sink, handle) = ScriptedSink::new();
        let client = StatsdClient::with_sink(
            "127.0.0.1:8125".parse().unwrap(),
            TransportMode::Datagram,
            sampling_rate,
            Namespace::new(Some("app"), None),
            Box::new(sink),
        );
        (StatsdRecorder::new(client), handle)
    }

    #[test]
    fn counters() {
        let (recorder, handle) = scripted_recorder(1.0);
        let counter = recorder.register_counter(&Key::from_name("requests"), &METADATA);
        counter.increment(1);
        counter.increment(u64::MAX);
        counter.absolute(42);
        recorder.flush().unwrap();

        let expected = format!("app.requests:1|c\napp.requests:{}|c\napp.requests:42|g", i64::MAX);
        assert_eq!(handle.payload_strings(), vec![expected]);
    }

    #[test]
    fn gauges() {
        let (recorder, handle) = scripted_recorder(0.5);
        let gauge = recorder.register_gauge(&Key::from_name("connections"), &METADATA);
        gauge.set(10.7);
        gauge.increment(2.0);
        gauge.decrement(3.0);
        gauge.set(-4.0);
        recorder.flush().unwrap();

        let expected = "app.connections:10|g\napp.connections:+2|g\napp.connections:-3|g\napp.connections:0|g";
        assert_eq!(handle.payload_strings(), vec![expected.to_string()]);
    }

    #[test]
    fn fractional_gauge_adjustments_accumulate() {
        let (recorder, handle) = scripted_recorder(1.0);
        let gauge = recorder.register_gauge(&Key::from_name("conns"), &METADATA);
        gauge.set(10.0);
        gauge.increment(0.5);
        gauge.increment(0.0);
        gauge.increment(0.5);
        gauge.decrement(0.25);
        gauge.decrement(1.0);
        gauge.increment(f64::NAN);
        gauge.set(3.0);
        gauge.increment(0.75);
        recorder.flush().unwrap();

        // The remainder is reset by `set`, so the last increment is still pending.
        let expected = "app.conns:10|g\napp.conns:+1|g\napp.conns:-1|g\napp.conns:3|g";
        assert_eq!(handle.payload_strings(), vec![expected.to_string()]);
        assert!(!handle.payload_strings()[0].contains(":0|g"));
    }

    #[test]
    fn sampling_rate_is_never_labeled() {
        let (recorder, handle) = scripted_recorder(0.5);
        let counter = recorder.register_counter(&Key::from_name("hits"), &METADATA);
        for _ in 0..4 {
            counter.increment(1);
        }
        recorder.flush().unwrap();

        assert_eq!(handle.payload_strings(), vec!["app.hits:1|c\napp.hits:1|c\napp.hits:1|c\napp.hits:1|c".to_string()]);
    }

    #[test]
    fn histograms_are_timers_in_milliseconds() {
        let (recorder, handle) = scripted_recorder(0.25);
        let histogram = recorder.register_histogram(&Key::from_name("latency"), &METADATA);
        histogram.record(0.25);
        histogram.record(-1.0);
        recorder.flush().unwrap();

        assert_eq!(handle.payload_strings(), vec!["app.latency:250|ms\napp.latency:0|ms".to_string()]);
    }

    #[test]
    fn labels_are_ignored() {
        let (recorder, handle) = scripted_recorder(1.0);
        let key = Key::from_parts("hits", vec![metrics::Label::new("route", "/")]);
        recorder.register_counter(&key, &METADATA).increment(3);
        recorder.flush().unwrap();

        assert_eq!(handle.payload_strings(), vec!["app.hits:3|c".to_string()]);
    }

    #[test]
    fn dropping_the_recorder_and_handles_flushes() {
        let (recorder, handle) = scripted_recorder(1.0);
        let counter = recorder.register_counter(&Key::from_name("jobs"), &METADATA);
        drop(recorder);

        counter.increment(5);
        assert!(handle.payloads().is_empty());

        drop(counter);
        assert_eq!(handle.payload_strings(), vec!["app.jobs:5|c".to_string()]);
    }

    #[test]
    fn noop_recorder_discards_everything() {
        let recorder = StatsdRecorder::noop();
        recorder.register_counter(&Key::from_name("requests"), &METADATA).increment(1);
        recorder.register_gauge(&Key::from_name("connections"), &METADATA).set(1.0);
        recorder.register_histogram(&Key::from_name("latency"), &METADATA).record(1.0);
        assert!(recorder.flush().is_ok());
    }
}
