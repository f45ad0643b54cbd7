use std::fmt::Write as _;

use tracing::trace;

use crate::{error::StatsdError, sanitize::sanitize_name};

/// Longest timing that will be reported, in milliseconds: one year.
pub const MAX_TIMER_MS: u64 = 31_536_000_000;

const NAMESPACE_DELIMITER: char = '.';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MetricType {
    Counter,
    Timer,
    Gauge,
}

impl MetricType {
    fn as_str(self) -> &'static str {
        match self {
            MetricType::Counter => "|c",
            MetricType::Timer => "|ms",
            MetricType::Gauge => "|g",
        }
    }
}

/// Prefix and suffix applied to every metric name.
///
/// The namespace delimiter is added once, when the namespace is created: a prefix of `app` becomes `app.`, and a
/// suffix of `prod` becomes `.prod`. Empty strings are treated the same as no prefix/suffix at all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Namespace {
    prefix: String,
    suffix: String,
}

impl Namespace {
    /// Creates a `Namespace` from a raw prefix and suffix.
    pub fn new(prefix: Option<&str>, suffix: Option<&str>) -> Self {
        let prefix = match prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}{NAMESPACE_DELIMITER}"),
            _ => String::new(),
        };
        let suffix = match suffix {
            Some(suffix) if !suffix.is_empty() => format!("{NAMESPACE_DELIMITER}{suffix}"),
            _ => String::new(),
        };

        Namespace { prefix, suffix }
    }

    /// Returns the prefix, including its trailing delimiter.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the suffix, including its leading delimiter.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

/// Renders counters, timers and gauges into StatsD lines.
///
/// Each encode call produces exactly one line, without a trailing newline: framing is left to the transport buffer.
/// The returned line borrows the encoder's internal buffer, which is reused across calls.
pub(crate) struct MetricEncoder {
    namespace: Namespace,
    sampling_rate: f32,
    line_buf: String,
}

impl MetricEncoder {
    /// Creates a new `MetricEncoder`.
    ///
    /// The sampling rate is only used as the label written into counter and timer lines; callers are responsible for
    /// validating it.
    pub fn new(namespace: Namespace, sampling_rate: f32) -> Self {
        MetricEncoder { namespace, sampling_rate, line_buf: String::new() }
    }

    pub fn sampling_rate(&self) -> f32 {
        self.sampling_rate
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Encodes a counter increment.
    pub fn encode_counter(
        &mut self,
        name: &str,
        delta: i64,
        ignore_sampling: bool,
    ) -> Result<&str, StatsdError> {
        let sampling_rate = self.effective_sampling_rate(ignore_sampling);
        let mut int_writer = itoa::Buffer::new();
        self.write_line(name, "", int_writer.format(delta), MetricType::Counter, sampling_rate)
    }

    /// Encodes a timing, in milliseconds.
    ///
    /// Timings longer than [`MAX_TIMER_MS`] are truncated to it.
    pub fn encode_timer(
        &mut self,
        name: &str,
        ms: u64,
        ignore_sampling: bool,
    ) -> Result<&str, StatsdError> {
        let ms = if ms > MAX_TIMER_MS {
            trace!(ms, max_ms = MAX_TIMER_MS, "Truncating timer value to maximum.");
            MAX_TIMER_MS
        } else {
            ms
        };

        let sampling_rate = self.effective_sampling_rate(ignore_sampling);
        let mut int_writer = itoa::Buffer::new();
        self.write_line(name, "", int_writer.format(ms), MetricType::Timer, sampling_rate)
    }

    /// Encodes a gauge.
    ///
    /// When `adjust` is `false`, the gauge is set to `value`, and negative values are clamped to zero. When `adjust` is
    /// `true`, `value` is a delta applied to the current gauge value: positive deltas are written with an explicit `+`,
    /// negative deltas carry their `-`, and a zero delta is written as a bare `0`.
    ///
    /// Gauges are never sampled, so they never carry a sampling rate.
    pub fn encode_gauge(&mut self, name: &str, value: i64, adjust: bool) -> Result<&str, StatsdError> {
        let (sign, value) = if adjust {
            (if value > 0 { "+" } else { "" }, value)
        } else {
            ("", value.max(0))
        };

        let mut int_writer = itoa::Buffer::new();
        self.write_line(name, sign, int_writer.format(value), MetricType::Gauge, 1.0)
    }

    fn effective_sampling_rate(&self, ignore_sampling: bool) -> f32 {
        if ignore_sampling {
            1.0
        } else {
            self.sampling_rate
        }
    }

    fn write_line(
        &mut self,
        name: &str,
        sign: &str,
        value: &str,
        metric_type: MetricType,
        sampling_rate: f32,
    ) -> Result<&str, StatsdError> {
        if name.is_empty() {
            return Err(StatsdError::invalid_argument("metric name cannot be empty"));
        }

        self.line_buf.clear();
        self.line_buf.push_str(&self.namespace.prefix);
        self.line_buf.push_str(&sanitize_name(name));
        self.line_buf.push_str(&self.namespace.suffix);
        self.line_buf.push(':');
        self.line_buf.push_str(sign);
        self.line_buf.push_str(value);
        self.line_buf.push_str(metric_type.as_str());

        // The implied default is 1.0, so only lower rates are written out.
        if sampling_rate < 1.0 {
            // Writing into a `String` cannot fail.
            let _ = write!(self.line_buf, "|@{sampling_rate:.2}");
        }

        Ok(&self.line_buf)
    }
}
