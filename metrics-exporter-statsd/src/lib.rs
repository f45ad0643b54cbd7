//! A client for sending counters, timers and gauges to a [StatsD][statsd] server, usable directly or as a
//! [`metrics`]-compatible recorder.
//!
//! [statsd]: https://github.com/statsd/statsd/blob/master/docs/metric_types.md
//!
//! # Usage
//!
//! Everything starts with a builder:
//!
//! ```no_run
//! # use metrics_exporter_statsd::StatsdBuilder;
//! // The builder configures where metrics are sent, how metric names are namespaced, and how events are sampled.
//! let builder = StatsdBuilder::default()
//!     .with_remote_address("udp://127.0.0.1:8125")
//!     .expect("address should be valid")
//!     .with_prefix("ftpd")
//!     .with_sampling_percentage(50.0)
//!     .expect("percentage should be valid");
//!
//! // A client can be used directly. Building returns `None` if reporting has been disabled.
//! if let Some(mut client) = builder.build().expect("failed to open client") {
//!     client.record_counter("logins", 1, false).expect("name should be valid");
//!     client.record_timer("login", 12, false).expect("name should be valid");
//!     client.record_gauge("connection", 1, true).expect("name should be valid");
//!     client.close().expect("failed to send metrics");
//! }
//!
//! // Alternatively, the client can be installed as the global recorder for all `metrics` calls.
//! # let builder = StatsdBuilder::default();
//! builder.install().expect("failed to install recorder");
//! ```
//!
//! # Features
//!
//! ## Transports
//!
//! Metrics can be sent over UDP or TCP. Over UDP, metrics are batched into newline-separated packets of at most
//! [`MAX_PACKET_LEN`] bytes, and a packet is only sent once the next metric would not fit in it, or when the client is
//! flushed. Over TCP, every metric is newline-terminated and written as soon as it is recorded.
//!
//! ## Sampling
//!
//! The client labels counters and timers with its sampling rate, so that the server can scale them back up. Deciding
//! which events to report is left to the caller, with help from a [`Sampler`].
//!
//! ## Session reporting
//!
//! A [`SessionReporter`] turns the lifecycle events of a file transfer session (commands, timeouts, TLS handshakes,
//! and so on) into metrics, with sampling and command exclusion applied.
//!
//! ## Failure handling
//!
//! Recording a metric only fails if the metric is invalid. Network failures are logged and the affected metrics are
//! dropped, so that an unavailable StatsD server never affects the application emitting metrics.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod buffer;
pub use self::buffer::MAX_PACKET_LEN;

mod builder;
pub use self::builder::{BuildError, StatsdBuilder};

mod client;
pub use self::client::StatsdClient;

mod encoder;
pub use self::encoder::{Namespace, MAX_TIMER_MS};

mod error;
pub use self::error::StatsdError;

mod recorder;
pub use self::recorder::StatsdRecorder;

mod sampler;
pub use self::sampler::Sampler;

mod sanitize;
pub use self::sanitize::sanitize_name;

mod session;
pub use self::session::{
    CommandCompleted, ExcludeFilter, HandshakeChannel, SessionEvent, SessionReporter, TimeoutKind,
};

#[cfg(test)]
mod test_util;

mod transport;
pub use self::transport::{
    sink::{MetricSink, TcpMetricSink, UdpMetricSink},
    RemoteAddr, TransportMode, DEFAULT_PORT,
};
