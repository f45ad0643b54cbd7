//! Reporting of session events.
//!
//! A [`SessionReporter`] turns the events of a client session (a connection to a file transfer server, for example)
//! into counters, timers and gauges. The host decides which events to deliver: the reporter never probes for
//! optional subsystems, it simply reports on whatever it is given.

use aho_corasick::AhoCorasick;
use rand::{rngs::SmallRng, Rng};
use tracing::{debug, trace};

use crate::{client::StatsdClient, error::StatsdError, sampler::Sampler};

/// Name of the gauge tracking open connections.
const CONNECTION_METRIC: &str = "connection";

/// Response code always used for `QUIT`, which the server answers after the command completes.
const QUIT_RESPONSE_CODE: &str = "221";

/// `AUTH` arguments that start a TLS handshake.
const TLS_AUTH_MODES: [&str; 4] = ["TLS", "TLS-C", "TLS-P", "SSL"];

/// Kinds of session timeouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutKind {
    /// The session was idle for too long.
    Idle,

    /// The client took too long to log in.
    Login,

    /// The session went too long without a data transfer.
    NoTransfer,

    /// The session lasted too long overall.
    Session,

    /// A data transfer stalled.
    Stalled,
}

impl TimeoutKind {
    fn as_str(self) -> &'static str {
        match self {
            TimeoutKind::Idle => "TimeoutIdle",
            TimeoutKind::Login => "TimeoutLogin",
            TimeoutKind::NoTransfer => "TimeoutNoTransfer",
            TimeoutKind::Session => "TimeoutSession",
            TimeoutKind::Stalled => "TimeoutStalled",
        }
    }
}

/// Channel on which a TLS handshake took place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeChannel {
    /// The control connection.
    Control,

    /// A data connection.
    Data,
}

/// A completed command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandCompleted {
    /// The command name, such as `RETR`.
    pub command: String,

    /// Arguments to the command.
    pub args: Vec<String>,

    /// The last response code sent for the command, if known.
    pub response_code: Option<String>,

    /// How long the command took, in milliseconds, if known.
    pub elapsed_ms: Option<u64>,

    /// Whether the command failed.
    pub failed: bool,

    /// The session protocol, such as `ftp`.
    pub protocol: String,

    /// The negotiated TLS cipher, if the command completed a TLS handshake.
    pub tls_cipher: Option<String>,

    /// The negotiated TLS protocol version, if the command completed a TLS handshake.
    pub tls_protocol: Option<String>,
}

impl CommandCompleted {
    /// Creates a `CommandCompleted` for a successful command with no arguments.
    pub fn new<C: Into<String>, P: Into<String>>(command: C, protocol: P) -> Self {
        CommandCompleted { command: command.into(), protocol: protocol.into(), ..Default::default() }
    }

    fn metric_name(&self) -> String {
        let response_code = if self.command.eq_ignore_ascii_case("QUIT") {
            QUIT_RESPONSE_CODE
        } else {
            self.response_code.as_deref().unwrap_or("-")
        };

        format!("command.{}.{}", self.command, response_code)
    }

    fn is_tls_auth(&self) -> bool {
        self.command.eq_ignore_ascii_case("AUTH")
            && matches!(self.args.as_slice(), [mode] if TLS_AUTH_MODES.iter().any(|m| mode.eq_ignore_ascii_case(m)))
    }
}

/// An event in the lifecycle of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session was opened.
    SessionOpened,

    /// A command completed.
    CommandCompleted(CommandCompleted),

    /// An SFTP session was opened.
    SftpSessionOpened,

    /// An SCP session was opened.
    ScpSessionOpened,

    /// The session hit a timeout.
    Timeout(TimeoutKind),

    /// A TLS handshake failed.
    TlsHandshakeFailed(HandshakeChannel),

    /// The session was closed.
    SessionClosed {
        /// The session protocol, such as `ftp`.
        protocol: String,
    },
}

/// Filters out commands that should not be reported.
///
/// Uses an [Aho-Corasick][ahocorasick] automaton to match a command name against all patterns at once. Patterns are
/// matched as substrings of the command name, ignoring ASCII case.
///
/// [ahocorasick]: https://en.wikipedia.org/wiki/Aho–Corasick_algorithm
pub struct ExcludeFilter {
    automaton: AhoCorasick,
}

impl ExcludeFilter {
    /// Creates an `ExcludeFilter` from a set of patterns.
    ///
    /// # Errors
    ///
    /// If the automaton cannot be built from the patterns, an error is returned.
    pub fn from_patterns<P, I>(patterns: P) -> Result<Self, String>
    where
        P: IntoIterator<Item = I>,
        I: AsRef<str>,
    {
        let patterns = patterns.into_iter().map(|p| p.as_ref().to_string()).collect::<Vec<_>>();
        AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&patterns)
            .map(|automaton| ExcludeFilter { automaton })
            .map_err(|e| e.to_string())
    }

    /// Returns `true` if `command` matches any pattern.
    pub fn is_excluded(&self, command: &str) -> bool {
        self.automaton.is_match(command)
    }
}

/// Reports session events to a StatsD server.
///
/// Most events are subject to sampling; timeouts and TLS handshake failures are always reported, since they are rare
/// and worth knowing about individually. Each event is flushed as soon as it has been reported.
///
/// Failures to report are logged and otherwise ignored, so that reporting can never interfere with the session itself.
/// Once the session is closed, further events are ignored.
pub struct SessionReporter<R = SmallRng> {
    client: Option<StatsdClient>,
    sampler: Sampler<R>,
    exclude: Option<ExcludeFilter>,
}

impl<R: Rng> SessionReporter<R> {
    /// Creates a new `SessionReporter`.
    ///
    /// The sampler should use the same rate as the client, so that reported counters and timers are labeled with the
    /// rate they were actually sampled at.
    pub fn new(client: StatsdClient, sampler: Sampler<R>, exclude: Option<ExcludeFilter>) -> Self {
        SessionReporter { client: Some(client), sampler, exclude }
    }

    /// Returns `true` if the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.client.is_none()
    }

    /// Reports an event.
    pub fn handle(&mut self, event: SessionEvent) {
        let Some(client) = self.client.as_mut() else {
            trace!(?event, "Session already closed, ignoring event.");
            return;
        };

        let result = match event {
            SessionEvent::SessionOpened => report_session_opened(client),
            SessionEvent::CommandCompleted(completed) => {
                if self.exclude.as_ref().is_some_and(|filter| filter.is_excluded(&completed.command)) {
                    trace!(command = %completed.command, "Command excluded from reporting.");
                    return;
                }

                if !self.sampler.should_sample() {
                    trace!(command = %completed.command, "Skipping sampled-out command.");
                    return;
                }

                report_command(client, &completed)
            }
            SessionEvent::SftpSessionOpened => report_sampled_connection(client, &mut self.sampler, "sftp"),
            SessionEvent::ScpSessionOpened => report_sampled_connection(client, &mut self.sampler, "scp"),
            SessionEvent::Timeout(kind) => {
                report_unsampled_counter(client, &format!("timeout.{}", kind.as_str()))
            }
            SessionEvent::TlsHandshakeFailed(channel) => {
                let metric = match channel {
                    HandshakeChannel::Control => "tls.handshake.ctrl.error",
                    HandshakeChannel::Data => "tls.handshake.data.error",
                };
                report_unsampled_counter(client, metric)
            }
            SessionEvent::SessionClosed { protocol } => {
                let result = report_session_closed(client, &protocol);
                let close_result = self.client.take().map_or(Ok(()), StatsdClient::close);
                result.and(close_result)
            }
        };

        if let Err(e) = result {
            debug!(error = %e, "Failed to report session event.");
        }
    }
}

fn connection_metric(protocol: &str) -> String {
    format!("{protocol}.{CONNECTION_METRIC}")
}

/// Runs `report`, then flushes whatever it buffered, even if it failed partway through.
fn report_and_flush<F>(client: &mut StatsdClient, report: F) -> Result<(), StatsdError>
where
    F: FnOnce(&mut StatsdClient) -> Result<(), StatsdError>,
{
    let result = report(client);
    let flush_result = client.flush();
    result.and(flush_result)
}

fn report_session_opened(client: &mut StatsdClient) -> Result<(), StatsdError> {
    report_and_flush(client, |client| client.record_gauge(CONNECTION_METRIC, 1, true))
}

fn report_command(client: &mut StatsdClient, completed: &CommandCompleted) -> Result<(), StatsdError> {
    report_and_flush(client, |client| record_command(client, completed))
}

fn record_command(client: &mut StatsdClient, completed: &CommandCompleted) -> Result<(), StatsdError> {
    let metric = completed.metric_name();
    client.record_counter(&metric, 1, false)?;
    if let Some(elapsed_ms) = completed.elapsed_ms {
        client.record_timer(&metric, elapsed_ms, false)?;
    }

    // Failed handshakes are reported through their own event.
    if completed.is_tls_auth() && !completed.failed {
        report_tls_handshake(client, completed)?;
    }

    // Only once the password has been accepted over plain FTP do we know the connection is neither FTPS nor SFTP.
    if completed.command.eq_ignore_ascii_case("PASS") && !completed.failed && completed.protocol == "ftp" {
        report_protocol_connection(client, "ftp")?;
    }

    Ok(())
}

fn report_tls_handshake(client: &mut StatsdClient, completed: &CommandCompleted) -> Result<(), StatsdError> {
    let handshake_metric = "tls.handshake.ctrl";
    client.record_counter(handshake_metric, 1, false)?;
    report_protocol_connection(client, "ftps")?;

    if let Some(elapsed_ms) = completed.elapsed_ms {
        client.record_timer(handshake_metric, elapsed_ms, false)?;
    }

    if let Some(cipher) = &completed.tls_cipher {
        client.record_counter(&format!("tls.cipher.{cipher}"), 1, false)?;
    }

    if let Some(protocol) = &completed.tls_protocol {
        client.record_counter(&format!("tls.protocol.{protocol}"), 1, false)?;
    }

    Ok(())
}

fn report_protocol_connection(client: &mut StatsdClient, protocol: &str) -> Result<(), StatsdError> {
    let metric = connection_metric(protocol);
    client.record_counter(&metric, 1, false)?;
    client.record_gauge(&metric, 1, true)
}

fn report_sampled_connection<R: Rng>(
    client: &mut StatsdClient,
    sampler: &mut Sampler<R>,
    protocol: &str,
) -> Result<(), StatsdError> {
    if !sampler.should_sample() {
        trace!(protocol, "Skipping sampled-out connection.");
        return Ok(());
    }

    report_and_flush(client, |client| report_protocol_connection(client, protocol))
}

fn report_unsampled_counter(client: &mut StatsdClient, metric: &str) -> Result<(), StatsdError> {
    report_and_flush(client, |client| client.record_counter(metric, 1, true))
}

fn report_session_closed(client: &mut StatsdClient, protocol: &str) -> Result<(), StatsdError> {
    client.record_gauge(CONNECTION_METRIC, -1, true)?;
    client.record_gauge(&connection_metric(protocol), -1, true)
}
