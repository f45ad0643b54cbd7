use thiserror::Error;
use tracing::debug;

use crate::{
    client::{validate_sampling_rate, StatsdClient},
    error::StatsdError,
    recorder::StatsdRecorder,
    sampler::Sampler,
    session::{ExcludeFilter, SessionReporter},
    transport::RemoteAddr,
};

/// Errors that could occur while building a StatsD client, session reporter or recorder.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// The sampling percentage or rate is out of range.
    #[error("invalid sampling configuration: {reason}")]
    InvalidSampling {
        /// Details about the rejected value.
        reason: String,
    },

    /// The exclude patterns could not be compiled.
    #[error("invalid exclude patterns: {reason}")]
    InvalidExcludeFilter {
        /// Details about the compilation failure.
        reason: String,
    },

    /// Failed to resolve the remote address, or to open the client.
    #[error(transparent)]
    Open(#[from] StatsdError),

    /// Failed to install the recorder due to an existing global recorder already being installed.
    #[error("failed to install exporter as global recorder")]
    FailedToInstall,
}

/// Builder for a StatsD client.
///
/// The same configuration can produce a bare [`StatsdClient`], a [`SessionReporter`], or a [`StatsdRecorder`] for use
/// with the [`metrics`] facade.
pub struct StatsdBuilder {
    remote_addr: RemoteAddr,
    prefix: Option<String>,
    suffix: Option<String>,
    sampling_rate: f32,
    enabled: bool,
    exclude_patterns: Vec<String>,
}

impl StatsdBuilder {
    /// Set the remote address to send metrics to.
    ///
    /// The address is in the format of `[<scheme>://]<host>[:<port>]`. The scheme can be either `udp` or `tcp`, for
    /// datagram or stream transport, respectively, and defaults to `udp`. The port defaults to 8125. IPv6 hosts must be
    /// enclosed in brackets.
    ///
    /// The host is only resolved when the client is built.
    ///
    /// Defaults to sending to `127.0.0.1:8125` over UDP.
    ///
    /// # Errors
    ///
    /// If the given address is not able to be parsed as a valid address, an error will be returned indicating the
    /// reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        self.remote_addr = RemoteAddr::try_from(addr.as_ref())
            .map_err(|reason| BuildError::InvalidRemoteAddress { reason })?;
        Ok(self)
    }

    /// Set the prefix added, with a `.` delimiter, to every metric name.
    ///
    /// An empty prefix is the same as no prefix.
    ///
    /// Defaults to no prefix.
    #[must_use]
    pub fn with_prefix<P: Into<String>>(mut self, prefix: P) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the suffix added, with a `.` delimiter, to every metric name.
    ///
    /// An empty suffix is the same as no suffix.
    ///
    /// Defaults to no suffix.
    #[must_use]
    pub fn with_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Set the percentage of events to report.
    ///
    /// Defaults to 100.
    ///
    /// # Errors
    ///
    /// If `percentage` is not greater than 0 and at most 100, an error is returned.
    pub fn with_sampling_percentage(self, percentage: f32) -> Result<Self, BuildError> {
        if !(percentage > 0.0 && percentage <= 100.0) {
            return Err(BuildError::InvalidSampling {
                reason: format!("sampling percentage must be greater than 0 and at most 100 (got {percentage})"),
            });
        }

        self.with_sampling_rate(percentage / 100.0)
    }

    /// Set the fraction of events to report.
    ///
    /// Defaults to 1.0.
    ///
    /// # Errors
    ///
    /// If `rate` is not greater than 0.0 and at most 1.0, an error is returned.
    pub fn with_sampling_rate(mut self, rate: f32) -> Result<Self, BuildError> {
        validate_sampling_rate(rate).map_err(|e| BuildError::InvalidSampling { reason: e.to_string() })?;
        self.sampling_rate = rate;
        Ok(self)
    }

    /// Sets whether or not reporting is enabled.
    ///
    /// When disabled, no socket is opened: [`build`][Self::build] and [`build_reporter`][Self::build_reporter] return
    /// `None`, and [`build_recorder`][Self::build_recorder] returns a recorder that discards every metric.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the patterns of commands that a session reporter should not report.
    ///
    /// A command is excluded when its name contains any of the patterns, ignoring ASCII case.
    ///
    /// Defaults to no patterns.
    #[must_use]
    pub fn with_exclude_patterns<P, I>(mut self, patterns: P) -> Self
    where
        P: IntoIterator<Item = I>,
        I: Into<String>,
    {
        self.exclude_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Builds the client.
    ///
    /// The remote address is resolved, and the client's socket is opened.
    ///
    /// # Errors
    ///
    /// If the remote address cannot be resolved, or the socket cannot be opened, an error is returned.
    pub fn build(self) -> Result<Option<StatsdClient>, BuildError> {
        if !self.enabled {
            debug!("StatsD reporting disabled.");
            return Ok(None);
        }

        let remote_addr = self.remote_addr.resolve()?;
        let client = StatsdClient::open(
            remote_addr,
            self.remote_addr.mode(),
            self.sampling_rate,
            self.prefix.as_deref(),
            self.suffix.as_deref(),
        )?;

        debug!(
            remote_addr = %self.remote_addr,
            resolved = %remote_addr,
            sampling_rate = self.sampling_rate,
            "Opened StatsD client."
        );

        Ok(Some(client))
    }

    /// Builds a session reporter.
    ///
    /// The reporter samples at the configured rate and skips commands matching the exclude patterns.
    ///
    /// # Errors
    ///
    /// If the exclude patterns cannot be compiled, or the client cannot be built, an error is returned.
    pub fn build_reporter(self) -> Result<Option<SessionReporter>, BuildError> {
        let exclude = if self.exclude_patterns.is_empty() {
            None
        } else {
            let filter = ExcludeFilter::from_patterns(&self.exclude_patterns)
                .map_err(|reason| BuildError::InvalidExcludeFilter { reason })?;
            Some(filter)
        };

        let sampling_rate = self.sampling_rate;
        let Some(client) = self.build()? else {
            return Ok(None);
        };

        let sampler = Sampler::new(sampling_rate)?;
        Ok(Some(SessionReporter::new(client, sampler, exclude)))
    }

    /// Builds the recorder.
    ///
    /// The recorder must be manually installed by the caller.
    ///
    /// # Errors
    ///
    /// If the client cannot be built, an error is returned.
    pub fn build_recorder(self) -> Result<StatsdRecorder, BuildError> {
        Ok(self.build()?.map_or_else(StatsdRecorder::noop, StatsdRecorder::new))
    }

    /// Builds and installs the recorder.
    ///
    /// The recorder will be installed as the global recorder.
    ///
    /// # Errors
    ///
    /// If the client cannot be built, or if a global recorder is already installed, an error will be returned.
    pub fn install(self) -> Result<(), BuildError> {
        let recorder = self.build_recorder()?;

        metrics::set_global_recorder(recorder).map_err(|_| BuildError::FailedToInstall)
    }
}

impl Default for StatsdBuilder {
    fn default() -> Self {
        StatsdBuilder {
            remote_addr: RemoteAddr::default(),
            prefix: None,
            suffix: None,
            sampling_rate: 1.0,
            enabled: true,
            exclude_patterns: Vec::new(),
        }
    }
}
