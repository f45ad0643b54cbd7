use std::{io, net::SocketAddr};

use thiserror::Error;

/// Errors that could occur while opening a client or emitting metrics through it.
///
/// Invalid arguments are always detected before anything is encoded or buffered, so an error of that kind means that
/// nothing was applied. Transmission failures are only surfaced by explicit flushes: the pending payload is discarded
/// either way and the client stays usable.
#[derive(Debug, Error)]
pub enum StatsdError {
    /// An argument was rejected before any work was done.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Details about the rejected argument.
        reason: String,
    },

    /// The remote address could not be resolved.
    #[error("failed to resolve '{address}': {source}")]
    Resolve {
        /// The address that was being resolved.
        address: String,

        /// The underlying resolution error.
        #[source]
        source: io::Error,
    },

    /// A local socket could not be created.
    #[error("failed to open socket: {source}")]
    Socket {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A stream connection to the remote address could not be established.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// The address that was being connected to.
        address: SocketAddr,

        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Pending metrics could not be written to the socket.
    #[error("failed to send {bytes} bytes of metrics data: {source}")]
    Transmission {
        /// Number of bytes that were pending, and have been discarded.
        bytes: usize,

        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl StatsdError {
    pub(crate) fn invalid_argument<R: Into<String>>(reason: R) -> Self {
        StatsdError::InvalidArgument { reason: reason.into() }
    }

    /// Returns `true` if this error was caused by an invalid argument.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, StatsdError::InvalidArgument { .. })
    }

    /// Returns `true` if this error was caused by a failure to send pending metrics.
    pub fn is_transmission(&self) -> bool {
        matches!(self, StatsdError::Transmission { .. })
    }
}
