use std::{
    fmt,
    net::{SocketAddr, ToSocketAddrs as _},
};

use crate::error::StatsdError;

pub mod sink;

/// Default StatsD port.
pub const DEFAULT_PORT: u16 = 8125;

/// How metrics are framed and sent to the remote server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportMode {
    /// Connectionless transport (UDP).
    ///
    /// Metrics are batched, newline-separated, into packets of bounded size.
    #[default]
    Datagram,

    /// Connection-oriented transport (TCP).
    ///
    /// Every metric is newline-terminated and written as soon as it is recorded.
    Stream,
}

impl TransportMode {
    /// Returns the transport ID for this mode.
    ///
    /// This is the same acronym used as the scheme of a server address: `udp` or `tcp`.
    pub const fn transport_id(self) -> &'static str {
        match self {
            TransportMode::Datagram => "udp",
            TransportMode::Stream => "tcp",
        }
    }
}

/// An unresolved StatsD server address.
///
/// Parsed from `[scheme://]host[:port]`, where the scheme is either `udp` (the default) or `tcp`, and the port
/// defaults to 8125. IPv6 hosts must be enclosed in brackets, with or without a port: `[::1]` or `[::1]:8125`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteAddr {
    host: String,
    port: u16,
    mode: TransportMode,
}

impl RemoteAddr {
    /// Creates a `RemoteAddr` from its parts.
    pub fn new<H: Into<String>>(host: H, port: u16, mode: TransportMode) -> Self {
        RemoteAddr { host: host.into(), port, mode }
    }

    /// Returns the host, without any IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the transport mode.
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Resolves the host to a socket address.
    ///
    /// When the host resolves to multiple addresses, the first one is used.
    ///
    /// # Errors
    ///
    /// If the host cannot be resolved, or resolves to no addresses at all, an error is returned.
    pub fn resolve(&self) -> Result<SocketAddr, StatsdError> {
        let resolve_err = |source| StatsdError::Resolve { address: self.to_string(), source };

        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(resolve_err)?
            .next()
            .ok_or_else(|| {
                resolve_err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no addresses found for host",
                ))
            })
    }
}

impl Default for RemoteAddr {
    fn default() -> Self {
        RemoteAddr::new("127.0.0.1", DEFAULT_PORT, TransportMode::Datagram)
    }
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", self.mode.transport_id(), self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", self.mode.transport_id(), self.host, self.port)
        }
    }
}

impl<'a> TryFrom<&'a str> for RemoteAddr {
    type Error = String;

    fn try_from(addr: &'a str) -> Result<Self, Self::Error> {
        let (mode, server) = split_scheme(addr)?;
        if server.is_empty() {
            return Err("missing host".to_string());
        }

        let (host, port) = if let Some(bracketed) = server.strip_prefix('[') {
            // IPv6, either `[host]` or `[host]:port`.
            let (host, rest) = bracketed
                .split_once(']')
                .ok_or_else(|| format!("unterminated IPv6 address '{server}'"))?;
            let port = match rest {
                "" => DEFAULT_PORT,
                _ => match rest.strip_prefix(':') {
                    Some(port) => parse_port(port)?,
                    None => return Err(format!("unexpected characters after IPv6 address '{server}'")),
                },
            };
            (host, port)
        } else {
            match server.rsplit_once(':') {
                Some((host, _)) if host.contains(':') => {
                    return Err(format!("IPv6 address '{server}' must be enclosed in brackets"));
                }
                Some((host, port)) => (host, parse_port(port)?),
                None => (server, DEFAULT_PORT),
            }
        };

        if host.is_empty() {
            return Err("missing host".to_string());
        }

        Ok(RemoteAddr::new(host, port, mode))
    }
}

fn split_scheme(addr: &str) -> Result<(TransportMode, &str), String> {
    match addr.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("udp") => Ok((TransportMode::Datagram, rest)),
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("tcp") => Ok((TransportMode::Stream, rest)),
        Some((scheme, _)) => Err(format!("invalid scheme '{scheme}' (expected 'udp' or 'tcp')")),
        None => Ok((TransportMode::Datagram, addr)),
    }
}

fn parse_port(port: &str) -> Result<u16, String> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("invalid port '{port}'")),
        Ok(port) => Ok(port),
    }
}
