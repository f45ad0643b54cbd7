use std::{
    io::{self, Write as _},
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, UdpSocket},
};

use tracing::trace;

use crate::error::StatsdError;

use super::TransportMode;

/// Destination for encoded metric payloads.
///
/// A payload contains one or more complete, newline-delimited StatsD lines. Implementations write the payload in a
/// single operation and return the number of bytes written, or the I/O error that prevented the write.
///
/// Besides the UDP and TCP sinks provided here, any type implementing this trait can be swapped into a client with
/// [`StatsdClient::override_sink`][crate::StatsdClient::override_sink], which is mainly useful for verifying what a
/// client sends without a real StatsD server.
pub trait MetricSink: Send {
    /// Sends a payload.
    ///
    /// # Errors
    ///
    /// If the payload could not be written, an error is returned.
    fn send(&mut self, payload: &[u8]) -> io::Result<usize>;
}

impl<S: MetricSink + ?Sized> MetricSink for Box<S> {
    fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
        (**self).send(payload)
    }
}

/// Sends payloads as UDP datagrams to a fixed address.
///
/// The socket is left unconnected, so an unreachable server never causes errors on later sends.
pub struct UdpMetricSink {
    socket: UdpSocket,
    sink_addr: SocketAddr,
}

impl UdpMetricSink {
    /// Creates a `UdpMetricSink` from an existing socket.
    pub fn new(socket: UdpSocket, sink_addr: SocketAddr) -> Self {
        UdpMetricSink { socket, sink_addr }
    }

    /// Binds an ephemeral local socket of the same address family as `sink_addr`.
    ///
    /// # Errors
    ///
    /// If the local socket cannot be bound, an error is returned.
    pub fn bind(sink_addr: SocketAddr) -> io::Result<Self> {
        let socket = match sink_addr {
            SocketAddr::V4(_) => UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?,
            SocketAddr::V6(_) => UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))?,
        };

        Ok(UdpMetricSink::new(socket, sink_addr))
    }
}

impl MetricSink for UdpMetricSink {
    fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
        self.socket.send_to(payload, self.sink_addr)
    }
}

/// Sends payloads over a connected TCP stream.
pub struct TcpMetricSink {
    stream: TcpStream,
}

impl TcpMetricSink {
    /// Creates a `TcpMetricSink` from an existing stream.
    pub fn new(stream: TcpStream) -> Self {
        TcpMetricSink { stream }
    }

    /// Connects to `sink_addr`.
    ///
    /// # Errors
    ///
    /// If the connection cannot be established, an error is returned.
    pub fn connect(sink_addr: SocketAddr) -> io::Result<Self> {
        TcpStream::connect(sink_addr).map(TcpMetricSink::new)
    }
}

impl MetricSink for TcpMetricSink {
    fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
        self.stream.write_all(payload)?;
        Ok(payload.len())
    }
}

/// Opens the sink appropriate for the given transport mode.
pub(crate) fn open_sink(
    remote_addr: SocketAddr,
    mode: TransportMode,
) -> Result<Box<dyn MetricSink>, StatsdError> {
    match mode {
        TransportMode::Datagram => UdpMetricSink::bind(remote_addr)
            .map(|sink| Box::new(sink) as Box<dyn MetricSink>)
            .map_err(|source| StatsdError::Socket { source }),
        TransportMode::Stream => TcpMetricSink::connect(remote_addr)
            .map(|sink| Box::new(sink) as Box<dyn MetricSink>)
            .map_err(|source| StatsdError::Connect { address: remote_addr, source }),
    }
}

/// Sends a payload, retrying for as long as the write is interrupted by a signal.
///
/// Any other error is returned as-is, without retrying.
pub(crate) fn send_with_retry<S: MetricSink + ?Sized>(
    sink: &mut S,
    payload: &[u8],
) -> io::Result<usize> {
    loop {
        match sink.send(payload) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                trace!(payload_len = payload.len(), "Send interrupted, retrying.");
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Read as _},
        net::{TcpListener, UdpSocket},
    };

    use super::{send_with_retry, MetricSink as _, TcpMetricSink, UdpMetricSink};
    use crate::test_util::ScriptedSink;

    #[test]
    fn retries_interrupted_sends() {
        let (mut sink, handle) = ScriptedSink::new();
        sink.push_error(io::ErrorKind::Interrupted);
        sink.push_error(io::ErrorKind::Interrupted);
        sink.push_error(io::ErrorKind::Interrupted);

        let sent = send_with_retry(&mut sink, b"foo:1|c").unwrap();
        assert_eq!(sent, 7);
        assert_eq!(handle.attempts(), 4);
        assert_eq!(handle.payloads(), vec![b"foo:1|c".to_vec()]);
    }

    #[test]
    fn does_not_retry_other_errors() {
        let (mut sink, handle) = ScriptedSink::new();
        sink.push_error(io::ErrorKind::Interrupted);
        sink.push_error(io::ErrorKind::ConnectionRefused);

        let err = send_with_retry(&mut sink, b"foo:1|c").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert_eq!(handle.attempts(), 2);
        assert!(handle.payloads().is_empty());
    }

    #[test]
    fn udp_sink_sends_datagrams() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut sink = UdpMetricSink::bind(receiver.local_addr().unwrap()).unwrap();

        assert_eq!(sink.send(b"foo:1|c\nbar:2|ms").unwrap(), 16);

        let mut buf = [0u8; 512];
        let len = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"foo:1|c\nbar:2|ms");
    }

    #[test]
    fn tcp_sink_writes_whole_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut sink = TcpMetricSink::connect(listener.local_addr().unwrap()).unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        assert_eq!(sink.send(b"foo:1|c\n").unwrap(), 8);
        drop(sink);

        let mut received = String::new();
        peer.read_to_string(&mut received).unwrap();
        assert_eq!(received, "foo:1|c\n");
    }
}
