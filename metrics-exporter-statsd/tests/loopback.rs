use std::{
    io::{BufRead as _, BufReader},
    net::{TcpListener, UdpSocket},
    time::Duration,
};

use metrics::{Key, Recorder as _};
use metrics_exporter_statsd::{
    StatsdBuilder, StatsdClient, TransportMode, UdpMetricSink, MAX_PACKET_LEN,
};

static METADATA: metrics::Metadata =
    metrics::Metadata::new(module_path!(), metrics::Level::INFO, Some(module_path!()));

fn udp_receiver() -> UdpSocket {
    let receiver = UdpSocket::bind("127.0.0.1:0").expect("failed to bind receiver");
    receiver.set_read_timeout(Some(Duration::from_secs(5))).expect("failed to set read timeout");
    receiver
}

fn recv_string(receiver: &UdpSocket) -> String {
    let mut buf = [0; 2 * MAX_PACKET_LEN];
    let len = receiver.recv(&mut buf).expect("failed to receive packet");
    String::from_utf8(buf[..len].to_vec()).expect("packet should be UTF-8")
}

#[test]
fn datagram_packets_are_bounded() {
    let receiver = udp_receiver();
    let mut client = StatsdClient::open(
        receiver.local_addr().unwrap(),
        TransportMode::Datagram,
        1.0,
        Some("it"),
        None,
    )
    .unwrap();

    let mut expected = Vec::new();
    for i in 0..100 {
        let name = format!("counter.{i}");
        client.record_counter(&name, i, false).unwrap();
        expected.push(format!("it.{name}:{i}|c"));
    }
    client.close().unwrap();

    let mut received = Vec::new();
    while received.len() < expected.len() {
        let packet = recv_string(&receiver);
        assert!(packet.len() <= MAX_PACKET_LEN, "packet of {} bytes", packet.len());
        received.extend(packet.split('\n').map(ToString::to_string));
    }

    assert_eq!(received, expected);
}

#[test]
fn stream_lines_are_written_immediately() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut client = StatsdBuilder::default()
        .with_remote_address(format!("tcp://127.0.0.1:{port}"))
        .unwrap()
        .with_suffix("host1")
        .build()
        .unwrap()
        .expect("client should be built when enabled");
    assert_eq!(client.transport_mode(), TransportMode::Stream);

    let (stream, _) = listener.accept().unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut lines = BufReader::new(stream).lines();

    client.record_timer("upload", 1_500, false).unwrap();
    assert_eq!(client.pending_len(), 0);
    assert_eq!(lines.next().unwrap().unwrap(), "upload.host1:1500|ms");

    client.record_gauge("connection", -2, true).unwrap();
    assert_eq!(lines.next().unwrap().unwrap(), "connection.host1:-2|g");
}

#[test]
fn override_sink_redirects_pending_metrics() {
    let first = udp_receiver();
    let second = udp_receiver();

    let mut client =
        StatsdClient::open(first.local_addr().unwrap(), TransportMode::Datagram, 0.5, None, None).unwrap();
    client.record_counter("moved", 1, false).unwrap();

    let sink = UdpMetricSink::bind(second.local_addr().unwrap()).unwrap();
    client.override_sink(sink);
    client.flush().unwrap();

    assert_eq!(recv_string(&second), "moved:1|c|@0.50");

    first.set_nonblocking(true).unwrap();
    let mut buf = [0; MAX_PACKET_LEN];
    assert!(first.recv(&mut buf).is_err(), "nothing should reach the original server");
}

#[test]
fn recorder_over_udp() {
    let receiver = udp_receiver();
    let port = receiver.local_addr().unwrap().port();

    let recorder = StatsdBuilder::default()
        .with_remote_address(format!("udp://127.0.0.1:{port}"))
        .unwrap()
        .with_prefix("svc")
        .build_recorder()
        .unwrap();

    recorder.register_counter(&Key::from_name("requests"), &METADATA).increment(2);
    recorder.register_histogram(&Key::from_name("latency"), &METADATA).record(0.005);
    recorder.flush().unwrap();

    assert_eq!(recv_string(&receiver), "svc.requests:2|c\nsvc.latency:5|ms");
}

#[test]
fn unreachable_server_does_not_fail_recording() {
    // Bind and drop a socket to get a port nobody is listening on.
    let addr = udp_receiver().local_addr().unwrap();

    let mut client = StatsdClient::open(addr, TransportMode::Datagram, 1.0, None, None).unwrap();
    for _ in 0..100 {
        client.record_counter("lost", 1, false).unwrap();
    }
    // Whether the unreachable port is reported is up to the OS; either way the payload is gone.
    match client.flush() {
        Ok(()) => {}
        Err(e) => assert!(e.is_transmission(), "unexpected error: {e}"),
    }
    assert_eq!(client.pending_len(), 0);

    client.record_counter("still.usable", 1, false).unwrap();
    assert!(client.pending_len() > 0);
}
