use metrics_exporter_statsd::{CommandCompleted, SessionEvent, StatsdBuilder, TimeoutKind};

fn main() {
    tracing_subscriber::fmt::init();

    let mut reporter = StatsdBuilder::default()
        .with_remote_address("tcp://localhost:9125")
        .expect("failed to parse remote address")
        .with_prefix("ftpd")
        .with_sampling_percentage(50.0)
        .expect("failed to set sampling percentage")
        .with_exclude_patterns(["NOOP", "FEAT"])
        .build_reporter()
        .expect("failed to build session reporter")
        .expect("reporting should be enabled");

    reporter.handle(SessionEvent::SessionOpened);

    let commands = [("USER", "331"), ("PASS", "230"), ("NOOP", "200"), ("PWD", "257"), ("RETR", "226")];
    for (elapsed_ms, (command, response_code)) in (1..).zip(commands) {
        let mut completed = CommandCompleted::new(command, "ftp");
        completed.response_code = Some(response_code.to_string());
        completed.elapsed_ms = Some(elapsed_ms * 3);
        reporter.handle(SessionEvent::CommandCompleted(completed));
    }

    reporter.handle(SessionEvent::Timeout(TimeoutKind::Idle));
    reporter.handle(SessionEvent::SessionClosed { protocol: "ftp".to_string() });
}
