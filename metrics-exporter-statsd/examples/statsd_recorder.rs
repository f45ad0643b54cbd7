use std::{thread, time::Duration};

use metrics::{counter, gauge, histogram};
use metrics_exporter_statsd::StatsdBuilder;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

fn main() {
    tracing_subscriber::fmt::init();

    StatsdBuilder::default()
        .with_remote_address("localhost:9125")
        .expect("failed to parse remote address")
        .with_prefix("example")
        .install()
        .expect("failed to install StatsD recorder");

    gauge!("testing").set(42.0);

    let server_loops = counter!("tcp_server_loops");
    let server_loops_delta_secs = histogram!("tcp_server_loop_delta_secs");

    let mut rng = Xoshiro256StarStar::try_from_rng(&mut rand::rng()).unwrap();

    // Loop over and over, pretending to do some work.
    loop {
        server_loops.increment(1);
        server_loops_delta_secs.record(rng.random_range(0.0..0.1));

        let gauge = gauge!("lucky_iterations");
        if rand::random_bool(0.75) {
            gauge.increment(1.0);
        } else {
            gauge.decrement(1.0);
        }

        thread::sleep(Duration::from_millis(10));
    }
}
