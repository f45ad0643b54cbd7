use std::{collections::VecDeque, io, sync::Arc};

use parking_lot::Mutex;

use crate::transport::sink::MetricSink;

#[derive(Default)]
struct SinkState {
    attempts: usize,
    payloads: Vec<Vec<u8>>,
}

/// A sink that records every payload it successfully "sends".
///
/// Errors can be queued up ahead of time, and are returned, in order, by the next sends. A sink can also be made to
/// fail every send.
pub(crate) struct ScriptedSink {
    script: VecDeque<io::ErrorKind>,
    always_fail: Option<io::ErrorKind>,
    state: Arc<Mutex<SinkState>>,
}

impl ScriptedSink {
    pub fn new() -> (Self, SinkHandle) {
        let state = Arc::new(Mutex::new(SinkState::default()));
        let sink = ScriptedSink { script: VecDeque::new(), always_fail: None, state: Arc::clone(&state) };
        (sink, SinkHandle { state })
    }

    pub fn failing(kind: io::ErrorKind) -> (Self, SinkHandle) {
        let (mut sink, handle) = ScriptedSink::new();
        sink.always_fail = Some(kind);
        (sink, handle)
    }

    pub fn push_error(&mut self, kind: io::ErrorKind) {
        self.script.push_back(kind);
    }
}

impl MetricSink for ScriptedSink {
    fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        state.attempts += 1;

        if let Some(kind) = self.script.pop_front().or(self.always_fail) {
            return Err(io::Error::from(kind));
        }

        state.payloads.push(payload.to_vec());
        Ok(payload.len())
    }
}

/// Inspects what a [`ScriptedSink`] has seen, after it has been moved into a client.
#[derive(Clone)]
pub(crate) struct SinkHandle {
    state: Arc<Mutex<SinkState>>,
}

impl SinkHandle {
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.state.lock().payloads.clone()
    }

    pub fn payload_strings(&self) -> Vec<String> {
        self.state
            .lock()
            .payloads
            .iter()
            .map(|payload| String::from_utf8(payload.clone()).expect("payload should be UTF-8"))
            .collect()
    }
}
