use log::{info, warn};

use crate::{
    config::StationConfig,
    link::LinkSupervisor,
    scan::{self, Observation},
    transport::{self, Connector, Endpoint, Transport},
};

/// Display/log collaborator for valid observations.
pub trait ObservationSink {
    fn publish(&mut self, observation: &Observation);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The link was not up; no channel was opened this cycle.
    LinkDown,
    /// Resolve/connect/handshake failed; straight to cooldown.
    ConnectFailed,
    /// The request never made it out; the channel was closed.
    Aborted,
    /// The read loop ran to the end of the stream (or a read fault).
    Completed { chunks: usize, observations: usize },
}

/// One fetch attempt at a time against a fixed endpoint. The receive
/// buffer and request bytes are allocated once and reused: the buffer is
/// cleared, never reallocated, between chunks and between attempts.
pub struct Session {
    endpoint: Endpoint,
    request: Vec<u8>,
    rx_buf: Vec<u8>,
}

impl Session {
    pub fn new(config: &StationConfig) -> Self {
        Self {
            endpoint: config.api.endpoint(),
            request: config.api.request_bytes(),
            rx_buf: vec![0; config.api.rx_buf_size],
        }
    }

    /// Runs one full attempt: readiness gate, open, send, read/scan loop,
    /// unconditional teardown. The cooldown between attempts belongs to
    /// the caller, which owns the sleeping primitive.
    pub fn run_attempt<C, S>(
        &mut self,
        link: &LinkSupervisor,
        connector: &mut C,
        sink: &mut S,
    ) -> AttemptOutcome
    where
        C: Connector,
        S: ObservationSink,
    {
        if !link.is_ready() {
            info!("wifi link not ready, skipping this fetch cycle");
            return AttemptOutcome::LinkDown;
        }

        let mut channel = match connector.open(&self.endpoint) {
            Ok(channel) => channel,
            Err(err) => {
                warn!(
                    "connection to {}:{} failed: {err}",
                    self.endpoint.host, self.endpoint.port
                );
                return AttemptOutcome::ConnectFailed;
            }
        };
        info!("connection established to {}", self.endpoint.host);

        if let Err(err) = transport::send_all(&mut channel, &self.request) {
            warn!("request send failed: {err}");
            channel.close();
            return AttemptOutcome::Aborted;
        }

        let outcome = self.read_response(&mut channel, sink);
        channel.close();
        outcome
    }

    fn read_response<T, S>(&mut self, channel: &mut T, sink: &mut S) -> AttemptOutcome
    where
        T: Transport,
        S: ObservationSink,
    {
        let mut chunks = 0;
        let mut observations = 0;

        loop {
            // Cleared before every read so a short chunk never parses
            // against the tail of the previous one.
            self.rx_buf.fill(0);
            match channel.read(&mut self.rx_buf) {
                Ok(0) => break,
                Ok(len) => {
                    chunks += 1;
                    if let Some(observation) = scan::scan_chunk(&self.rx_buf[..len]) {
                        observations += 1;
                        sink.publish(&observation);
                    }
                }
                Err(err) if err.is_transient() => continue,
                Err(err) => {
                    warn!("response read failed: {err}");
                    break;
                }
            }
        }

        AttemptOutcome::Completed {
            chunks,
            observations,
        }
    }
}
