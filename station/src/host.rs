use std::time::Duration;

use tracing::{info, warn};

use pogoda_common::{
    config::StationConfig,
    link::{LinkEvent, LinkSupervisor},
    scan::Observation,
    session::{AttemptOutcome, ObservationSink, Session},
    transport::{ConnectError, Connector, Endpoint, TransferError, Transport},
};

// A recorded informers response, replayed the way the device sees it: the
// header prelude arrives in its own chunk, the JSON body in the next.
const REPLAY_HEADERS: &str =
    "HTTP/1.1 200 OK\r\nContent-Type: application/json; charset=utf-8\r\n\r\n";
const REPLAY_BODY: &str = r#"{"now":1754550000,"fact":{"condition":"overcast","temp":-3,"feels_like":-7,"icon":"ovc","wind_speed":4.1},"info":{"url":"https://yandex.ru/pogoda/saint-petersburg"}}"#;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = StationConfig::default();
    if let Ok(host) = std::env::var("WEATHER_HOST") {
        config.api.host = host;
    }
    if let Ok(path) = std::env::var("WEATHER_PATH") {
        config.api.path = path;
    }
    if let Ok(key) = std::env::var("WEATHER_API_KEY") {
        config.api.api_key = key;
    }
    if let Ok(label) = std::env::var("WEATHER_LOCATION") {
        config.location_label = label;
    }
    config.sanitize();

    // No radio on the host build; bring the link up the way the stack
    // callbacks would on the device.
    let link = LinkSupervisor::new(config.wifi.max_retries);
    link.handle_event(LinkEvent::StationStarted);
    link.handle_event(LinkEvent::AddressAcquired);

    let cooldown = Duration::from_millis(config.cooldown_ms);
    let mut session = Session::new(&config);
    let mut connector = ReplayConnector;
    let mut sink = TracingSink {
        location: config.location_label.clone(),
    };

    info!(
        host = %config.api.host,
        cooldown_ms = config.cooldown_ms,
        "station host loop started (replaying a recorded response)"
    );

    loop {
        match session.run_attempt(&link, &mut connector, &mut sink) {
            AttemptOutcome::Completed {
                chunks,
                observations,
            } => info!(chunks, observations, "fetch finished"),
            outcome => warn!(?outcome, "fetch cycle ended early"),
        }
        tokio::time::sleep(cooldown).await;
    }
}

struct TracingSink {
    location: String,
}

impl ObservationSink for TracingSink {
    fn publish(&mut self, observation: &Observation) {
        let stamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
        info!("[{stamp}] {}", observation.report(&self.location));
    }
}

struct ReplayConnector;

struct ReplayChannel {
    chunks: std::vec::IntoIter<Vec<u8>>,
    written: Vec<u8>,
    stalled_once: bool,
    closed: bool,
}

impl Connector for ReplayConnector {
    type Channel = ReplayChannel;

    fn open(&mut self, endpoint: &Endpoint) -> Result<ReplayChannel, ConnectError> {
        info!(
            "replaying recorded response for https://{}:{}",
            endpoint.host, endpoint.port
        );
        Ok(ReplayChannel {
            chunks: vec![
                REPLAY_HEADERS.as_bytes().to_vec(),
                REPLAY_BODY.as_bytes().to_vec(),
            ]
            .into_iter(),
            written: Vec::new(),
            stalled_once: false,
            closed: false,
        })
    }
}

impl Transport for ReplayChannel {
    fn write(&mut self, buf: &[u8]) -> Result<usize, TransferError> {
        if self.closed {
            return Err(TransferError::Fatal(0));
        }
        // Stall once and then trickle, so the send loop sees the same
        // partial-write behavior the device transport produces.
        if !self.stalled_once {
            self.stalled_once = true;
            return Err(TransferError::WantWrite);
        }
        let accepted = buf.len().min(16);
        self.written.extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        if self.closed {
            return Err(TransferError::Fatal(0));
        }
        match self.chunks.next() {
            Some(chunk) => {
                let len = chunk.len().min(buf.len());
                buf[..len].copy_from_slice(&chunk[..len]);
                Ok(len)
            }
            None => Ok(0),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            info!("request transcript: {} byte(s) written", self.written.len());
        }
        self.closed = true;
    }
}
