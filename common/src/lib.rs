pub mod config;
pub mod link;
pub mod scan;
pub mod session;
pub mod transport;

pub use config::{ApiConfig, StationConfig, WifiConfig};
pub use link::{LinkAction, LinkEvent, LinkPhase, LinkSupervisor};
pub use scan::Observation;
pub use session::{AttemptOutcome, ObservationSink, Session};
pub use transport::{ConnectError, Connector, Endpoint, TransferError, Transport};
