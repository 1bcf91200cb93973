use std::sync::{Arc, Mutex};

use log::{info, warn};

/// Raw network-stack notifications, already narrowed to the three the
/// station cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    StationStarted,
    Disconnected,
    AddressAcquired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Disconnected,
    Connecting,
    Connected,
}

impl LinkPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
        }
    }
}

/// What the event context must do next with the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Connect,
}

#[derive(Debug)]
struct LinkInner {
    phase: LinkPhase,
    retries: u32,
}

/// Association state shared between the network-stack callback context and
/// the fetch task. The callbacks are the only writer; the fetch task only
/// ever asks `is_ready`.
#[derive(Clone)]
pub struct LinkSupervisor {
    max_retries: u32,
    inner: Arc<Mutex<LinkInner>>,
}

impl LinkSupervisor {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            inner: Arc::new(Mutex::new(LinkInner {
                phase: LinkPhase::Disconnected,
                retries: 0,
            })),
        }
    }

    /// Single dispatch point for stack events. Returns the action the
    /// caller must carry out, if any. Reconnects are bounded: once the
    /// retry budget is spent the link stays down until an external reset.
    pub fn handle_event(&self, event: LinkEvent) -> Option<LinkAction> {
        let mut inner = self.inner.lock().unwrap();
        match event {
            LinkEvent::StationStarted => {
                inner.phase = LinkPhase::Connecting;
                Some(LinkAction::Connect)
            }
            LinkEvent::Disconnected => {
                if inner.retries < self.max_retries {
                    inner.retries += 1;
                    inner.phase = LinkPhase::Connecting;
                    info!(
                        "wifi disconnected, reconnect attempt {}/{}",
                        inner.retries, self.max_retries
                    );
                    Some(LinkAction::Connect)
                } else {
                    inner.phase = LinkPhase::Disconnected;
                    warn!(
                        "wifi lost after {} reconnect attempts; giving up until restart",
                        self.max_retries
                    );
                    None
                }
            }
            LinkEvent::AddressAcquired => {
                inner.phase = LinkPhase::Connected;
                inner.retries = 0;
                info!("wifi link up, address acquired");
                None
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().unwrap().phase == LinkPhase::Connected
    }

    pub fn phase(&self) -> LinkPhase {
        self.inner.lock().unwrap().phase
    }

    pub fn retries(&self) -> u32 {
        self.inner.lock().unwrap().retries
    }
}
