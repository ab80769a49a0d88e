//! Device presence: a coarse tri-state derived from connection lifecycle and
//! watchdog events.
//!
//! Precedence: an explicit `DEVICE_DISCONNECTED` severs outright; a watchdog
//! `disconnected` only demotes to [`Presence::Standby`] because the server is
//! still attempting silent recovery; `DEVICE_CONNECTED` and watchdog
//! `reconnected` always win over a prior standby.

use std::fmt;

use crate::protocol::ServerEvent;

/// Client-derived connectivity indicator, coarser than raw connection events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    /// A device is connected and the link is healthy.
    Connected,
    /// The link is degraded; the device is still nominally owned while the
    /// server watchdog retries in the background.
    Standby,
    /// No device connected.
    #[default]
    Disconnected,
}

impl Presence {
    /// Initial state from the one-shot `GET /status` poll at startup.
    pub fn from_status(connected: bool) -> Self {
        if connected {
            Presence::Connected
        } else {
            Presence::Disconnected
        }
    }

    /// Fold one event into the current state. Events that say nothing about
    /// the link leave the state unchanged.
    pub fn on_event(self, event: &ServerEvent) -> Self {
        match event {
            ServerEvent::DeviceConnected { .. } => Presence::Connected,
            ServerEvent::DeviceDisconnected { .. } => Presence::Disconnected,
            ServerEvent::Watchdog { status, .. } => match status.as_str() {
                "disconnected" => Presence::Standby,
                "reconnected" => Presence::Connected,
                _ => self,
            },
            _ => self,
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Presence::Connected => "connected",
            Presence::Standby => "standby",
            Presence::Disconnected => "disconnected",
        };
        f.write_str(label)
    }
}
