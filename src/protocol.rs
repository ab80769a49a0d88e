//! Event vocabulary for the timer server's `/ws` feed.
//!
//! The server pushes JSON text frames, each tagged by a `type` field. Parsing
//! is default-safe: unknown types map to [`ServerEvent::Unknown`], malformed
//! frames are discarded, and absent numeric fields deserialize to zero, so a
//! bad frame can never take down the consumer.

use serde::{Deserialize, Serialize};

/// One shot within a session: shot number and its time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    #[serde(default)]
    pub num: u32,
    #[serde(default)]
    pub time: f64,
}

/// Retained session snapshot, sent once per WebSocket connect so a client
/// joining mid-session starts from the server's view instead of a blank one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub shots: Vec<Shot>,
    #[serde(default)]
    pub first_shot: f64,
    #[serde(default)]
    pub best_split: f64,
    #[serde(default)]
    pub total_time: f64,
    #[serde(default)]
    pub sess_id: Option<u64>,
}

/// Server-to-client events delivered over `/ws`.
///
/// The tag values are the server's wire names verbatim. Frames carry extra
/// fields (`addr`, `model`, ...) beyond what each variant declares; serde
/// ignores them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "SESSION_STARTED")]
    SessionStarted {
        #[serde(default)]
        sess_id: u64,
    },

    #[serde(rename = "SHOT_DETECTED")]
    ShotDetected {
        #[serde(default)]
        num: u32,
        #[serde(default)]
        time: f64,
        /// Split as computed by the server. Informational only; the reducer
        /// recomputes splits from its own shot list.
        #[serde(default)]
        split: Option<f64>,
    },

    #[serde(rename = "SESSION_SUSPENDED")]
    SessionSuspended,

    #[serde(rename = "SESSION_RESUMED")]
    SessionResumed,

    #[serde(rename = "SESSION_STOPPED")]
    SessionStopped,

    /// The device groups sessions into sets; the console only logs this.
    #[serde(rename = "SESSION_SET_BEGIN")]
    SessionSetBegin,

    #[serde(rename = "SESSION_SYNC")]
    SessionSync {
        #[serde(default)]
        state: SessionSnapshot,
    },

    #[serde(rename = "DEVICE_CONNECTED")]
    DeviceConnected {
        #[serde(default)]
        addr: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        api_version: Option<String>,
    },

    #[serde(rename = "DEVICE_DISCONNECTED")]
    DeviceDisconnected {
        #[serde(default)]
        addr: String,
        #[serde(default)]
        name: String,
    },

    /// Watchdog link-state report. `status` is `disconnected`, `reconnected`,
    /// or a free-form failure string (`retry_failed:...`, `error:...`).
    #[serde(rename = "WATCHDOG")]
    Watchdog {
        #[serde(default)]
        status: String,
        #[serde(default)]
        addr: String,
    },

    #[serde(rename = "TITLE_UPDATE")]
    TitleUpdate {
        #[serde(default)]
        title: String,
    },

    #[serde(rename = "ERROR")]
    Error {
        #[serde(default)]
        message: String,
    },

    /// Any type the console does not recognize. Ignored without error.
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Parse one text frame. Returns `None` for frames that are not a JSON
    /// object with a string `type`; those are dropped, not errors.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!(error = %e, "discarding malformed event frame");
                None
            }
        }
    }
}
