//! Live session state and the event reducer that maintains it.
//!
//! [`LiveSession`] is the single owner of everything shown in the live view:
//! counters, the shot list, the lifecycle status badge, device presence, and
//! the competition title. [`LiveSession::apply`] folds one server event into
//! the state and returns the effects a frontend needs to act on; the reducer
//! itself never touches I/O, so tests can drive arbitrary event sequences
//! against a fresh instance.
//!
//! Events must be applied in delivery order. Out-of-order application is not
//! supported and not detected.

use serde::{Deserialize, Serialize};

use crate::config::OnStop;
use crate::presence::Presence;
use crate::protocol::{ServerEvent, SessionSnapshot, Shot};

/// Lifecycle state of the session shown in the live view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionStatus {
    /// No session seen yet.
    #[default]
    Idle,
    Live,
    Standby,
    Stopped,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionStatus::Idle => "IDLE",
            SessionStatus::Live => "LIVE",
            SessionStatus::Standby => "STANDBY",
            SessionStatus::Stopped => "STOPPED",
        };
        f.write_str(label)
    }
}

impl SessionStatus {
    /// Parse the status string carried by a session snapshot. Anything
    /// unrecognized falls back on the snapshot's `active` flag.
    fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        match snapshot.status.as_str() {
            "LIVE" => SessionStatus::Live,
            "STANDBY" => SessionStatus::Standby,
            "STOPPED" => SessionStatus::Stopped,
            _ if snapshot.active => SessionStatus::Live,
            _ => SessionStatus::Stopped,
        }
    }
}

/// What a frontend must do after one event has been folded in.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// A new session began; all counters were reset.
    SessionStarted { sess_id: u64 },
    /// A shot was appended. `split` is the interval to the previous shot,
    /// `None` for the first shot of a session.
    ShotAppended { shot: Shot, split: Option<f64> },
    /// One or more of the stats counters changed; re-render the stats line.
    StatsChanged,
    /// The lifecycle badge changed.
    StatusChanged(SessionStatus),
    /// The presence indicator changed.
    PresenceChanged(Presence),
    /// The competition title changed.
    TitleChanged(String),
    /// The session ended. Cache entries for it should be dropped and a
    /// history refresh scheduled.
    SessionStopped { sess_id: Option<u64> },
    /// The server replaced local state wholesale with its retained snapshot.
    Synced,
    /// A line worth showing in the log panel, with no state attached.
    Note(String),
}

/// In-memory state of the current (or most recent) session.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSession {
    pub sess_id: Option<u64>,
    pub status: SessionStatus,
    pub presence: Presence,
    pub shots: Vec<Shot>,
    pub total_shots: u32,
    /// Time of the most recent shot, seconds.
    pub total_time: f64,
    /// Minimum positive inter-shot interval seen this session. `0.0` is the
    /// sentinel for "no split computed yet", never a valid split.
    pub best_split: f64,
    /// Time of shot #1, seconds.
    pub first_shot_time: f64,
    pub title: String,
    on_stop: OnStop,
}

impl LiveSession {
    pub fn new(on_stop: OnStop) -> Self {
        Self {
            sess_id: None,
            status: SessionStatus::Idle,
            presence: Presence::Disconnected,
            shots: Vec::new(),
            total_shots: 0,
            total_time: 0.0,
            best_split: 0.0,
            first_shot_time: 0.0,
            title: String::new(),
            on_stop,
        }
    }

    /// Fold one event into the state, returning the effects to act on.
    pub fn apply(&mut self, event: &ServerEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.fold_presence(event, &mut effects);

        match event {
            ServerEvent::SessionStarted { sess_id } => {
                self.reset_counters();
                self.sess_id = Some(*sess_id);
                effects.push(Effect::SessionStarted { sess_id: *sess_id });
                self.set_status(SessionStatus::Live, &mut effects);
                effects.push(Effect::StatsChanged);
            }

            ServerEvent::ShotDetected { num, time, .. } => {
                // A shot with no preceding SESSION_STARTED still counts: the
                // session is created implicitly from whatever state we hold.
                let split = self.shots.last().map(|prev| time - prev.time);
                if self.shots.is_empty() {
                    self.first_shot_time = *time;
                }
                let shot = Shot {
                    num: *num,
                    time: *time,
                };
                self.shots.push(shot);
                self.total_shots = self.shots.len() as u32;
                self.total_time = *time;
                if let Some(split) = split {
                    if split > 0.0 && (self.best_split == 0.0 || split < self.best_split) {
                        self.best_split = split;
                    }
                }
                effects.push(Effect::ShotAppended { shot, split });
                self.set_status(SessionStatus::Live, &mut effects);
                effects.push(Effect::StatsChanged);
            }

            ServerEvent::SessionSuspended => {
                self.set_status(SessionStatus::Standby, &mut effects);
            }

            ServerEvent::SessionResumed => {
                self.set_status(SessionStatus::Live, &mut effects);
            }

            ServerEvent::SessionStopped => {
                self.set_status(SessionStatus::Stopped, &mut effects);
                effects.push(Effect::SessionStopped {
                    sess_id: self.sess_id,
                });
                if self.on_stop == OnStop::Clear {
                    self.reset_counters();
                    effects.push(Effect::StatsChanged);
                }
            }

            ServerEvent::SessionSetBegin => {
                effects.push(Effect::Note("session set begin".into()));
            }

            ServerEvent::SessionSync { state } => {
                self.adopt_snapshot(state);
                effects.push(Effect::Synced);
                effects.push(Effect::StatusChanged(self.status));
                effects.push(Effect::StatsChanged);
            }

            ServerEvent::DeviceConnected {
                name, model, addr, ..
            } => {
                let model = model.as_deref().unwrap_or("unknown model");
                effects.push(Effect::Note(format!(
                    "device connected: {} ({}) [{}]",
                    name, addr, model
                )));
            }

            ServerEvent::DeviceDisconnected { name, addr } => {
                effects.push(Effect::Note(format!(
                    "device disconnected: {} ({})",
                    name, addr
                )));
            }

            ServerEvent::Watchdog { status, addr } => {
                // Healthy transitions already surface via PresenceChanged;
                // only the failure statuses need their own line.
                if status != "disconnected" && status != "reconnected" {
                    effects.push(Effect::Note(format!("watchdog {}: {}", addr, status)));
                }
            }

            ServerEvent::TitleUpdate { title } => {
                if *title != self.title {
                    self.title = title.clone();
                    effects.push(Effect::TitleChanged(title.clone()));
                }
            }

            ServerEvent::Error { message } => {
                effects.push(Effect::Note(format!("server error: {}", message)));
            }

            ServerEvent::Unknown => {}
        }

        effects
    }

    /// Summary line for the stats panel.
    pub fn stats_line(&self) -> String {
        format!(
            "shots {}  total {:.2}s  best split {:.2}s  first {:.2}s",
            self.total_shots, self.total_time, self.best_split, self.first_shot_time
        )
    }

    fn fold_presence(&mut self, event: &ServerEvent, effects: &mut Vec<Effect>) {
        let next = self.presence.on_event(event);
        if next != self.presence {
            self.presence = next;
            effects.push(Effect::PresenceChanged(next));
        }
    }

    fn set_status(&mut self, status: SessionStatus, effects: &mut Vec<Effect>) {
        if self.status != status {
            self.status = status;
            effects.push(Effect::StatusChanged(status));
        }
    }

    fn reset_counters(&mut self) {
        self.shots.clear();
        self.total_shots = 0;
        self.total_time = 0.0;
        self.best_split = 0.0;
        self.first_shot_time = 0.0;
    }

    fn adopt_snapshot(&mut self, snapshot: &SessionSnapshot) {
        self.sess_id = snapshot.sess_id;
        self.shots = snapshot.shots.clone();
        self.total_shots = snapshot.shots.len() as u32;
        self.total_time = snapshot.total_time;
        self.best_split = snapshot.best_split;
        self.first_shot_time = snapshot.first_shot;
        self.status = SessionStatus::from_snapshot(snapshot);
    }
}

impl Default for LiveSession {
    fn default() -> Self {
        Self::new(OnStop::default())
    }
}
