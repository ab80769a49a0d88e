//! Persistent session cache: a small JSON key-value file that lets a restarted
//! console show the last known counters and shot list before any WebSocket
//! event arrives.
//!
//! Keys for session data are namespaced by session id (`shots_<id>`,
//! `best_split_<id>`, ...) so stale data from a previous session can never
//! leak into a new one. The only un-namespaced session key is `sess_id`, which
//! records which session to restore.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::OnStop;
use crate::live::{LiveSession, SessionStatus};
use crate::protocol::Shot;

/// Last known live session id.
const KEY_SESS_ID: &str = "sess_id";
/// Address of the most recently connected device, for reconnect convenience.
const KEY_LAST_DEVICE: &str = "last_device_addr";
/// Lifecycle status string of the cached session.
const KEY_SESSION_STATE: &str = "session_state";

/// Per-session field names; stored as `<field>_<sess_id>`.
const SESSION_FIELDS: [&str; 5] = [
    "shots",
    "best_split",
    "total_time",
    "total_shots",
    "first_shot_time",
];

/// File-backed key-value store for console state.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    map: Map<String, Value>,
}

impl SessionStore {
    /// Open the store at `path`. A missing file yields an empty store; an
    /// unreadable or corrupt one is an error (the caller degrades to running
    /// without a cache).
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let map = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::ReadFailed(path.clone(), e))?;
            serde_json::from_str(&contents)
                .map_err(|e| StoreError::ParseFailed(path.clone(), e))?
        } else {
            Map::new()
        };
        Ok(Self { path, map })
    }

    /// Platform state file location (`~/.local/share/sgtc/state.json` on
    /// Linux). None when no data dir is resolvable.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("sgtc").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the store to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::WriteFailed(self.path.clone(), e))?;
        }
        let contents = serde_json::to_string_pretty(&self.map).expect("map is valid json");
        std::fs::write(&self.path, contents)
            .map_err(|e| StoreError::WriteFailed(self.path.clone(), e))
    }

    /// Store one field for a session under its namespaced key.
    pub fn put(&mut self, sess_id: u64, field: &str, value: Value) {
        self.map.insert(format!("{}_{}", field, sess_id), value);
    }

    /// Fetch one field for a session; `None` when absent.
    pub fn get(&self, sess_id: u64, field: &str) -> Option<&Value> {
        self.map.get(&format!("{}_{}", field, sess_id))
    }

    /// Drop every namespaced entry for a session. Run on `SESSION_STOPPED`.
    pub fn clear(&mut self, sess_id: u64) {
        for field in SESSION_FIELDS {
            self.map.remove(&format!("{}_{}", field, sess_id));
        }
    }

    /// Drop namespaced entries for every session other than `keep`. Run at
    /// startup to bound growth from sessions that never saw a clean stop.
    pub fn sweep(&mut self, keep: Option<u64>) {
        let keep_suffix = keep.map(|id| format!("_{}", id));
        self.map.retain(|key, _| {
            let namespaced = SESSION_FIELDS
                .iter()
                .any(|f| key.starts_with(f) && key[f.len()..].starts_with('_'));
            if !namespaced {
                return true;
            }
            match &keep_suffix {
                Some(suffix) => key.ends_with(suffix.as_str()),
                None => false,
            }
        });
    }

    pub fn last_device(&self) -> Option<&str> {
        self.map.get(KEY_LAST_DEVICE).and_then(Value::as_str)
    }

    pub fn set_last_device(&mut self, addr: &str) {
        self.map.insert(KEY_LAST_DEVICE.into(), addr.into());
    }

    /// Mirror the live session's counters into the store. Does not flush.
    pub fn save_live(&mut self, live: &LiveSession) {
        self.map
            .insert(KEY_SESSION_STATE.into(), live.status.to_string().into());
        let Some(sess_id) = live.sess_id else {
            return;
        };
        self.map.insert(KEY_SESS_ID.into(), sess_id.into());
        self.put(
            sess_id,
            "shots",
            serde_json::to_value(&live.shots).expect("shots serialize"),
        );
        self.put(sess_id, "best_split", live.best_split.into());
        self.put(sess_id, "total_time", live.total_time.into());
        self.put(sess_id, "total_shots", live.total_shots.into());
        self.put(sess_id, "first_shot_time", live.first_shot_time.into());
    }

    /// Remove the cached session's entries and the restore pointer. Run when
    /// the live session stops.
    pub fn clear_live(&mut self) {
        if let Some(sess_id) = self.map.get(KEY_SESS_ID).and_then(Value::as_u64) {
            self.clear(sess_id);
        }
        self.map.remove(KEY_SESS_ID);
        self.map.remove(KEY_SESSION_STATE);
    }

    /// Rebuild a live session from the cache, or `None` when nothing is
    /// cached. Presence is derived state and always starts disconnected.
    pub fn restore_live(&self, on_stop: OnStop) -> Option<LiveSession> {
        let sess_id = self.map.get(KEY_SESS_ID)?.as_u64()?;
        let mut live = LiveSession::new(on_stop);
        live.sess_id = Some(sess_id);
        live.status = self
            .map
            .get(KEY_SESSION_STATE)
            .and_then(Value::as_str)
            .map(status_from_str)
            .unwrap_or(SessionStatus::Idle);
        live.shots = self
            .get(sess_id, "shots")
            .and_then(|v| serde_json::from_value::<Vec<Shot>>(v.clone()).ok())
            .unwrap_or_default();
        live.total_shots = self
            .get(sess_id, "total_shots")
            .and_then(Value::as_u64)
            .unwrap_or(live.shots.len() as u64) as u32;
        live.total_time = self
            .get(sess_id, "total_time")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        live.best_split = self
            .get(sess_id, "best_split")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        live.first_shot_time = self
            .get(sess_id, "first_shot_time")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        Some(live)
    }
}

fn status_from_str(s: &str) -> SessionStatus {
    match s {
        "LIVE" => SessionStatus::Live,
        "STANDBY" => SessionStatus::Standby,
        "STOPPED" => SessionStatus::Stopped,
        _ => SessionStatus::Idle,
    }
}

/// Errors that can occur when loading or saving console state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read state file {0}: {1}")]
    ReadFailed(PathBuf, #[source] std::io::Error),

    #[error("failed to parse state file {0}: {1}")]
    ParseFailed(PathBuf, #[source] serde_json::Error),

    #[error("failed to write state file {0}: {1}")]
    WriteFailed(PathBuf, #[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerEvent;

    fn temp_store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path().join("state.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn put_get_clear_are_namespaced() {
        let (_dir, mut store) = temp_store();
        store.put(100, "best_split", 0.75.into());
        store.put(200, "best_split", 1.5.into());

        assert_eq!(store.get(100, "best_split").unwrap().as_f64(), Some(0.75));
        assert_eq!(store.get(200, "best_split").unwrap().as_f64(), Some(1.5));

        store.clear(100);
        assert!(store.get(100, "best_split").is_none());
        assert_eq!(
            store.get(200, "best_split").unwrap().as_f64(),
            Some(1.5),
            "clearing one session leaves others alone"
        );
    }

    #[test]
    fn reload_scenario_restores_counters_and_shots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        // First process: run a short session, mirror it to the store.
        {
            let mut live = LiveSession::default();
            live.apply(&ServerEvent::SessionStarted { sess_id: 100 });
            for (num, time) in [(1, 2.00), (2, 3.50), (3, 4.25)] {
                live.apply(&ServerEvent::ShotDetected {
                    num,
                    time,
                    split: None,
                });
            }
            let mut store = SessionStore::open(path.clone()).unwrap();
            store.save_live(&live);
            store.flush().unwrap();
        }

        // Fresh process, cache intact, no events redelivered.
        let store = SessionStore::open(path).unwrap();
        let live = store.restore_live(OnStop::Retain).unwrap();
        assert_eq!(live.sess_id, Some(100));
        assert_eq!(live.total_shots, 3);
        assert_eq!(live.best_split, 0.75);
        assert_eq!(live.total_time, 4.25);
        assert_eq!(live.first_shot_time, 2.00);
        assert_eq!(live.shots.len(), 3);
        assert_eq!(live.status, SessionStatus::Live);
    }

    #[test]
    fn restore_with_empty_store_is_none() {
        let (_dir, store) = temp_store();
        assert!(store.restore_live(OnStop::Retain).is_none());
    }

    #[test]
    fn clear_live_removes_session_and_pointer() {
        let (_dir, mut store) = temp_store();
        let mut live = LiveSession::default();
        live.apply(&ServerEvent::SessionStarted { sess_id: 100 });
        live.apply(&ServerEvent::ShotDetected {
            num: 1,
            time: 2.0,
            split: None,
        });
        store.save_live(&live);

        store.clear_live();
        assert!(store.restore_live(OnStop::Retain).is_none());
        assert!(store.get(100, "shots").is_none());
    }

    #[test]
    fn sweep_drops_orphaned_sessions() {
        let (_dir, mut store) = temp_store();
        store.put(100, "shots", Value::Array(vec![]));
        store.put(100, "total_shots", 3.into());
        store.put(200, "shots", Value::Array(vec![]));
        store.set_last_device("AA:BB");

        store.sweep(Some(200));
        assert!(store.get(100, "shots").is_none());
        assert!(store.get(100, "total_shots").is_none());
        assert!(store.get(200, "shots").is_some());
        assert_eq!(store.last_device(), Some("AA:BB"), "sweep only touches namespaced keys");

        store.sweep(None);
        assert!(store.get(200, "shots").is_none());
    }

    #[test]
    fn last_device_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let mut store = SessionStore::open(path.clone()).unwrap();
            store.set_last_device("AA:BB:CC:DD:EE:FF");
            store.flush().unwrap();
        }
        let store = SessionStore::open(path).unwrap();
        assert_eq!(store.last_device(), Some("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn corrupt_state_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            SessionStore::open(path),
            Err(StoreError::ParseFailed(..))
        ));
    }
}
