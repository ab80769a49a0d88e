//! Watch mode: the single event loop behind `sgtc` with no subcommand.
//!
//! One task owns all mutable state. Every mutation happens on delivery of a
//! WebSocket event, a timer completion, or a finished HTTP call, serialized
//! by one `select!` loop; no locks around the reducer. Failures degrade to a
//! log line; nothing here is fatal.

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::client::ServerClient;
use crate::config::ConsoleConfig;
use crate::history::{format_sess_id, HistoryPager};
use crate::live::{Effect, LiveSession, SessionStatus};
use crate::presence::Presence;
use crate::protocol::ServerEvent;
use crate::store::SessionStore;

/// The live console: reducer state, cache, pager, and the server client.
pub struct Console {
    config: ConsoleConfig,
    client: ServerClient,
    live: LiveSession,
    store: Option<SessionStore>,
    pager: HistoryPager,
}

/// Timers armed while handling one event.
#[derive(Debug, Default)]
struct Handled {
    /// A session stopped; refresh the history after the export settle delay.
    refresh_due: bool,
    /// Presence changed; poll `/status` after the transition settle delay.
    settle_due: bool,
}

impl Console {
    pub fn new(config: ConsoleConfig, client: ServerClient, store: Option<SessionStore>) -> Self {
        let live = LiveSession::new(config.on_stop);
        let pager = HistoryPager::new(config.page_size);
        Self {
            config,
            client,
            live,
            store,
            pager,
        }
    }

    pub fn live(&self) -> &LiveSession {
        &self.live
    }

    pub fn pager(&self) -> &HistoryPager {
        &self.pager
    }

    /// Restore the cached session display, then sweep orphaned cache entries.
    /// Runs before any WebSocket event so a restart mid-session starts from
    /// the last known counters instead of a blank screen.
    pub fn restore(&mut self) {
        let Some(restored) = self
            .store
            .as_ref()
            .and_then(|s| s.restore_live(self.config.on_stop))
        else {
            self.sweep_store();
            return;
        };
        self.log(format!(
            "restored session {}: {}",
            restored
                .sess_id
                .map(format_sess_id)
                .unwrap_or_else(|| "?".into()),
            restored.stats_line()
        ));
        for shot in &restored.shots {
            self.log(format!("  shot #{} at {:.2}s", shot.num, shot.time));
        }
        self.live = restored;
        self.sweep_store();
    }

    fn sweep_store(&mut self) {
        let keep = self.live.sess_id;
        if let Some(store) = &mut self.store {
            store.sweep(keep);
            if let Err(e) = store.flush() {
                tracing::warn!(error = %e, "could not persist state file");
            }
        }
    }

    /// Best-effort priming of presence and title over HTTP. Runs once before
    /// the event loop; anything the live stream says afterwards wins.
    pub async fn prime(&mut self) {
        match self.client.status().await {
            Ok(status) => {
                self.live.presence = Presence::from_status(status.connected);
                self.log(format!("presence: {}", self.live.presence));
            }
            Err(e) => self.log(format!("status query failed: {}", e)),
        }
        match self.client.title().await {
            Ok(title) => {
                if !title.is_empty() && title != self.live.title {
                    self.live.title = title.clone();
                    self.log(format!("title: {}", title));
                }
            }
            Err(e) => tracing::debug!(error = %e, "title query failed"),
        }
    }

    /// Drive the console until the event channel closes or ctrl-c.
    ///
    /// On channel close a pending history refresh still completes, so a stop
    /// immediately followed by stream shutdown lands in the history view.
    pub async fn run(&mut self, mut events: mpsc::Receiver<ServerEvent>) {
        let mut refresh_at: Option<Instant> = None;
        let mut settle_at: Option<Instant> = None;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let handled = self.handle_event(&event);
                    if handled.refresh_due {
                        refresh_at = Some(Instant::now() + self.config.refresh_delay());
                    }
                    if handled.settle_due {
                        settle_at = Some(Instant::now() + self.config.settle_delay());
                    }
                }
                _ = sleep_until_opt(refresh_at) => {
                    refresh_at = None;
                    self.refresh_history().await;
                }
                _ = sleep_until_opt(settle_at) => {
                    settle_at = None;
                    self.log_roster().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    return;
                }
            }
        }

        if let Some(at) = refresh_at.take() {
            tokio::time::sleep_until(at).await;
            self.refresh_history().await;
        }
    }

    /// Fold one event through the reducer, render its effects, and mirror
    /// state into the cache.
    fn handle_event(&mut self, event: &ServerEvent) -> Handled {
        let effects = self.live.apply(event);
        let mut handled = Handled::default();

        for effect in &effects {
            self.render(effect);
            match effect {
                Effect::SessionStopped { .. } => {
                    if let Some(store) = &mut self.store {
                        store.clear_live();
                        if let Err(e) = store.flush() {
                            tracing::warn!(error = %e, "could not persist state file");
                        }
                    }
                    handled.refresh_due = true;
                }
                Effect::PresenceChanged(_) => handled.settle_due = true,
                _ => {}
            }
        }

        if let ServerEvent::DeviceConnected { addr, .. } = event {
            if let Some(store) = &mut self.store {
                store.set_last_device(addr);
                if let Err(e) = store.flush() {
                    tracing::warn!(error = %e, "could not persist state file");
                }
            }
        }

        // Mirror mid-session state after every mutating batch, so a crash
        // loses at most one event.
        let mutated = effects.iter().any(|e| {
            matches!(
                e,
                Effect::SessionStarted { .. } | Effect::ShotAppended { .. } | Effect::Synced
            )
        });
        if mutated && self.live.status != SessionStatus::Stopped {
            if let Some(store) = &mut self.store {
                store.save_live(&self.live);
                if let Err(e) = store.flush() {
                    tracing::warn!(error = %e, "could not persist state file");
                }
            }
        }

        handled
    }

    fn render(&self, effect: &Effect) {
        match effect {
            Effect::SessionStarted { sess_id } => {
                self.log(format!("session started ({})", format_sess_id(*sess_id)));
            }
            Effect::ShotAppended { shot, split } => match split {
                Some(split) => self.log(format!(
                    "shot #{} at {:.2}s (split {:.2}s)",
                    shot.num, shot.time, split
                )),
                None => self.log(format!("shot #{} at {:.2}s", shot.num, shot.time)),
            },
            Effect::StatsChanged => {
                self.log(format!("  {}", self.live.stats_line()));
            }
            Effect::StatusChanged(status) => {
                self.log(format!("status: {}", status));
            }
            Effect::PresenceChanged(presence) => {
                self.log(format!("presence: {}", presence));
            }
            Effect::TitleChanged(title) => {
                self.log(format!("title: {}", title));
            }
            Effect::SessionStopped { sess_id } => {
                self.log(format!(
                    "session {} stopped: {}",
                    sess_id.map(format_sess_id).unwrap_or_else(|| "?".into()),
                    self.live.stats_line()
                ));
            }
            Effect::Synced => {
                self.log("synced session state from server".to_string());
            }
            Effect::Note(message) => {
                self.log(message.clone());
            }
        }
    }

    async fn refresh_history(&mut self) {
        match self.pager.load_page(&self.client, true).await {
            Ok(entries) => {
                let count = entries.len();
                let more = if self.pager.has_more() {
                    " (more available)"
                } else {
                    ""
                };
                self.log(format!("history: {} session(s){}", count, more));
            }
            Err(e) => self.log(format!("history refresh failed: {}", e)),
        }
    }

    /// The delayed roster poll after a device transition. Log-only: presence
    /// stays event-driven so a slow response cannot clobber newer state.
    async fn log_roster(&mut self) {
        match self.client.status().await {
            Ok(status) => {
                for d in status.devices {
                    let link = if d.connected { "connected" } else { "disconnected" };
                    let model = d.model.as_deref().unwrap_or("unknown model");
                    self.log(format!("device {} ({}) [{}]: {}", d.name, d.address, model, link));
                }
            }
            Err(e) => tracing::debug!(error = %e, "settle poll failed"),
        }
    }

    /// Append one line to the log panel.
    fn log(&self, line: String) {
        println!("{}  {}", chrono::Local::now().format("%H:%M:%S"), line);
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
