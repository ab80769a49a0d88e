//! Paginated session history and the per-session export parser.
//!
//! The pager keeps a monotonically increasing offset cursor into
//! `GET /sessions` and grows its displayed list page by page. Exhaustion is a
//! heuristic: a full page means "more may exist", so a library whose total is
//! an exact multiple of the page size costs one trailing empty fetch, the
//! accepted trade for not needing a count endpoint.

use serde::Serialize;

use crate::client::{ClientError, ServerClient, SessionSummary};

/// One parsed `SHOT_DETECTED` row of a session export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShotRecord {
    pub num: u32,
    pub time: f64,
    /// Interval to the previous shot; the export leaves it empty for shot #1.
    pub split: Option<f64>,
}

/// An expanded summary's detail, shown inline under its list entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Expanded {
    pub sess_id: u64,
    pub shots: Vec<ShotRecord>,
}

/// Cursor-based pager over recorded sessions.
#[derive(Debug)]
pub struct HistoryPager {
    page_size: usize,
    offset: usize,
    entries: Vec<SessionSummary>,
    has_more: bool,
    expanded: Option<Expanded>,
}

impl HistoryPager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            offset: 0,
            entries: Vec::new(),
            has_more: false,
            expanded: None,
        }
    }

    /// The displayed list, in server order. Never re-sorted client-side.
    pub fn entries(&self) -> &[SessionSummary] {
        &self.entries
    }

    /// Whether a "load more" affordance should be offered.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn expanded(&self) -> Option<&Expanded> {
        self.expanded.as_ref()
    }

    /// Fetch the next page (or the first, when `reset`) and fold it into the
    /// displayed list, returning the full list. On `reset` the list is
    /// cleared before the fetch, so a failed refresh leaves it empty rather
    /// than stale.
    pub async fn load_page(
        &mut self,
        client: &ServerClient,
        reset: bool,
    ) -> Result<&[SessionSummary], ClientError> {
        self.begin(reset);
        let page = client.sessions(self.offset, self.page_size).await?;
        self.apply_page(page);
        Ok(&self.entries)
    }

    /// Expand a summary's shot detail, or collapse it if it is the one
    /// already expanded. Expanding one summary collapses any other.
    pub async fn toggle_detail(
        &mut self,
        client: &ServerClient,
        sess_id: u64,
    ) -> Result<Option<&Expanded>, ClientError> {
        if self.expanded.as_ref().is_some_and(|e| e.sess_id == sess_id) {
            self.expanded = None;
            return Ok(None);
        }
        let text = client.download(sess_id).await?;
        self.expanded = Some(Expanded {
            sess_id,
            shots: parse_export(&text),
        });
        Ok(self.expanded.as_ref())
    }

    fn begin(&mut self, reset: bool) {
        if reset {
            self.offset = 0;
            self.entries.clear();
            self.has_more = false;
            self.expanded = None;
        }
    }

    fn apply_page(&mut self, page: Vec<SessionSummary>) {
        self.offset += page.len();
        self.has_more = page.len() == self.page_size;
        self.entries.extend(page);
    }
}

/// Parse the line-oriented session export: a header line, then comma-separated
/// rows whose first field is a record-type tag. Only `SHOT_DETECTED` rows are
/// kept; rows with unparsable numerics are skipped.
pub fn parse_export(text: &str) -> Vec<ShotRecord> {
    text.lines().skip(1).filter_map(parse_row).collect()
}

fn parse_row(line: &str) -> Option<ShotRecord> {
    let mut fields = line.split(',');
    if fields.next()?.trim() != "SHOT_DETECTED" {
        return None;
    }
    let num = fields.next()?.trim().parse().ok()?;
    let time = fields.next()?.trim().parse().ok()?;
    let split_field = fields.next().map(str::trim).unwrap_or("");
    let split = if split_field.is_empty() {
        None
    } else {
        Some(split_field.parse().ok()?)
    };
    Some(ShotRecord { num, time, split })
}

/// Render a session id for display. Ids are Unix timestamps in seconds; one
/// that doesn't map to a plausible date is shown raw.
pub fn format_sess_id(sess_id: u64) -> String {
    chrono::DateTime::from_timestamp(sess_id as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| sess_id.to_string())
}
