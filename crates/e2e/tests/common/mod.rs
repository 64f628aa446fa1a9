//! In-memory job table shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use rcm_e2e::selectors::SelectorChain;
use rcm_e2e::{E2eError, E2eResult, JobRow, JobTable, RefreshMode, RowAction, Scope, Surface, Target};

pub const DELETE: &str = ".fa-trash";
pub const VIEW: &str = ".fa-eye";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Refresh,
    Snapshot,
    Start,
    Dismiss,
    Deleted(String),
    Viewed(String),
}

#[derive(Default)]
struct State {
    rows: Vec<JobRow>,
    frames: VecDeque<Vec<JobRow>>,
    events: Vec<Event>,

    deletes_work: bool,
    row_selectors: Vec<String>,
    confirm_required: bool,
    pending_delete: Option<usize>,

    conflicts: u32,
    conflict_shown: bool,

    failing_snapshots: u32,
    driver_closed: bool,
}

/// Scripted job table.
///
/// Each refresh advances to the next scripted frame, if any. Deleting a row
/// (directly or through the confirmation prompt) removes it from the table.
pub struct FakeJobTable {
    state: Mutex<State>,
}

impl FakeJobTable {
    pub fn new(rows: Vec<JobRow>) -> Self {
        Self {
            state: Mutex::new(State {
                rows,
                deletes_work: true,
                row_selectors: vec![DELETE.to_string(), VIEW.to_string()],
                ..Default::default()
            }),
        }
    }

    /// Table whose contents change on every refresh
    pub fn scripted(frames: Vec<Vec<JobRow>>) -> Self {
        let table = Self::new(Vec::new());
        table.state.lock().unwrap().frames = frames.into();
        table
    }

    /// Rows whose status changes on every refresh
    pub fn statuses(description: &str, owner: &str, statuses: &[&str]) -> Self {
        Self::scripted(
            statuses
                .iter()
                .map(|s| vec![JobRow::new(description, owner, *s)])
                .collect(),
        )
    }

    /// Delete clicks are accepted but nothing is removed
    pub fn with_broken_delete(self) -> Self {
        self.state.lock().unwrap().deletes_work = false;
        self
    }

    /// No delete control is rendered in any row
    pub fn without_delete_controls(self) -> Self {
        self.state.lock().unwrap().row_selectors.retain(|s| s != DELETE);
        self
    }

    /// No view details control is rendered in any row
    pub fn without_view_controls(self) -> Self {
        self.state.lock().unwrap().row_selectors.retain(|s| s != VIEW);
        self
    }

    /// The browser is gone: refreshes and snapshots fail for good
    pub fn with_closed_driver(self) -> Self {
        self.state.lock().unwrap().driver_closed = true;
        self
    }

    /// Deletions only take effect once the prompt is confirmed
    pub fn with_confirmation(self) -> Self {
        self.state.lock().unwrap().confirm_required = true;
        self
    }

    /// The next `n` Start clicks raise the duplicate-job dialog
    pub fn with_conflicts(self, n: u32) -> Self {
        self.state.lock().unwrap().conflicts = n;
        self
    }

    /// The next `n` snapshots fail
    pub fn with_failing_snapshots(self, n: u32) -> Self {
        self.state.lock().unwrap().failing_snapshots = n;
        self
    }

    pub fn rows_now(&self) -> Vec<JobRow> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Deleted(owner) => Some(owner),
                _ => None,
            })
            .collect()
    }

    fn remove(state: &mut State, index: usize) {
        if index < state.rows.len() {
            let row = state.rows.remove(index);
            state.events.push(Event::Deleted(row.owner));
        }
    }
}

fn is_in(chain: SelectorChain, selector: &str) -> bool {
    chain.selectors().iter().any(|s| s == selector)
}

#[async_trait]
impl Surface for FakeJobTable {
    async fn is_visible(&self, target: Target<'_>, _timeout: Duration) -> E2eResult<bool> {
        let state = self.state.lock().unwrap();
        let visible = match target.scope {
            Scope::Row(index) => index < state.rows.len() && state.row_selectors.iter().any(|s| s == target.selector),
            Scope::Page => {
                if is_in(SelectorChain::start_button(), target.selector) {
                    true
                } else if is_in(SelectorChain::conflict_indicator(), target.selector)
                    || is_in(SelectorChain::dialog_close(), target.selector)
                {
                    state.conflict_shown
                } else if is_in(SelectorChain::confirm_button(), target.selector) {
                    state.pending_delete.is_some()
                } else {
                    is_in(SelectorChain::refresh_button(), target.selector)
                }
            }
        };
        Ok(visible)
    }

    async fn click(&self, target: Target<'_>) -> E2eResult<()> {
        let mut state = self.state.lock().unwrap();
        match target.scope {
            Scope::Row(index) => {
                if index >= state.rows.len() {
                    return Err(E2eError::ElementNotFound(format!("row {}", index)));
                }
                if is_in(SelectorChain::view_details(), target.selector) {
                    let owner = state.rows[index].owner.clone();
                    state.events.push(Event::Viewed(owner));
                    return Ok(());
                }
                if !state.deletes_work {
                    return Ok(());
                }
                if state.confirm_required {
                    state.pending_delete = Some(index);
                } else {
                    Self::remove(&mut state, index);
                }
            }
            Scope::Page => {
                if is_in(SelectorChain::start_button(), target.selector) {
                    state.events.push(Event::Start);
                    if state.conflicts > 0 {
                        state.conflicts -= 1;
                        state.conflict_shown = true;
                    }
                } else if state.conflict_shown && is_in(SelectorChain::dialog_close(), target.selector) {
                    state.conflict_shown = false;
                    state.events.push(Event::Dismiss);
                } else if let Some(index) = state.pending_delete.take() {
                    Self::remove(&mut state, index);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobTable for FakeJobTable {
    async fn refresh(&self, _mode: &RefreshMode) -> E2eResult<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Refresh);
        if state.driver_closed {
            return Err(E2eError::DriverClosed);
        }
        if let Some(frame) = state.frames.pop_front() {
            state.rows = frame;
        }
        Ok(())
    }

    async fn rows(&self) -> E2eResult<Vec<JobRow>> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Snapshot);
        if state.driver_closed {
            return Err(E2eError::DriverClosed);
        }
        if state.failing_snapshots > 0 {
            state.failing_snapshots -= 1;
            return Err(E2eError::Timeout("table tbody tr".into()));
        }
        Ok(state.rows.clone())
    }
}

/// Finished post-charge row owned by `owner`
pub fn post_charge_row(owner: &str) -> JobRow {
    JobRow::new("Services from 09/01/2025 through 09/30/2025", owner, "Charges to post: 3")
        .with_actions([RowAction::View, RowAction::Delete])
}

/// Finished claim-generation row owned by `owner`
pub fn claim_row(owner: &str) -> JobRow {
    JobRow::new("Create Claims - Medicare", owner, "Clean claims: 7")
        .with_actions([RowAction::View])
}
