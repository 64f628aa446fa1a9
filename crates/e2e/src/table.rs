//! The job table as seen by the poller and the cleanup loop

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;
use crate::job::JobRow;

/// Where a selector is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Anywhere on the page (first match)
    Page,
    /// Inside the n-th row of the most recent snapshot
    Row(usize),
}

/// A selector bound to a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target<'a> {
    pub scope: Scope,
    pub selector: &'a str,
}

impl<'a> Target<'a> {
    pub fn page(selector: &'a str) -> Self {
        Self { scope: Scope::Page, selector }
    }

    pub fn row(index: usize, selector: &'a str) -> Self {
        Self { scope: Scope::Row(index), selector }
    }
}

/// How to make the table re-render its rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RefreshMode {
    /// Click the table's Refresh button when it is shown
    #[default]
    Button,
    /// Leave for another tab and come back
    TabToggle { away: String, back: String },
    /// Refresh button first, then the tab round trip
    ButtonThenToggle { away: String, back: String },
}

/// Element lookups and clicks on the page under test.
#[async_trait]
pub trait Surface: Send + Sync {
    /// Whether the target becomes visible within `timeout`
    async fn is_visible(&self, target: Target<'_>, timeout: Duration) -> E2eResult<bool>;

    /// Click the target
    async fn click(&self, target: Target<'_>) -> E2eResult<()>;
}

/// A job list rendered by the application under test.
///
/// Row indices handed to [`Scope::Row`] refer to the latest [`JobTable::rows`]
/// snapshot and are invalid after any click that mutates the table.
#[async_trait]
pub trait JobTable: Surface {
    /// Re-render the job list
    async fn refresh(&self, mode: &RefreshMode) -> E2eResult<()>;

    /// Fresh snapshot of the rows, in document order
    async fn rows(&self) -> E2eResult<Vec<JobRow>>;
}
