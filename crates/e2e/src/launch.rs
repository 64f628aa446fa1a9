//! Starting a batch job, with one retry after a duplicate-job conflict

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cleanup::{CleanupConfig, JobCleanup};
use crate::error::{E2eError, E2eResult};
use crate::selectors::SelectorChain;
use crate::table::{JobTable, Scope, Target};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub start: SelectorChain,

    /// Error dialog shown for a duplicate job
    pub conflict: SelectorChain,

    /// Buttons closing the error dialog
    pub dismiss: SelectorChain,

    pub start_timeout_ms: u64,
    pub conflict_timeout_ms: u64,

    /// Pause after each click
    pub settle_ms: u64,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            start: SelectorChain::start_button(),
            conflict: SelectorChain::conflict_indicator(),
            dismiss: SelectorChain::dialog_close(),
            start_timeout_ms: 5000,
            conflict_timeout_ms: 3000,
            settle_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LaunchOutcome {
    /// No conflict was reported
    Started,
    /// Conflict cleared by an aggressive cleanup and a second start
    StartedAfterConflict { deleted: usize },
    /// The second start reported the conflict again
    ConflictPersisted { deleted: usize },
}

pub struct JobLauncher<'a, T: JobTable + ?Sized> {
    table: &'a T,
    config: LaunchConfig,
}

impl<'a, T: JobTable + ?Sized> JobLauncher<'a, T> {
    pub fn new(table: &'a T, config: LaunchConfig) -> Self {
        Self { table, config }
    }

    /// Click Start. If the duplicate-job dialog appears, dismiss it, delete
    /// the owner's jobs with [`CleanupConfig::aggressive`] settings and click
    /// Start exactly once more.
    pub async fn start(&self, cleanup: &CleanupConfig, owner: Option<&str>) -> E2eResult<LaunchOutcome> {
        info!("Starting {} job", cleanup.kind);
        self.click_start().await?;

        if !self.conflict_shown().await {
            info!("{} job started", cleanup.kind);
            return Ok(LaunchOutcome::Started);
        }

        warn!("Duplicate job error detected - performing additional cleanup");
        self.dismiss_dialog().await;

        let deleted = JobCleanup::new(self.table, cleanup.clone().aggressive())
            .delete_all_matching(owner)
            .await;
        tokio::time::sleep(self.settle()).await;

        info!("Retrying job creation after aggressive cleanup");
        self.click_start().await?;

        if self.conflict_shown().await {
            warn!("Duplicate job error persists after retry");
            self.dismiss_dialog().await;
            return Ok(LaunchOutcome::ConflictPersisted { deleted });
        }

        info!("{} job started after removing {} duplicate(s)", cleanup.kind, deleted);
        Ok(LaunchOutcome::StartedAfterConflict { deleted })
    }

    async fn click_start(&self) -> E2eResult<()> {
        let timeout = Duration::from_millis(self.config.start_timeout_ms);
        let selector = self
            .config
            .start
            .first_visible(self.table, Scope::Page, timeout)
            .await
            .ok_or_else(|| E2eError::ElementNotFound("Start button".into()))?;

        self.table.click(Target::page(selector)).await?;
        tokio::time::sleep(self.settle()).await;
        Ok(())
    }

    async fn conflict_shown(&self) -> bool {
        let timeout = Duration::from_millis(self.config.conflict_timeout_ms);
        self.config
            .conflict
            .first_visible(self.table, Scope::Page, timeout)
            .await
            .is_some()
    }

    async fn dismiss_dialog(&self) {
        let timeout = Duration::from_millis(self.config.conflict_timeout_ms);
        let Some(selector) = self.config.dismiss.first_visible(self.table, Scope::Page, timeout).await else {
            warn!("No close button found on the error dialog");
            return;
        };

        if let Err(e) = self.table.click(Target::page(selector)).await {
            warn!("Could not close error dialog: {}", e);
            return;
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }

    fn settle(&self) -> Duration {
        Duration::from_millis(self.config.settle_ms)
    }
}
