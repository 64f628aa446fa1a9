//! Bulk deletion of stale jobs before a new one is started
//!
//! Deleting a row re-renders the table, so every deletion is followed by a
//! fresh snapshot; row indices never outlive the scan that produced them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::job::{owner_filter, JobKind, JobRow};
use crate::retry::{PollBudget, PollState};
use crate::selectors::SelectorChain;
use crate::table::{JobTable, RefreshMode, Scope, Target};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Only rows of this kind are ever deleted
    pub kind: JobKind,

    /// Upper bound on delete-and-rescan rounds
    pub max_iterations: u32,

    /// Refresh before every snapshot (`None` = read the table as is)
    #[serde(default)]
    pub refresh: Option<RefreshMode>,

    pub delete: SelectorChain,
    pub confirm: SelectorChain,

    /// How long to look for a row's delete control
    pub lookup_timeout_ms: u64,

    /// How long to wait for the confirmation prompt
    pub confirm_timeout_ms: u64,

    /// Pause after each click
    pub click_pause_ms: u64,

    /// Pause between rounds
    pub iteration_pause_ms: u64,
}

impl CleanupConfig {
    pub fn for_kind(kind: JobKind) -> Self {
        Self {
            kind,
            max_iterations: 10,
            refresh: Some(RefreshMode::Button),
            delete: SelectorChain::delete_button(),
            confirm: SelectorChain::confirm_button(),
            lookup_timeout_ms: 2000,
            confirm_timeout_ms: 3000,
            click_pause_ms: 1000,
            iteration_pause_ms: 1000,
        }
    }

    /// Settings used after a duplicate-job conflict: always refresh, wider
    /// delete selectors, longer waits.
    pub fn aggressive(mut self) -> Self {
        self.refresh.get_or_insert(RefreshMode::Button);

        let mut delete = self.delete.selectors().to_vec();
        for extra in [".delete-action", r#"[class*="delete"]"#] {
            if !delete.iter().any(|s| s == extra) {
                delete.push(extra.to_string());
            }
        }
        self.delete = SelectorChain::new(delete);

        self.lookup_timeout_ms = self.lookup_timeout_ms.max(5000);
        self.confirm_timeout_ms = self.confirm_timeout_ms.max(5000);
        self.iteration_pause_ms = self.iteration_pause_ms.max(2000);
        self
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.max_iterations == 0 {
            return Err(E2eError::InvalidConfig(format!(
                "{} cleanup: max_iterations must be at least 1",
                self.kind
            )));
        }
        Ok(())
    }

    fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    fn click_pause(&self) -> Duration {
        Duration::from_millis(self.click_pause_ms)
    }
}

/// Deletes every job of one kind requested by one user.
pub struct JobCleanup<'a, T: JobTable + ?Sized> {
    table: &'a T,
    config: CleanupConfig,
}

impl<'a, T: JobTable + ?Sized> JobCleanup<'a, T> {
    pub fn new(table: &'a T, config: CleanupConfig) -> Self {
        Self { table, config }
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.config
    }

    /// Delete all jobs of the configured kind whose owner contains `owner`.
    ///
    /// Without an owner filter (or with a blank one) nothing is deleted.
    /// Failures are logged and end the cleanup early; they never propagate.
    pub async fn delete_all_matching(&self, owner: Option<&str>) -> usize {
        let Some(owner) = owner_filter(owner) else {
            info!("No owner filter given - skipping {} job cleanup", self.config.kind);
            return 0;
        };

        if let Err(e) = self.config.validate() {
            error!("Skipping cleanup: {}", e);
            return 0;
        }

        info!("Deleting old {} jobs for user: {}", self.config.kind, owner);

        let budget = PollBudget::attempts(
            self.config.max_iterations,
            Duration::from_millis(self.config.iteration_pause_ms),
        );
        let mut state = PollState::start(&budget);
        let mut deleted = 0;
        let mut drained = false;

        while let Some(iteration) = state.next_attempt() {
            debug!("Deletion attempt {}/{}", iteration, state.limit());

            if let Some(mode) = &self.config.refresh {
                if let Err(e) = self.table.refresh(mode).await {
                    if !e.is_transient() {
                        error!("Aborting {} job cleanup: {}", self.config.kind, e);
                        drained = true;
                        break;
                    }
                    debug!("Refresh failed: {}", e);
                }
            }

            let rows = match self.table.rows().await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("Could not read job rows: {}", e);
                    drained = true;
                    break;
                }
            };

            match self.delete_first_match(&rows, owner).await {
                Scan::Deleted => deleted += 1,
                Scan::NothingLeft => {
                    debug!("No more {} jobs to delete", self.config.kind);
                    drained = true;
                    break;
                }
                Scan::Aborted(e) => {
                    error!("Aborting {} job cleanup: {}", self.config.kind, e);
                    drained = true;
                    break;
                }
            }

            if state.is_last() {
                break;
            }
            tokio::time::sleep(budget.interval()).await;
        }

        if !drained {
            warn!(
                "Stopped {} job cleanup after {} attempts - jobs may remain",
                self.config.kind,
                state.attempts()
            );
        }

        if deleted > 0 {
            info!("Deleted {} old {} job(s) for user: {}", deleted, self.config.kind, owner);
        } else {
            info!("No {} jobs found for user: {}", self.config.kind, owner);
        }

        deleted
    }

    /// Delete the first eligible row of this snapshot. After
    /// [`Scan::Deleted`] `rows` is stale.
    async fn delete_first_match(&self, rows: &[JobRow], owner: &str) -> Scan {
        for (index, row) in rows.iter().enumerate() {
            if !self.config.kind.classifies(row) {
                continue;
            }
            if !row.owned_by(owner) {
                debug!("Skipping job not requested by {}: {}", owner, row.owner.trim());
                continue;
            }

            info!("Found job to delete: {}", row.summary());

            let Some(selector) = self
                .config
                .delete
                .first_visible(self.table, Scope::Row(index), self.config.lookup_timeout())
                .await
            else {
                warn!("Could not find delete button for job: {}", row.summary());
                continue;
            };

            if let Err(e) = self.table.click(Target::row(index, selector)).await {
                if !e.is_transient() {
                    return Scan::Aborted(e);
                }
                warn!("Error deleting job: {}", e);
                continue;
            }
            tokio::time::sleep(self.config.click_pause()).await;

            match self
                .config
                .confirm
                .first_visible(self.table, Scope::Page, self.config.confirm_timeout())
                .await
            {
                Some(confirm) => match self.table.click(Target::page(confirm)).await {
                    Ok(()) => {
                        debug!("Confirmed deletion");
                        tokio::time::sleep(self.config.click_pause()).await;
                    }
                    Err(e) => warn!("Could not confirm deletion: {}", e),
                },
                None => debug!("No confirmation prompt shown"),
            }

            return Scan::Deleted;
        }

        Scan::NothingLeft
    }
}

enum Scan {
    Deleted,
    NothingLeft,
    Aborted(E2eError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggressive_widens_delete_chain_once() {
        let config = CleanupConfig::for_kind(JobKind::PostCharges).aggressive().aggressive();
        let selectors = config.delete.selectors();
        assert_eq!(selectors.len(), 7);
        assert_eq!(selectors[0], r#"button[title*="Delete"]"#);
        assert!(config.lookup_timeout_ms >= 5000);
    }

    #[test]
    fn test_zero_iterations_is_rejected() {
        let mut config = CleanupConfig::for_kind(JobKind::PostCharges);
        assert!(config.validate().is_ok());
        config.max_iterations = 0;
        assert!(matches!(config.validate(), Err(E2eError::InvalidConfig(_))));
    }

    #[test]
    fn test_aggressive_forces_refresh() {
        let mut config = CleanupConfig::for_kind(JobKind::ClaimGeneration);
        config.refresh = None;
        assert_eq!(config.aggressive().refresh, Some(RefreshMode::Button));
    }
}
