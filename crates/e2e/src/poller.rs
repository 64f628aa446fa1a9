//! Job completion polling
//!
//! The application has no push channel for batch jobs, so completion is
//! inferred by refreshing the job table and sampling the matched row.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::job::{first_match, owner_filter, JobKind, JobRow, RowAction, IN_PROGRESS_PHRASE};
use crate::retry::{poll_until, Attempt, PollBudget, PollOutcome};
use crate::table::{JobTable, RefreshMode};

/// What to do when the budget runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Report `false` and let the caller decide
    Soft,
    /// Abort with [`E2eError::JobTimeout`]
    Hard,
}

/// Observable cue that a job has finished, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    /// View/Delete/Export controls are rendered on the row
    ActionsAvailable,
    /// Status shows a terminal phrase and is no longer running
    StatusConcluded,
    /// Status no longer shows the in-progress phrase
    NotRunning,
}

/// Which row to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobQuery {
    /// Fragment of the row text
    pub description: String,
    /// "Requested By" fragment
    pub owner: Option<String>,
}

impl JobQuery {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            owner: None,
        }
    }

    /// Restrict to rows requested by `owner`. A blank owner leaves the query unfiltered.
    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        let owner = owner.into();
        self.owner = owner_filter(Some(&owner)).map(String::from);
        self
    }

    /// Effective owner filter (blank counts as none)
    pub fn owner_filter(&self) -> Option<&str> {
        owner_filter(self.owner.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerConfig {
    pub budget: PollBudget,

    #[serde(default)]
    pub refresh: RefreshMode,

    /// Pause after each refresh before reading the table
    pub settle_ms: u64,

    pub terminal_phrases: Vec<String>,

    #[serde(default = "default_in_progress_phrase")]
    pub in_progress_phrase: String,

    pub completion_actions: BTreeSet<RowAction>,
}

fn default_in_progress_phrase() -> String {
    IN_PROGRESS_PHRASE.to_string()
}

impl PollerConfig {
    pub fn for_kind(kind: JobKind) -> Self {
        let (budget, refresh) = match kind {
            JobKind::PostCharges => (
                PollBudget::attempts(20, Duration::from_secs(5)),
                RefreshMode::ButtonThenToggle {
                    away: "Quick Claims".into(),
                    back: "Post Charges".into(),
                },
            ),
            JobKind::ClaimGeneration => (
                PollBudget::duration(Duration::from_secs(300), Duration::from_secs(15)),
                RefreshMode::Button,
            ),
        };

        Self {
            budget,
            refresh,
            settle_ms: 2000,
            terminal_phrases: kind.terminal_phrases().iter().map(|s| s.to_string()).collect(),
            in_progress_phrase: default_in_progress_phrase(),
            completion_actions: RowAction::ALL.into_iter().collect(),
        }
    }

    pub fn with_budget(mut self, budget: PollBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Completion signal shown by `row`, if any.
    ///
    /// The weak [`CompletionSignal::NotRunning`] fallback is only honoured
    /// when no owner filter is in play, and never for a blank status.
    pub fn evaluate(&self, row: &JobRow, owner_filtered: bool) -> Option<CompletionSignal> {
        if row.has_any_action(&self.completion_actions) {
            return Some(CompletionSignal::ActionsAvailable);
        }

        let running = row.status.contains(&self.in_progress_phrase);
        if !running && self.terminal_phrases.iter().any(|p| row.status.contains(p.as_str())) {
            return Some(CompletionSignal::StatusConcluded);
        }

        if !owner_filtered && !running && !row.status.trim().is_empty() {
            return Some(CompletionSignal::NotRunning);
        }

        None
    }
}

/// Samples the job table until a job shows a completion signal.
pub struct JobCompletionPoller<'a, T: JobTable + ?Sized> {
    table: &'a T,
    config: PollerConfig,
}

impl<'a, T: JobTable + ?Sized> JobCompletionPoller<'a, T> {
    pub fn new(table: &'a T, config: PollerConfig) -> Self {
        Self { table, config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Wait until the job matching `query` completes.
    ///
    /// Returns `Ok(true)` on completion. On exhaustion returns `Ok(false)`
    /// under [`TimeoutPolicy::Soft`] and an error under [`TimeoutPolicy::Hard`].
    pub async fn wait_for_completion(&self, query: &JobQuery, policy: TimeoutPolicy) -> E2eResult<bool> {
        self.config.budget.validate()?;

        info!(
            "Waiting for job '{}'{} to complete",
            query.description,
            query.owner_filter().map(|o| format!(" (requested by {})", o)).unwrap_or_default()
        );

        let outcome = poll_until(&self.config.budget, "job completion", |_| async move {
            match self.check_once(query).await {
                Ok(Some(signal)) => Attempt::Done(Ok(signal)),
                Ok(None) => Attempt::Retry,
                Err(e) => Attempt::Done(Err(e)),
            }
        })
        .await;

        match outcome {
            PollOutcome::Completed { value: Ok(signal), attempts } => {
                info!(
                    "Job '{}' completed ({:?}) after {} attempt(s)",
                    query.description, signal, attempts
                );
                Ok(true)
            }
            PollOutcome::Completed { value: Err(e), attempts } => {
                error!("Polling job '{}' aborted on attempt {}: {}", query.description, attempts, e);
                Err(e)
            }
            PollOutcome::Exhausted { attempts, elapsed } => match policy {
                TimeoutPolicy::Soft => {
                    warn!(
                        "Job '{}' still not complete after {} attempt(s) - proceeding anyway",
                        query.description, attempts
                    );
                    Ok(false)
                }
                TimeoutPolicy::Hard => {
                    error!(
                        "Job '{}' did not complete within {} attempt(s)",
                        query.description, attempts
                    );
                    Err(E2eError::JobTimeout {
                        description: query.description.clone(),
                        attempts,
                        elapsed_ms: elapsed.as_millis() as u64,
                    })
                }
            },
        }
    }

    /// One refresh-settle-scan round.
    ///
    /// Transient lookup failures count as "not yet"; anything else (a dead
    /// driver, broken IO) is returned.
    pub async fn check_once(&self, query: &JobQuery) -> E2eResult<Option<CompletionSignal>> {
        if let Err(e) = self.table.refresh(&self.config.refresh).await {
            if !e.is_transient() {
                return Err(e);
            }
            debug!("Refresh failed: {}", e);
        }
        tokio::time::sleep(self.config.settle()).await;

        let rows = match self.table.rows().await {
            Ok(rows) => rows,
            Err(e) if e.is_transient() => {
                debug!("Could not read job rows: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let owner = query.owner_filter();
        let Some((index, row)) = first_match(&rows, &query.description, owner) else {
            debug!("No row matches '{}' yet", query.description);
            return Ok(None);
        };

        let signal = self.config.evaluate(row, owner.is_some());
        match signal {
            Some(s) => debug!("Row {} shows {:?}: {}", index, s, row.summary()),
            None => debug!("Job still in progress: {}", row.status.trim()),
        }
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PollerConfig {
        PollerConfig::for_kind(JobKind::ClaimGeneration)
    }

    #[test]
    fn test_actions_take_precedence() {
        let row = JobRow::new("Create Claims", "alice", IN_PROGRESS_PHRASE).with_actions([RowAction::View]);
        assert_eq!(config().evaluate(&row, true), Some(CompletionSignal::ActionsAvailable));
    }

    #[test]
    fn test_terminal_phrase_requires_not_running() {
        let done = JobRow::new("Create Claims", "alice", "Clean claims: 7");
        assert_eq!(config().evaluate(&done, true), Some(CompletionSignal::StatusConcluded));

        let mixed = JobRow::new("Create Claims", "alice", "Completed / Running in a batch job");
        assert_eq!(config().evaluate(&mixed, true), None);
    }

    #[test]
    fn test_fallback_only_without_owner_filter() {
        let row = JobRow::new("Create Claims", "alice", "Errors: 2");
        assert_eq!(config().evaluate(&row, false), Some(CompletionSignal::NotRunning));
        assert_eq!(config().evaluate(&row, true), None);
    }

    #[test]
    fn test_blank_owner_query_is_unfiltered() {
        assert_eq!(JobQuery::new("Create Claims").owned_by("  ").owner_filter(), None);
        assert_eq!(JobQuery::new("Create Claims").owned_by(" bob ").owner_filter(), Some("bob"));
    }

    #[test]
    fn test_blank_status_is_not_completion() {
        let row = JobRow::new("Create Claims", "alice", "   ");
        assert_eq!(config().evaluate(&row, false), None);
    }
}
