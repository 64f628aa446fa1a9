//! End-to-end billing workflows
//!
//! Each workflow clears the user's stale jobs, starts a new one with
//! duplicate-job compensation and waits for it to finish.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::cleanup::JobCleanup;
use crate::config::EnvConfig;
use crate::dates;
use crate::details::open_recent_job;
use crate::error::E2eResult;
use crate::job::{charges_to_post_count, clean_claims_count, first_match, ClaimStatistics, JobKind};
use crate::launch::{JobLauncher, LaunchOutcome};
use crate::pages::{ClaimFilters, JobsPage};
use crate::playwright::PlaywrightSession;
use crate::selectors::SelectorChain;
use crate::poller::{JobCompletionPoller, JobQuery, TimeoutPolicy};
use crate::table::JobTable;

/// Row text shared by post-charge and claim-generation jobs
pub const SERVICES_MARKER: &str = "Services through";

/// Pause between a successful start and the first completion check
const START_GRACE: Duration = Duration::from_secs(3);

/// Time for a job detail view to render
const DETAILS_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize)]
pub struct PostChargesReport {
    pub entity: String,
    pub services_from: String,
    pub services_through: String,
    pub deleted: usize,
    pub launch: LaunchOutcome,
    pub completed: bool,
    pub charges_to_post: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimsReport {
    pub filters: ClaimFilters,
    pub deleted: usize,
    pub launch: LaunchOutcome,
    pub completed: bool,
    pub clean_claims: Option<u32>,
    pub details_opened: bool,
    pub statistics: Option<ClaimStatistics>,
}

pub struct Workflows<'s> {
    session: &'s PlaywrightSession,
    config: &'s EnvConfig,
}

impl<'s> Workflows<'s> {
    pub fn new(session: &'s PlaywrightSession, config: &'s EnvConfig) -> Self {
        Self { session, config }
    }

    fn page(&self) -> JobsPage<'s> {
        JobsPage::new(self.session, self.config.table.clone())
    }

    async fn open(&self, kind: JobKind) -> E2eResult<JobsPage<'s>> {
        let page = self.page();
        page.open(self.config.modules.for_kind(kind)).await?;
        Ok(page)
    }

    /// Delete the owner's jobs of one kind
    pub async fn cleanup(&self, kind: JobKind, owner: Option<&str>) -> E2eResult<usize> {
        let page = self.open(kind).await?;
        let cleanup = self.config.jobs.get(kind).cleanup.clone();
        Ok(JobCleanup::new(&page, cleanup).delete_all_matching(owner).await)
    }

    /// Wait for a job of one kind that is already running
    pub async fn wait_for_job(&self, kind: JobKind, query: &JobQuery, policy: TimeoutPolicy) -> E2eResult<bool> {
        let page = self.open(kind).await?;
        let poller = self.config.jobs.get(kind).poller.clone();
        JobCompletionPoller::new(&page, poller)
            .wait_for_completion(query, policy)
            .await
    }

    /// Post charges for one entity over a whole month.
    ///
    /// `month_offset` is relative to the current month (`-1` = previous).
    pub async fn post_charges(&self, entity: &str, month_offset: i32, owner: Option<&str>) -> E2eResult<PostChargesReport> {
        let kind = JobKind::PostCharges;
        let profile = self.config.jobs.get(kind);
        let page = self.open(kind).await?;

        let deleted = JobCleanup::new(&page, profile.cleanup.clone())
            .delete_all_matching(owner)
            .await;

        let services_from = dates::first_date_of_month_with_offset(month_offset);
        let services_through = dates::last_date_of_month_with_offset(month_offset);
        info!("Service dates: {} - {}", services_from, services_through);

        let form = &self.config.post_charges_form;
        page.set_service_dates(form, &services_from, &services_through).await?;
        page.select_entity(form, entity).await?;

        let launch = JobLauncher::new(&page, self.config.launch.clone())
            .start(&profile.cleanup, owner)
            .await?;
        if let LaunchOutcome::ConflictPersisted { .. } = launch {
            warn!("Post charge job may not have started - waiting anyway");
        }
        tokio::time::sleep(START_GRACE).await;

        let query = JobQuery::new(SERVICES_MARKER);
        let completed = JobCompletionPoller::new(&page, profile.poller.clone())
            .wait_for_completion(&query, TimeoutPolicy::Soft)
            .await?;

        let charges_to_post = status_of(&page, &query).await.as_deref().and_then(charges_to_post_count);

        Ok(PostChargesReport {
            entity: entity.to_string(),
            services_from,
            services_through,
            deleted,
            launch,
            completed,
            charges_to_post,
        })
    }

    /// Run claim generation with `filters` and report the clean-claims count.
    ///
    /// Once the job completes, its detail view is opened and the claim
    /// totals are read back.
    pub async fn generate_claims(&self, filters: &ClaimFilters, owner: Option<&str>) -> E2eResult<ClaimsReport> {
        let kind = JobKind::ClaimGeneration;
        let profile = self.config.jobs.get(kind);
        let page = self.open(kind).await?;

        let deleted = JobCleanup::new(&page, profile.cleanup.clone())
            .delete_all_matching(owner)
            .await;

        page.configure_claim_filters(&self.config.claim_filters_form, filters)
            .await?;

        let launch = JobLauncher::new(&page, self.config.launch.clone())
            .start(&profile.cleanup, owner)
            .await?;
        tokio::time::sleep(START_GRACE).await;

        let mut query = JobQuery::new(SERVICES_MARKER);
        if let Some(owner) = owner {
            query = query.owned_by(owner);
        }

        let completed = JobCompletionPoller::new(&page, profile.poller.clone())
            .wait_for_completion(&query, TimeoutPolicy::Soft)
            .await?;

        let clean_claims = status_of(&page, &query).await.as_deref().and_then(clean_claims_count);
        match clean_claims {
            Some(n) => info!("Clean claims: {}", n),
            None => info!("No clean-claims count shown"),
        }

        let timeout = Duration::from_millis(self.session.config().action_timeout_ms);
        let details_opened = completed
            && open_recent_job(&page, kind, owner, &SelectorChain::view_details(), timeout).await?;

        let statistics = if details_opened {
            tokio::time::sleep(DETAILS_GRACE).await;
            match page.read_claim_statistics(&self.config.claim_filters_form).await {
                Ok(stats) if !stats.is_empty() => Some(stats),
                Ok(_) => {
                    info!("No claim statistics shown");
                    None
                }
                Err(e) if e.is_transient() => {
                    warn!("Could not read claim statistics: {}", e);
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        Ok(ClaimsReport {
            filters: filters.clone(),
            deleted,
            launch,
            completed,
            clean_claims,
            details_opened,
            statistics,
        })
    }
}

/// Status text of the row matching `query` in a fresh snapshot
pub async fn status_of<T: JobTable + ?Sized>(table: &T, query: &JobQuery) -> Option<String> {
    let rows = table.rows().await.ok()?;
    first_match(&rows, &query.description, query.owner_filter()).map(|(_, row)| row.status.clone())
}
