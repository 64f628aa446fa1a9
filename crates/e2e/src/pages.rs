//! RCM screens that list batch jobs
//!
//! [`JobsPage`] adapts a [`PlaywrightSession`] to the [`JobTable`] seam and
//! carries the form steps of the Post Charges screen.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};
use crate::job::{ClaimStatistics, JobRow, RowAction};
use crate::playwright::{Locate, PlaywrightSession, RawRow, DEFAULT_ROW_SELECTOR};
use crate::selectors::SelectorChain;
use crate::table::{JobTable, RefreshMode, Scope, Surface, Target};

/// Where the job fields live inside a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    pub row_selector: String,
    pub description_column: usize,
    pub owner_column: usize,
    pub requested_on_column: usize,
    pub status_column: usize,

    /// Selector per row control; presence marks a finished job
    pub actions: BTreeMap<RowAction, String>,

    pub refresh: SelectorChain,
    pub refresh_timeout_ms: u64,

    /// Pause after each tab click of a tab-toggle refresh
    pub tab_pause_ms: u64,
}

impl Default for TableLayout {
    fn default() -> Self {
        let actions = [
            (RowAction::View, r#"button[title*="View"], a[title*="View"], .fa-eye"#),
            (RowAction::Delete, r#"button[title*="Delete"], a[title*="Delete"], .fa-trash"#),
            (RowAction::Export, r#"button[title*="Export"], a[title*="Export"], .fa-download"#),
        ]
        .into_iter()
        .map(|(action, selector)| (action, selector.to_string()))
        .collect();

        Self {
            row_selector: DEFAULT_ROW_SELECTOR.to_string(),
            description_column: 0,
            owner_column: 1,
            requested_on_column: 2,
            status_column: 3,
            actions,
            refresh: SelectorChain::refresh_button(),
            refresh_timeout_ms: 2000,
            tab_pause_ms: 1000,
        }
    }
}

impl TableLayout {
    /// Map a raw driver row onto job fields. Missing cells read as empty.
    pub fn to_job_row(&self, raw: RawRow) -> JobRow {
        let cell = |index: usize| raw.cells.get(index).map(|c| c.trim().to_string()).unwrap_or_default();

        JobRow {
            description: cell(self.description_column),
            owner: cell(self.owner_column),
            requested_on: cell(self.requested_on_column),
            status: cell(self.status_column),
            actions: raw.actions.iter().copied().collect(),
            text: raw.text.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

/// Post Charges form controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostChargesForm {
    pub services_from: String,
    pub services_through: String,
    pub entity_picker: String,
    pub entity_search: SelectorChain,
}

impl Default for PostChargesForm {
    fn default() -> Self {
        Self {
            services_from: r#"input[placeholder="mm/dd/yyyy"] >> nth=0"#.to_string(),
            services_through: r#"input[placeholder="mm/dd/yyyy"] >> nth=1"#.to_string(),
            entity_picker: r#"a:has-text("-- Select an Entity --")"#.to_string(),
            entity_search: SelectorChain::new([
                ".chosen-search input",
                ".select2-search input",
                r#"input[type="search"]"#,
            ]),
        }
    }
}

/// Claim Generation filter values. Unset fields leave the form untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimFilters {
    /// MM/DD/YYYY
    pub services_from: Option<String>,
    /// MM/DD/YYYY
    pub services_through: Option<String>,
    pub division: Option<String>,
    pub region: Option<String>,
    pub area: Option<String>,
    pub entity: Option<String>,
    pub paying_agency: Option<String>,
    pub plan: Option<String>,
    pub job_limit: Option<u32>,
    pub require_month_end_close: Option<bool>,
    pub require_all_charges_posted: Option<bool>,
}

/// Claim Generation form controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimFiltersForm {
    pub services_from: String,
    pub services_through: String,
    pub division: String,
    pub region: String,
    pub area: String,
    pub entity: String,
    pub paying_agency: String,
    pub plan: String,
    pub job_limit: String,
    pub require_month_end_close: String,
    pub require_all_charges_posted: String,

    /// Element whose text carries the claim totals once details are open
    pub statistics_container: String,
}

impl Default for ClaimFiltersForm {
    fn default() -> Self {
        Self {
            services_from: r#"input[name*="ServicesFrom"], input[id*="from"]"#.to_string(),
            services_through: r#"input[name*="ServicesThrough"], input[id*="through"]"#.to_string(),
            division: r#"select[name*="Division"], #division"#.to_string(),
            region: r#"select[name*="Region"], #region"#.to_string(),
            area: r#"select[name*="Area"], #area"#.to_string(),
            entity: r#"select[name*="Entity"], #entity"#.to_string(),
            paying_agency: r#"select[name*="PayingAgency"], select[name*="Payer"]"#.to_string(),
            plan: r#"select[name*="Plan"], select[name*="PayerPlan"]"#.to_string(),
            job_limit: r#"select[name*="JobLimit"], select[name*="Limit"]"#.to_string(),
            require_month_end_close: r#"input[type="checkbox"][name*="MonthEnd"]"#.to_string(),
            require_all_charges_posted: r#"input[type="checkbox"][name*="AllCharges"]"#.to_string(),
            statistics_container: "#applicationHost".to_string(),
        }
    }
}

/// A screen whose main content is a job table
pub struct JobsPage<'s> {
    session: &'s PlaywrightSession,
    layout: TableLayout,
}

impl<'s> JobsPage<'s> {
    pub fn new(session: &'s PlaywrightSession, layout: TableLayout) -> Self {
        Self { session, layout }
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    pub fn session(&self) -> &PlaywrightSession {
        self.session
    }

    /// Navigate to a screen path and wait for the application host
    pub async fn open(&self, path: &str) -> E2eResult<()> {
        info!("Opening {}", path);
        self.session.goto(path).await?;
        self.session
            .wait_for(
                Locate::page("#applicationHost"),
                "visible",
                Duration::from_millis(self.session.config().navigation_timeout_ms),
            )
            .await?;
        tokio::time::sleep(Duration::from_millis(2000)).await;
        Ok(())
    }

    /// Fill the Services From / Services Through dates (MM/DD/YYYY)
    pub async fn set_service_dates(&self, form: &PostChargesForm, from: &str, through: &str) -> E2eResult<()> {
        debug!("Service dates: {} - {}", from, through);
        self.session.fill(Locate::page(&form.services_from), from).await?;
        self.session.fill(Locate::page(&form.services_through), through).await?;
        Ok(())
    }

    /// Pick an entity from the searchable entity dropdown
    pub async fn select_entity(&self, form: &PostChargesForm, entity: &str) -> E2eResult<()> {
        debug!("Selecting entity: {}", entity);
        self.session.click(Locate::page(&form.entity_picker)).await?;

        let timeout = Duration::from_millis(self.session.config().action_timeout_ms);
        let search = form
            .entity_search
            .first_visible(self.session, Scope::Page, timeout)
            .await
            .ok_or_else(|| E2eError::ElementNotFound("entity search box".into()))?;
        self.session.fill(Locate::page(search), entity).await?;

        let option = format!("text=\"{}\"", entity);
        self.session.click(Locate::page(&option)).await
    }

    /// Apply every set claim filter; dropdowns are chosen by option label.
    pub async fn configure_claim_filters(&self, form: &ClaimFiltersForm, filters: &ClaimFilters) -> E2eResult<()> {
        debug!("Claim filters: {:?}", filters);

        let dates = [
            (&form.services_from, &filters.services_from),
            (&form.services_through, &filters.services_through),
        ];
        for (selector, value) in dates {
            if let Some(value) = value {
                self.session.fill(Locate::page(selector), value).await?;
            }
        }

        let job_limit = filters.job_limit.map(|limit| limit.to_string());
        let dropdowns = [
            (&form.division, &filters.division),
            (&form.region, &filters.region),
            (&form.area, &filters.area),
            (&form.entity, &filters.entity),
            (&form.paying_agency, &filters.paying_agency),
            (&form.plan, &filters.plan),
            (&form.job_limit, &job_limit),
        ];
        for (selector, label) in dropdowns {
            if let Some(label) = label {
                self.session.select_option(Locate::page(selector), label).await?;
            }
        }

        let checkboxes = [
            (&form.require_month_end_close, filters.require_month_end_close),
            (&form.require_all_charges_posted, filters.require_all_charges_posted),
        ];
        for (selector, checked) in checkboxes {
            if let Some(checked) = checked {
                self.session.set_checked(Locate::page(selector), checked).await?;
            }
        }
        Ok(())
    }

    /// Claim totals from an open job detail view
    pub async fn read_claim_statistics(&self, form: &ClaimFiltersForm) -> E2eResult<ClaimStatistics> {
        let text = self
            .session
            .text_content(
                Locate::page(&form.statistics_container),
                Duration::from_millis(self.session.config().action_timeout_ms),
            )
            .await?
            .unwrap_or_default();
        let stats = ClaimStatistics::parse(&text);
        debug!("Claim statistics: {:?}", stats);
        Ok(stats)
    }

    async fn click_tab(&self, label: &str) -> E2eResult<()> {
        let selector = format!("a:has-text(\"{}\")", label);
        self.session.click(Locate::page(&selector)).await?;
        tokio::time::sleep(Duration::from_millis(self.layout.tab_pause_ms)).await;
        Ok(())
    }

    async fn click_refresh_button(&self) -> E2eResult<()> {
        let timeout = Duration::from_millis(self.layout.refresh_timeout_ms);
        match self.layout.refresh.first_visible(self, Scope::Page, timeout).await {
            Some(selector) => {
                debug!("Refreshing job list");
                self.session.click(Locate::page(selector)).await
            }
            None => {
                debug!("No refresh button shown");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Surface for JobsPage<'_> {
    async fn is_visible(&self, target: Target<'_>, timeout: Duration) -> E2eResult<bool> {
        self.session
            .is_visible_within(Locate::from_target(target, &self.layout.row_selector), timeout)
            .await
    }

    async fn click(&self, target: Target<'_>) -> E2eResult<()> {
        self.session
            .click(Locate::from_target(target, &self.layout.row_selector))
            .await
    }
}

#[async_trait]
impl JobTable for JobsPage<'_> {
    async fn refresh(&self, mode: &RefreshMode) -> E2eResult<()> {
        match mode {
            RefreshMode::Button => self.click_refresh_button().await,
            RefreshMode::TabToggle { away, back } => {
                self.click_tab(away).await?;
                self.click_tab(back).await
            }
            RefreshMode::ButtonThenToggle { away, back } => {
                self.click_refresh_button().await?;
                self.click_tab(away).await?;
                self.click_tab(back).await
            }
        }
    }

    async fn rows(&self) -> E2eResult<Vec<JobRow>> {
        let raw = self
            .session
            .rows(&self.layout.row_selector, &self.layout.actions)
            .await?;
        Ok(raw.into_iter().map(|r| self.layout.to_job_row(r)).collect())
    }
}
