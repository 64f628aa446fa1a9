//! RCM Direct Billing E2E harness
//!
//! Drives the billing web application through Playwright and handles its
//! asynchronous batch jobs (post charges, claim generation):
//! - Polls a job table until a job shows a completion signal
//! - Deletes a user's stale jobs before a new one is started
//! - Starts jobs with one retry after a duplicate-job conflict
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  workflows         post_charges / generate_claims           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  JobLauncher ──> JobCleanup      JobCompletionPoller        │
//! │        │              │                  │                  │
//! │        └──────── JobTable (trait) ───────┘                  │
//! │                       │          retry::poll_until          │
//! ├───────────────────────┼─────────────────────────────────────┤
//! │  JobsPage (pages)     │   FakeJobTable (tests)              │
//! │        │                                                    │
//! │  PlaywrightSession ── JSON lines ──> node driver            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod cleanup;
pub mod config;
pub mod data;
pub mod dates;
pub mod details;
pub mod error;
pub mod job;
pub mod launch;
pub mod pages;
pub mod playwright;
pub mod poller;
pub mod retry;
pub mod selectors;
pub mod table;
pub mod workflows;

pub use cleanup::{CleanupConfig, JobCleanup};
pub use config::{EnvConfig, Environment};
pub use error::{E2eError, E2eResult};
pub use job::{ClaimStatistics, JobKind, JobRow, RowAction};
pub use launch::{JobLauncher, LaunchConfig, LaunchOutcome};
pub use poller::{CompletionSignal, JobCompletionPoller, JobQuery, PollerConfig, TimeoutPolicy};
pub use retry::{PollBudget, PollState};
pub use table::{JobTable, RefreshMode, Scope, Surface, Target};
