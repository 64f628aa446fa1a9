//! Bounded retry primitives shared by the poller and the cleanup loop

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// How long and how often to retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollBudget {
    /// Hard cap on attempts
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Wall-clock cap in milliseconds
    #[serde(default)]
    pub max_duration_ms: Option<u64>,

    /// Pause between attempts in milliseconds
    pub interval_ms: u64,
}

impl PollBudget {
    pub fn attempts(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            max_duration_ms: None,
            interval_ms: interval.as_millis() as u64,
        }
    }

    pub fn duration(max_duration: Duration, interval: Duration) -> Self {
        Self {
            max_attempts: None,
            max_duration_ms: Some(max_duration.as_millis() as u64),
            interval_ms: interval.as_millis() as u64,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> E2eResult<()> {
        match (self.max_attempts, self.max_duration_ms) {
            (None, None) => Err(E2eError::InvalidConfig(
                "poll budget needs max_attempts or max_duration_ms".into(),
            )),
            (Some(0), _) => Err(E2eError::InvalidConfig("max_attempts must be at least 1".into())),
            _ => Ok(()),
        }
    }

    /// Attempts this budget allows: `min(max_attempts, ceil(duration / interval))`, never zero.
    pub fn attempt_limit(&self) -> u32 {
        let by_duration = self.max_duration_ms.map(|d| {
            let interval = self.interval_ms.max(1);
            d.div_ceil(interval).min(u32::MAX as u64) as u32
        });

        let limit = match (self.max_attempts, by_duration) {
            (Some(a), Some(d)) => a.min(d),
            (Some(a), None) => a,
            (None, Some(d)) => d,
            (None, None) => 1,
        };
        limit.max(1)
    }
}

/// Per-invocation retry bookkeeping. Never shared between polls.
#[derive(Debug)]
pub struct PollState {
    attempt: u32,
    limit: u32,
    started: Instant,
    max_duration: Option<Duration>,
    interval: Duration,
}

impl PollState {
    pub fn start(budget: &PollBudget) -> Self {
        Self {
            attempt: 0,
            limit: budget.attempt_limit(),
            started: Instant::now(),
            max_duration: budget.max_duration(),
            interval: budget.interval(),
        }
    }

    /// Next attempt number, or `None` once the budget is spent.
    ///
    /// The first attempt is always granted.
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.attempt >= self.limit {
            return None;
        }
        if self.attempt > 0 {
            if let Some(max) = self.max_duration {
                if self.started.elapsed() >= max {
                    return None;
                }
            }
        }
        self.attempt += 1;
        Some(self.attempt)
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether no further attempt will be granted: the attempt cap is hit,
    /// or the duration budget runs out before the next interval elapses.
    pub fn is_last(&self) -> bool {
        if self.attempt >= self.limit {
            return true;
        }
        match self.max_duration {
            Some(max) if self.attempt > 0 => self.started.elapsed() + self.interval >= max,
            _ => false,
        }
    }
}

/// Result of a single attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    Retry,
}

#[derive(Debug)]
pub enum PollOutcome<T> {
    Completed { value: T, attempts: u32 },
    Exhausted { attempts: u32, elapsed: Duration },
}

impl<T> PollOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Completed { attempts, .. } | PollOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            PollOutcome::Completed { value, .. } => Some(value),
            PollOutcome::Exhausted { .. } => None,
        }
    }
}

/// Run `attempt` until it reports `Done` or the budget is exhausted.
///
/// Sleeps `budget.interval()` between attempts, never after the last one.
/// An attempt is last once [`PollState::is_last`] holds.
pub async fn poll_until<T, F, Fut>(budget: &PollBudget, label: &str, mut attempt: F) -> PollOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut state = PollState::start(budget);

    while let Some(n) = state.next_attempt() {
        debug!("{}: attempt {}/{}", label, n, state.limit());

        if let Attempt::Done(value) = attempt(n).await {
            return PollOutcome::Completed { value, attempts: n };
        }

        if state.is_last() {
            break;
        }
        tokio::time::sleep(budget.interval()).await;
    }

    PollOutcome::Exhausted {
        attempts: state.attempts(),
        elapsed: state.elapsed(),
    }
}
