//! Job rows as rendered in the Post Charges / Claim Generation tables

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Status text shown while the server is still working on a job.
pub const IN_PROGRESS_PHRASE: &str = "Running in a batch job";

static CLEAN_CLAIMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)clean claims:\s*(\d+)").expect("static regex"));
static CHARGES_TO_POST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)charges to post:\s*(\d+)").expect("static regex"));
static NUMBER_OF_CLAIMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Number of Claims:\s*(\d[\d,]*)").expect("static regex"));
static AMOUNT_OF_CLAIMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Amount of Claims:\s*(\$[\d,]+\.\d{2})").expect("static regex"));
static NUMBER_OF_ERRORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Number of Errors:\s*(\d[\d,]*)").expect("static regex"));
static AMOUNT_OF_ERROR_CLAIMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Amount of Error Claims:\s*(\$[\d,]+\.\d{2})").expect("static regex"));

/// Row-level controls the job table can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowAction {
    View,
    Delete,
    Export,
}

impl RowAction {
    pub const ALL: [RowAction; 3] = [RowAction::View, RowAction::Delete, RowAction::Export];

    pub fn as_str(&self) -> &'static str {
        match self {
            RowAction::View => "view",
            RowAction::Delete => "delete",
            RowAction::Export => "export",
        }
    }
}

/// One job row, read fresh from the page on every snapshot.
///
/// There is no stable identity: two rows with the same text are
/// indistinguishable and callers always act on the first one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRow {
    /// Job label (first column)
    pub description: String,

    /// "Requested By" column
    pub owner: String,

    /// "Requested On" column
    #[serde(default)]
    pub requested_on: String,

    /// Free-form status / progress text
    pub status: String,

    /// Controls present on the row
    #[serde(default)]
    pub actions: BTreeSet<RowAction>,

    /// Full text content of the row
    #[serde(default)]
    pub text: String,
}

impl JobRow {
    pub fn new(description: impl Into<String>, owner: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            owner: owner.into(),
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = RowAction>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Text used for substring matching. Falls back to the joined cells
    /// when the page did not report the row text.
    pub fn full_text(&self) -> String {
        if self.text.is_empty() {
            [&self.description, &self.owner, &self.requested_on, &self.status]
                .iter()
                .filter(|s| !s.is_empty())
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            self.text.clone()
        }
    }

    pub fn contains(&self, fragment: &str) -> bool {
        self.full_text().contains(fragment)
    }

    /// Whether "Requested By" contains `owner`. Never true for a blank owner.
    pub fn owned_by(&self, owner: &str) -> bool {
        let owner = owner.trim();
        !owner.is_empty() && self.owner.contains(owner)
    }

    pub fn has_any_action(&self, actions: &BTreeSet<RowAction>) -> bool {
        !self.actions.is_disjoint(actions)
    }

    /// Short label for log lines.
    pub fn summary(&self) -> String {
        let text = self.full_text();
        match text.char_indices().nth(80) {
            Some((idx, _)) => format!("{}...", &text[..idx]),
            None => text,
        }
    }
}

/// Which asynchronous job a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    PostCharges,
    ClaimGeneration,
}

impl JobKind {
    /// Row text markers identifying this kind of job.
    pub fn markers(&self) -> &'static [&'static str] {
        match self {
            JobKind::PostCharges => &["Services from", "Services through"],
            JobKind::ClaimGeneration => &["Services through", "Create Claims", "Generated Claim batch"],
        }
    }

    /// Status phrases shown once the job has concluded.
    pub fn terminal_phrases(&self) -> &'static [&'static str] {
        match self {
            JobKind::PostCharges => &["Charges to post:", "Completed"],
            JobKind::ClaimGeneration => &["Clean claims:", "Completed"],
        }
    }

    pub fn classifies(&self, row: &JobRow) -> bool {
        let text = row.full_text();
        self.markers().iter().any(|m| text.contains(m))
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::PostCharges => write!(f, "post charge"),
            JobKind::ClaimGeneration => write!(f, "claim generation"),
        }
    }
}

/// Owner filter with surrounding whitespace removed. A blank filter is no filter.
pub fn owner_filter(owner: Option<&str>) -> Option<&str> {
    owner.map(str::trim).filter(|o| !o.is_empty())
}

/// First row (document order) containing `fragment`, optionally owned by `owner`.
///
/// A blank `owner` matches no row rather than every row.
pub fn first_match<'a>(rows: &'a [JobRow], fragment: &str, owner: Option<&str>) -> Option<(usize, &'a JobRow)> {
    rows.iter()
        .enumerate()
        .find(|(_, row)| row.contains(fragment) && owner.map_or(true, |o| row.owned_by(o)))
}

/// Number from a "Clean claims: N" status.
pub fn clean_claims_count(status: &str) -> Option<u32> {
    capture_count(&CLEAN_CLAIMS, status)
}

/// Number from a "Charges to post: N" status.
pub fn charges_to_post_count(status: &str) -> Option<u32> {
    capture_count(&CHARGES_TO_POST, status)
}

fn capture_count(re: &Regex, status: &str) -> Option<u32> {
    re.captures(status)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Totals shown on a claim generation job's detail view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimStatistics {
    pub number_of_claims: Option<u32>,
    pub amount_of_claims: Option<String>,
    pub number_of_errors: Option<u32>,
    pub amount_of_error_claims: Option<String>,
}

impl ClaimStatistics {
    /// Pick the labelled totals out of the detail view text. Labels that are
    /// missing or carry no value stay `None`.
    pub fn parse(text: &str) -> Self {
        let capture = |re: &Regex| re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str().to_string());
        let number = |re: &Regex| capture(re).and_then(|n| n.replace(',', "").parse().ok());

        Self {
            number_of_claims: number(&NUMBER_OF_CLAIMS),
            amount_of_claims: capture(&AMOUNT_OF_CLAIMS),
            number_of_errors: number(&NUMBER_OF_ERRORS),
            amount_of_error_claims: capture(&AMOUNT_OF_ERROR_CLAIMS),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_post_charge_rows() {
        let row = JobRow::new("Services from 09/01/2025 to 09/30/2025", "alice", "Charges to post: 3");
        assert!(JobKind::PostCharges.classifies(&row));
        assert!(!JobKind::ClaimGeneration.classifies(&row));

        let claims = JobRow::new("Create Claims - Medicare", "alice", "Clean claims: 2");
        assert!(JobKind::ClaimGeneration.classifies(&claims));
        assert!(!JobKind::PostCharges.classifies(&claims));
    }

    #[test]
    fn test_first_match_prefers_document_order() {
        let rows = vec![
            JobRow::new("Services through 09/30", "bob", "Completed"),
            JobRow::new("Services through 09/30", "alice", "Completed"),
            JobRow::new("Services through 09/30", "alice", IN_PROGRESS_PHRASE),
        ];
        assert_eq!(first_match(&rows, "Services through", None).map(|(i, _)| i), Some(0));
        assert_eq!(first_match(&rows, "Services through", Some("alice")).map(|(i, _)| i), Some(1));
        assert!(first_match(&rows, "Create Claims", None).is_none());
    }

    #[test]
    fn test_blank_owner_matches_nobody() {
        let row = JobRow::new("Create Claims", "alice", "Completed");
        assert!(row.owned_by("alice"));
        assert!(!row.owned_by(""));
        assert!(!row.owned_by("   "));

        assert_eq!(owner_filter(Some("  alice ")), Some("alice"));
        assert_eq!(owner_filter(Some(" ")), None);
        assert_eq!(owner_filter(None), None);
    }

    #[test]
    fn test_status_counts() {
        assert_eq!(clean_claims_count("Clean claims: 7"), Some(7));
        assert_eq!(clean_claims_count("clean CLAIMS:12 errors: 1"), Some(12));
        assert_eq!(clean_claims_count(IN_PROGRESS_PHRASE), None);
        assert_eq!(charges_to_post_count("Charges to post: 3"), Some(3));
    }

    #[test]
    fn test_claim_statistics_from_detail_text() {
        let text = "Claim Batch Details\nNumber of Claims: 1,204\nAmount of Claims: $98,765.40\n\
                    Number of Errors: 3\nAmount of Error Claims: $120.00";
        let stats = ClaimStatistics::parse(text);
        assert_eq!(stats.number_of_claims, Some(1204));
        assert_eq!(stats.amount_of_claims.as_deref(), Some("$98,765.40"));
        assert_eq!(stats.number_of_errors, Some(3));
        assert_eq!(stats.amount_of_error_claims.as_deref(), Some("$120.00"));
    }

    #[test]
    fn test_claim_statistics_missing_labels() {
        let stats = ClaimStatistics::parse("Number of Claims: 5\nAmount of Claims: pending");
        assert_eq!(stats.number_of_claims, Some(5));
        assert_eq!(stats.amount_of_claims, None);
        assert_eq!(stats.amount_of_error_claims, None);
        assert!(ClaimStatistics::parse("Running in a batch job").is_empty());
    }

    #[test]
    fn test_full_text_falls_back_to_cells() {
        let row = JobRow::new("Create Claims", "alice", "");
        assert_eq!(row.full_text(), "Create Claims alice");

        let row = JobRow {
            text: "raw row text".into(),
            ..row
        };
        assert!(row.contains("raw row"));
    }

    #[test]
    fn test_summary_truncates_long_rows() {
        let row = JobRow {
            text: "x".repeat(200),
            ..Default::default()
        };
        assert_eq!(row.summary().len(), 83);
    }
}
