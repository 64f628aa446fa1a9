//! Prioritised selector lists, tried first-match-wins

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::table::{Scope, Surface, Target};

/// Ordered lookup strategies for one UI control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorChain {
    selectors: Vec<String>,
}

impl SelectorChain {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selectors: selectors.into_iter().map(Into::into).collect(),
        }
    }

    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }

    /// First selector visible in `scope` within `timeout`.
    ///
    /// Lookup errors count as "not visible".
    pub async fn first_visible<S>(&self, surface: &S, scope: Scope, timeout: Duration) -> Option<&str>
    where
        S: Surface + ?Sized,
    {
        for selector in &self.selectors {
            let target = Target { scope, selector: selector.as_str() };
            match surface.is_visible(target, timeout).await {
                Ok(true) => return Some(selector.as_str()),
                Ok(false) => {}
                Err(e) => debug!("Lookup of '{}' failed: {}", selector, e),
            }
        }
        None
    }

    /// Row-level delete affordance
    pub fn delete_button() -> Self {
        Self::new([
            r#"button[title*="Delete"]"#,
            r#"a[title*="Delete"]"#,
            ".fa-trash",
            "button:has(.fa-trash)",
            r#"[title*="delete"]"#,
        ])
    }

    /// Deletion confirmation dialog
    pub fn confirm_button() -> Self {
        Self::new([
            r#"button:has-text("Yes")"#,
            r#"button:has-text("OK")"#,
            r#"button:has-text("Confirm")"#,
            r#"button:has-text("Delete")"#,
            r#"button[type="submit"]"#,
        ])
    }

    /// Row-level control opening a job's detail view
    pub fn view_details() -> Self {
        Self::new([
            r#"button[title*="View"]"#,
            r#"a[title*="View"]"#,
            ".fa-eye",
            "button:has(.fa-eye)",
            r#"[title*="View detail"]"#,
        ])
    }

    pub fn refresh_button() -> Self {
        Self::new([r#"button:has-text("Refresh")"#, ".fa-refresh"])
    }

    pub fn start_button() -> Self {
        Self::new([r#"button:has-text("Start")"#])
    }

    /// Error dialog raised when the same job is already scheduled
    pub fn conflict_indicator() -> Self {
        Self::new([
            r#"text="Error Starting Job""#,
            r#":has-text("Duplicate job already scheduled")"#,
        ])
    }

    pub fn dialog_close() -> Self {
        Self::new([
            r#"button:has-text("Close")"#,
            r#"button:has-text("OK")"#,
            r#"button:has-text("×")"#,
        ])
    }

    pub fn login_username() -> Self {
        Self::new([
            "#userName",
            "#UserName",
            r#"input[name="UserName"]"#,
            r#"input[id="username"]"#,
            r#"input[type="text"]"#,
        ])
    }

    pub fn login_password() -> Self {
        Self::new([
            "#Password",
            r#"input[name="Password"]"#,
            r#"input[id="password"]"#,
            r#"input[type="password"]"#,
        ])
    }

    pub fn login_submit() -> Self {
        Self::new([
            r#"button:has-text("SIGN IN")"#,
            r#"button[type="submit"]"#,
            r#"input[type="submit"]"#,
            r#"button:has-text("Login")"#,
            r#"input[value="Login"]"#,
            r#"button:has-text("Sign In")"#,
        ])
    }

    /// Navigation that only appears once logged in
    pub fn post_login_marker() -> Self {
        Self::new([
            r#"a:has-text("Patients")"#,
            r#"a:has-text("Revenue")"#,
            r#"a:has-text("Claims")"#,
            r#"a[href*="Logout"]"#,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_keeps_priority_order() {
        let chain = SelectorChain::delete_button();
        assert_eq!(chain.selectors()[0], r#"button[title*="Delete"]"#);
        assert_eq!(chain.selectors().len(), 5);
    }

    #[test]
    fn test_chain_deserializes_from_plain_list() {
        let chain: SelectorChain = serde_yaml::from_str("- '#a'\n- '.b'\n").unwrap();
        assert_eq!(chain, SelectorChain::new(["#a", ".b"]));
    }
}
