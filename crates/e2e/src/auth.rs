//! Login and session reuse

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{EnvConfig, UserCredentials};
use crate::error::{E2eError, E2eResult};
use crate::playwright::{Locate, PlaywrightSession};
use crate::retry::{poll_until, Attempt, PollBudget, PollOutcome, PollState};
use crate::selectors::SelectorChain;
use crate::table::Scope;

/// Fragment of every URL behind the login wall
const APP_URL_MARKER: &str = "Financials";

/// Pause before a failed login is tried again
const LOGIN_RETRY_PAUSE: Duration = Duration::from_secs(2);

/// Fail early when a user has no username or password.
pub fn require_credentials(config: &EnvConfig, user: &UserCredentials) -> E2eResult<()> {
    if user.is_complete() {
        return Ok(());
    }
    let prefix = config.environment.prefix();
    Err(E2eError::InvalidConfig(format!(
        "credentials for '{}' are incomplete; set {}_USER and {}_PASS",
        if user.username.is_empty() { user.role.as_str() } else { user.username.as_str() },
        prefix,
        prefix
    )))
}

/// Log in through the login form.
///
/// Succeeds once the URL reaches the application or post-login navigation
/// shows up. Transient failures are retried `config.retries` times. The
/// final failure is a [`E2eError::LoginFailed`] and leaves a screenshot
/// behind.
pub async fn login(session: &PlaywrightSession, config: &EnvConfig, user: &UserCredentials) -> E2eResult<()> {
    require_credentials(config, user)?;
    info!("Logging in as {} ({})", user.username, config.name);

    let budget = login_budget(config);
    let mut state = PollState::start(&budget);
    let mut result = Ok(());

    while let Some(attempt) = state.next_attempt() {
        result = submit_login(session, config, user).await;
        match &result {
            Err(e) if e.is_transient() && !state.is_last() => {
                warn!("Login attempt {}/{} failed: {} - retrying", attempt, state.limit(), e);
                tokio::time::sleep(budget.interval()).await;
            }
            _ => break,
        }
    }

    match result {
        Ok(()) => {
            info!("Logged in as {}", user.username);
            Ok(())
        }
        Err(e) => {
            error!("Login failed for {}: {}", user.username, e);
            let url = session.current_url().await.unwrap_or_default();
            debug!("Current URL: {}", url);
            match session.screenshot(&format!("login-error-{}", safe_name(&user.username))).await {
                Ok(path) => info!("Screenshot saved to: {}", path.display()),
                Err(shot) => warn!("Could not capture login screenshot: {}", shot),
            }
            Err(E2eError::LoginFailed {
                user: user.username.clone(),
                reason: e.to_string(),
            })
        }
    }
}

async fn submit_login(session: &PlaywrightSession, config: &EnvConfig, user: &UserCredentials) -> E2eResult<()> {
    session.goto(&config.login_url).await?;

    let field_timeout = Duration::from_secs(10);
    let username = SelectorChain::login_username();
    let username = username
        .first_visible(session, Scope::Page, field_timeout)
        .await
        .ok_or_else(|| E2eError::ElementNotFound("username field".into()))?;
    session.fill(Locate::page(username), &user.username).await?;

    let password = SelectorChain::login_password();
    let password = password
        .first_visible(session, Scope::Page, field_timeout)
        .await
        .ok_or_else(|| E2eError::ElementNotFound("password field".into()))?;
    session.fill(Locate::page(password), &user.password).await?;

    let submit = SelectorChain::login_submit();
    let submit = submit
        .first_visible(session, Scope::Page, field_timeout)
        .await
        .ok_or_else(|| E2eError::ElementNotFound("login button".into()))?;
    session.click(Locate::page(submit)).await?;

    let budget = PollBudget::duration(Duration::from_millis(config.timeout_ms), Duration::from_secs(1));
    match poll_until(&budget, "login redirect", |_| async move {
        if is_logged_in(session, Duration::from_secs(1)).await {
            Attempt::Done(())
        } else {
            Attempt::Retry
        }
    })
    .await
    {
        PollOutcome::Completed { .. } => Ok(()),
        PollOutcome::Exhausted { .. } => Err(E2eError::Timeout("post-login page".into())),
    }
}

/// Whether the page is past the login wall
pub async fn is_logged_in(session: &PlaywrightSession, timeout: Duration) -> bool {
    if let Ok(url) = session.current_url().await {
        if url.contains(APP_URL_MARKER) {
            return true;
        }
    }
    SelectorChain::post_login_marker()
        .first_visible(session, Scope::Page, timeout)
        .await
        .is_some()
}

/// Save the logged-in state to the configured storage file
pub async fn persist_session(session: &PlaywrightSession, config: &EnvConfig) -> E2eResult<()> {
    session.save_storage_state(&config.storage_state).await
}

/// Launch a browser that is logged in as the default user.
///
/// A saved session is reused when it still opens the application; otherwise
/// a fresh browser logs in and the new state is saved.
pub async fn ensure_session(config: &EnvConfig) -> E2eResult<PlaywrightSession> {
    let user = &config.users.default_user;

    if config.storage_state.exists() {
        let session = PlaywrightSession::launch(config.playwright_config()).await?;
        session.goto(&config.modules.post_charges).await?;
        if is_logged_in(&session, Duration::from_secs(5)).await {
            info!("Reusing saved session from {}", config.storage_state.display());
            return Ok(session);
        }
        info!("Saved session expired - logging in again");
        session.close().await?;
    }

    require_credentials(config, user)?;

    let mut fresh = config.playwright_config();
    fresh.storage_state = None;
    let session = PlaywrightSession::launch(fresh).await?;
    login(&session, config, user).await?;
    persist_session(&session, config).await?;
    Ok(session)
}

fn login_budget(config: &EnvConfig) -> PollBudget {
    PollBudget::attempts(config.retries.saturating_add(1), LOGIN_RETRY_PAUSE)
}

fn safe_name(username: &str) -> String {
    username
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    #[test]
    fn test_missing_password_is_a_config_error() {
        let config = EnvConfig::defaults(Environment::Staging);
        let err = require_credentials(&config, &config.users.default_user).unwrap_err();
        match err {
            E2eError::InvalidConfig(msg) => {
                assert!(msg.contains("STAGING_PASS"));
                assert!(msg.contains("testuser@nethealth.com"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_retries_add_login_attempts() {
        let mut config = EnvConfig::defaults(Environment::Staging);
        config.retries = 2;
        assert_eq!(login_budget(&config).attempt_limit(), 3);

        config.retries = 0;
        assert_eq!(login_budget(&config).attempt_limit(), 1);
    }

    #[test]
    fn test_complete_credentials_pass() {
        let mut config = EnvConfig::defaults(Environment::Dev);
        config.users.default_user.password = "secret".into();
        assert!(require_credentials(&config, &config.users.default_user).is_ok());
    }

    #[test]
    fn test_screenshot_name_is_filesystem_safe() {
        assert_eq!(safe_name("admin@nethealth.com"), "admin_nethealth_com");
    }
}
