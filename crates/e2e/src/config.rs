//! Environment configuration
//!
//! One [`EnvConfig`] per target environment (`RCM_ENV`), built from
//! per-environment defaults, an optional YAML file and `<PREFIX>_*`
//! environment variable overrides, in that order.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cleanup::CleanupConfig;
use crate::error::{E2eError, E2eResult};
use crate::job::JobKind;
use crate::launch::LaunchConfig;
use crate::pages::{ClaimFiltersForm, PostChargesForm, TableLayout};
use crate::playwright::{Browser, PlaywrightConfig};
use crate::poller::PollerConfig;

/// Variable selecting the environment
pub const ENV_VAR: &str = "RCM_ENV";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Staging,
    Prod,
}

impl Environment {
    /// Prefix of the override variables, e.g. `STAGING_BASE_URL`
    pub fn prefix(&self) -> &'static str {
        match self {
            Environment::Dev => "DEV",
            Environment::Staging => "STAGING",
            Environment::Prod => "PROD",
        }
    }

    /// Read `RCM_ENV` from the process environment (default `dev`)
    pub fn from_env() -> E2eResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> E2eResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(ENV_VAR) {
            Some(value) if !value.trim().is_empty() => value.parse(),
            _ => Ok(Environment::default()),
        }
    }
}

impl FromStr for Environment {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "staging" | "stage" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(E2eError::UnknownEnvironment(other.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Dev => write!(f, "dev"),
            Environment::Staging => write!(f, "staging"),
            Environment::Prod => write!(f, "prod"),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: String,
}

impl UserCredentials {
    fn new(username: &str, role: &str) -> Self {
        Self {
            username: username.to_string(),
            password: String::new(),
            role: role.to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Users {
    pub default_user: UserCredentials,
    pub admin: UserCredentials,
    #[serde(default)]
    pub billing: Option<UserCredentials>,
}

/// Hash routes of the screens listing batch jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulePaths {
    pub post_charges: String,
    pub claim_generation: String,
}

impl Default for ModulePaths {
    fn default() -> Self {
        Self {
            post_charges: "/Financials#/revenue/revenue".into(),
            claim_generation: "/Financials#claims/generation".into(),
        }
    }
}

impl ModulePaths {
    /// Screen listing jobs of `kind`
    pub fn for_kind(&self, kind: JobKind) -> &str {
        match kind {
            JobKind::PostCharges => &self.post_charges,
            JobKind::ClaimGeneration => &self.claim_generation,
        }
    }
}

/// Polling and cleanup settings of one job kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProfile {
    pub poller: PollerConfig,
    pub cleanup: CleanupConfig,
}

impl JobProfile {
    pub fn for_kind(kind: JobKind) -> Self {
        Self {
            poller: PollerConfig::for_kind(kind),
            cleanup: CleanupConfig::for_kind(kind),
        }
    }

    pub fn validate(&self) -> E2eResult<()> {
        self.poller.budget.validate()?;
        self.cleanup.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProfiles {
    pub post_charges: JobProfile,
    pub claim_generation: JobProfile,
}

impl Default for JobProfiles {
    fn default() -> Self {
        Self {
            post_charges: JobProfile::for_kind(JobKind::PostCharges),
            claim_generation: JobProfile::for_kind(JobKind::ClaimGeneration),
        }
    }
}

impl JobProfiles {
    pub fn get(&self, kind: JobKind) -> &JobProfile {
        match kind {
            JobKind::PostCharges => &self.post_charges,
            JobKind::ClaimGeneration => &self.claim_generation,
        }
    }

    pub fn get_mut(&mut self, kind: JobKind) -> &mut JobProfile {
        match kind {
            JobKind::PostCharges => &mut self.post_charges,
            JobKind::ClaimGeneration => &mut self.claim_generation,
        }
    }
}

/// Configuration of one target environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    pub name: String,
    pub environment: Environment,
    pub base_url: String,
    pub login_url: String,

    /// Per-action timeout
    pub timeout_ms: u64,

    /// Extra login attempts after a failed one
    pub retries: u32,

    pub users: Users,

    #[serde(default)]
    pub modules: ModulePaths,

    #[serde(default)]
    pub jobs: JobProfiles,

    #[serde(default)]
    pub launch: LaunchConfig,

    #[serde(default)]
    pub table: TableLayout,

    #[serde(default)]
    pub post_charges_form: PostChargesForm,

    #[serde(default)]
    pub claim_filters_form: ClaimFiltersForm,

    #[serde(default)]
    pub browser: Browser,

    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Saved authenticated session
    #[serde(default = "default_storage_state")]
    pub storage_state: PathBuf,

    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
}

fn default_headless() -> bool {
    true
}

fn default_storage_state() -> PathBuf {
    PathBuf::from("auth/user-auth.json")
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("test-results/screenshots")
}

impl EnvConfig {
    /// Built-in defaults for an environment. Passwords are never defaulted.
    pub fn defaults(environment: Environment) -> Self {
        let (name, base_url, login_url, retries, users) = match environment {
            Environment::Dev => (
                "Development - RCM Direct Billing",
                "https://basereg.therapy.nethealth.com",
                "https://basereg.therapy.nethealth.com/Login/",
                1,
                Users {
                    default_user: UserCredentials::new("Optima.RambabuN", "Standard User"),
                    admin: UserCredentials::new("admin@nethealth.com", "Administrator"),
                    billing: Some(UserCredentials::new("billing.user@nethealth.com", "Billing Specialist")),
                },
            ),
            Environment::Staging => (
                "Staging",
                "https://staging-rcm-db.nethealth.com",
                "https://staging-rcm-db.nethealth.com/Login/",
                2,
                Users {
                    default_user: UserCredentials::new("testuser@nethealth.com", "Standard User"),
                    admin: UserCredentials::new("admin@nethealth.com", "Administrator"),
                    billing: None,
                },
            ),
            Environment::Prod => (
                "Production",
                "https://rcm-db.nethealth.com",
                "https://rcm-db.nethealth.com/Login/",
                2,
                Users {
                    default_user: UserCredentials::new("", "Standard User"),
                    admin: UserCredentials::new("", "Administrator"),
                    billing: None,
                },
            ),
        };

        Self {
            name: name.to_string(),
            environment,
            base_url: base_url.to_string(),
            login_url: login_url.to_string(),
            timeout_ms: 30_000,
            retries,
            users,
            modules: ModulePaths::default(),
            jobs: JobProfiles::default(),
            launch: LaunchConfig::default(),
            table: TableLayout::default(),
            post_charges_form: PostChargesForm::default(),
            claim_filters_form: ClaimFiltersForm::default(),
            browser: Browser::default(),
            headless: default_headless(),
            storage_state: default_storage_state(),
            screenshot_dir: default_screenshot_dir(),
        }
    }

    /// Load configuration from a YAML file, or defaults if it does not exist
    pub fn load(environment: Environment, path: Option<&Path>) -> E2eResult<Self> {
        match path {
            Some(path) if path.exists() => {
                debug!("Loading configuration from {}", path.display());
                let content = std::fs::read_to_string(path)?;
                let config: Self = serde_yaml::from_str(&content)?;
                if config.environment != environment {
                    return Err(E2eError::InvalidConfig(format!(
                        "{} describes '{}', expected '{}'",
                        path.display(),
                        config.environment,
                        environment
                    )));
                }
                config.validate()?;
                Ok(config)
            }
            _ => Ok(Self::defaults(environment)),
        }
    }

    /// Load the configuration of `environment` and apply overrides from the
    /// process environment
    pub fn resolve(environment: Environment, path: Option<&Path>) -> E2eResult<Self> {
        let mut config = Self::load(environment, path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Reject job profiles that could never run
    pub fn validate(&self) -> E2eResult<()> {
        self.jobs.post_charges.validate()?;
        self.jobs.claim_generation.validate()
    }

    /// Apply `<PREFIX>_*` overrides read through `lookup`. Empty values are
    /// ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = self.environment.prefix();
        let var = |suffix: &str| lookup(&format!("{}_{}", prefix, suffix)).filter(|v| !v.is_empty());

        if let Some(v) = var("BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = var("LOGIN_URL") {
            self.login_url = v;
        }
        if let Some(v) = var("USER") {
            self.users.default_user.username = v;
        }
        if let Some(v) = var("PASS") {
            self.users.default_user.password = v;
        }
        if let Some(v) = var("ADMIN_USER") {
            self.users.admin.username = v;
        }
        if let Some(v) = var("ADMIN_PASS") {
            self.users.admin.password = v;
        }
        if let Some(billing) = self.users.billing.as_mut() {
            if let Some(v) = var("BILLING_USER") {
                billing.username = v;
            }
            if let Some(v) = var("BILLING_PASS") {
                billing.password = v;
            }
        }
    }

    /// Save configuration to a YAML file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = serde_yaml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Browser settings for this environment
    pub fn playwright_config(&self) -> PlaywrightConfig {
        PlaywrightConfig {
            base_url: self.base_url.clone(),
            screenshot_dir: self.screenshot_dir.clone(),
            browser: self.browser,
            headless: self.headless,
            storage_state: Some(self.storage_state.clone()),
            action_timeout_ms: self.timeout_ms.min(15_000),
            navigation_timeout_ms: self.timeout_ms,
            ..Default::default()
        }
    }

    /// Short username used for the "Requested By" filter
    pub fn owner_filter(&self) -> Option<&str> {
        let username = self.users.default_user.username.as_str();
        let short = username.split('@').next().unwrap_or(username);
        let short = short.rsplit('.').next().unwrap_or(short).trim();
        (!short.is_empty()).then_some(short)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_environment_defaults_to_dev() {
        assert_eq!(Environment::from_lookup(lookup(&[])).unwrap(), Environment::Dev);
        assert_eq!(
            Environment::from_lookup(lookup(&[("RCM_ENV", "Staging")])).unwrap(),
            Environment::Staging
        );
        assert!(matches!(
            Environment::from_lookup(lookup(&[("RCM_ENV", "qa")])),
            Err(E2eError::UnknownEnvironment(_))
        ));
    }

    #[test]
    fn test_overrides_use_environment_prefix() {
        let mut config = EnvConfig::defaults(Environment::Staging);
        config.apply_env_overrides(lookup(&[
            ("STAGING_BASE_URL", "https://rcm.staging.test"),
            ("STAGING_USER", "qa.bot"),
            ("STAGING_PASS", "s3cret"),
            ("DEV_PASS", "ignored"),
            ("STAGING_ADMIN_PASS", ""),
        ]));

        assert_eq!(config.base_url, "https://rcm.staging.test");
        assert_eq!(config.users.default_user.username, "qa.bot");
        assert!(config.users.default_user.is_complete());
        assert_eq!(config.users.admin.password, "");
    }

    #[test]
    fn test_no_default_passwords() {
        for env in [Environment::Dev, Environment::Staging, Environment::Prod] {
            let config = EnvConfig::defaults(env);
            assert!(config.users.default_user.password.is_empty());
            assert!(config.users.admin.password.is_empty());
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = UserCredentials {
            username: "alice".into(),
            password: "hunter2".into(),
            role: "Standard User".into(),
        };
        let shown = format!("{:?}", creds);
        assert!(shown.contains("***"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_yaml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.yaml");

        let mut config = EnvConfig::defaults(Environment::Dev);
        config.jobs.post_charges.cleanup.max_iterations = 3;
        config.save(&path).unwrap();

        let loaded = EnvConfig::load(Environment::Dev, Some(&path)).unwrap();
        assert_eq!(loaded.jobs.post_charges.cleanup.max_iterations, 3);
        assert_eq!(loaded.modules, ModulePaths::default());

        assert!(matches!(
            EnvConfig::load(Environment::Prod, Some(&path)),
            Err(E2eError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_cleanup_iterations_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staging.yaml");

        let mut config = EnvConfig::defaults(Environment::Staging);
        config.jobs.claim_generation.cleanup.max_iterations = 0;
        config.save(&path).unwrap();

        let err = EnvConfig::load(Environment::Staging, Some(&path)).unwrap_err();
        match err {
            E2eError::InvalidConfig(msg) => assert!(msg.contains("max_iterations")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = EnvConfig::load(Environment::Prod, Some(Path::new("/nonexistent/rcm.yaml"))).unwrap();
        assert_eq!(config.base_url, "https://rcm-db.nethealth.com");
    }

    #[test]
    fn test_owner_filter_uses_short_name() {
        let mut config = EnvConfig::defaults(Environment::Dev);
        assert_eq!(config.owner_filter(), Some("RambabuN"));

        config.users.default_user.username = "testuser@nethealth.com".into();
        assert_eq!(config.owner_filter(), Some("testuser"));

        config.users.default_user.username = String::new();
        assert_eq!(config.owner_filter(), None);
    }
}
