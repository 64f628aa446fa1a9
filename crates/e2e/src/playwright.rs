//! Playwright browser automation
//!
//! A session owns one browser page inside a long-lived Node process. Commands
//! go to the driver as JSON lines on stdin; each reply is one JSON line on
//! stdout carrying the request id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::job::RowAction;
use crate::table::{Surface, Target};

/// Row selector used when row targets go to a session directly.
pub const DEFAULT_ROW_SELECTOR: &str = "table tbody tr";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(E2eError::InvalidConfig(format!("unknown browser '{}'", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub screenshot_dir: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub browser: Browser,
    pub headless: bool,

    /// Saved authenticated session to start from
    #[serde(default)]
    pub storage_state: Option<PathBuf>,

    /// Where `require('playwright')` resolves from
    pub node_modules: PathBuf,

    pub action_timeout_ms: u64,
    pub navigation_timeout_ms: u64,

    /// Upper bound on any single driver round trip
    pub command_timeout_ms: u64,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            base_url: "https://basereg.therapy.nethealth.com".to_string(),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            viewport_width: 1920,
            viewport_height: 1080,
            browser: Browser::Chromium,
            headless: true,
            storage_state: None,
            node_modules: PathBuf::from("node_modules"),
            action_timeout_ms: 15_000,
            navigation_timeout_ms: 30_000,
            command_timeout_ms: 120_000,
        }
    }
}

impl PlaywrightConfig {
    /// Absolute URL for a path relative to the base URL.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        }
    }
}

/// An element, optionally scoped to one row of a table.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Locate<'a> {
    pub selector: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<RowRef<'a>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RowRef<'a> {
    pub selector: &'a str,
    pub index: usize,
}

impl<'a> Locate<'a> {
    pub fn page(selector: &'a str) -> Self {
        Self { selector, row: None }
    }

    pub fn in_row(row_selector: &'a str, index: usize, selector: &'a str) -> Self {
        Self {
            selector,
            row: Some(RowRef {
                selector: row_selector,
                index,
            }),
        }
    }

    pub fn from_target(target: Target<'a>, row_selector: &'a str) -> Self {
        match target.scope {
            crate::table::Scope::Page => Self::page(target.selector),
            crate::table::Scope::Row(index) => Self::in_row(row_selector, index, target.selector),
        }
    }
}

/// A table row as reported by the driver, before column mapping.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub cells: Vec<String>,
    #[serde(default)]
    pub actions: Vec<RowAction>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DriverCommand<'a> {
    Goto { url: &'a str },
    Click { target: Locate<'a>, timeout_ms: u64 },
    Fill { target: Locate<'a>, value: &'a str, timeout_ms: u64 },
    SelectOption { target: Locate<'a>, label: &'a str, timeout_ms: u64 },
    SetChecked { target: Locate<'a>, checked: bool, timeout_ms: u64 },
    IsVisible { target: Locate<'a>, timeout_ms: u64 },
    TextContent { target: Locate<'a>, timeout_ms: u64 },
    IsChecked { target: Locate<'a>, timeout_ms: u64 },
    WaitFor { target: Locate<'a>, state: &'a str, timeout_ms: u64 },
    Url,
    Rows { row_selector: &'a str, actions: &'a BTreeMap<RowAction, String> },
    Screenshot { path: &'a Path, full_page: bool },
    SaveStorageState { path: &'a Path },
    Close,
}

impl DriverCommand<'_> {
    fn name(&self) -> &'static str {
        match self {
            DriverCommand::Goto { .. } => "goto",
            DriverCommand::Click { .. } => "click",
            DriverCommand::Fill { .. } => "fill",
            DriverCommand::SelectOption { .. } => "select_option",
            DriverCommand::SetChecked { .. } => "set_checked",
            DriverCommand::IsVisible { .. } => "is_visible",
            DriverCommand::TextContent { .. } => "text_content",
            DriverCommand::IsChecked { .. } => "is_checked",
            DriverCommand::WaitFor { .. } => "wait_for",
            DriverCommand::Url => "url",
            DriverCommand::Rows { .. } => "rows",
            DriverCommand::Screenshot { .. } => "screenshot",
            DriverCommand::SaveStorageState { .. } => "save_storage_state",
            DriverCommand::Close => "close",
        }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    #[serde(flatten)]
    command: DriverCommand<'a>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct Ready {
    ready: bool,
}

/// Settings handed to the driver script at startup.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DriverSettings<'a> {
    browser: &'static str,
    headless: bool,
    viewport: Viewport,
    storage_state: Option<&'a Path>,
    action_timeout: u64,
    navigation_timeout: u64,
}

#[derive(Serialize)]
struct Viewport {
    width: u32,
    height: u32,
}

struct DriverIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

/// Playwright browser session
pub struct PlaywrightSession {
    config: PlaywrightConfig,
    io: Mutex<DriverIo>,
    child: Mutex<Child>,
    _script_dir: TempDir,
}

impl PlaywrightSession {
    /// Launch a browser and open one page
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;
        std::fs::create_dir_all(&config.screenshot_dir)?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("driver.js");
        std::fs::write(&script_path, build_driver_script(&config)?)?;

        debug!("Starting Playwright driver: {}", script_path.display());

        let node_path = std::fs::canonicalize(&config.node_modules).unwrap_or_else(|_| config.node_modules.clone());
        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .env("NODE_PATH", node_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or(E2eError::DriverClosed)?;
        let stdout = child.stdout.take().ok_or(E2eError::DriverClosed)?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "playwright", "{}", line);
                }
            });
        }

        let mut io = DriverIo {
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
        };

        let startup = Duration::from_millis(config.navigation_timeout_ms);
        let ready = tokio::time::timeout(startup, io.stdout.next_line())
            .await
            .map_err(|_| E2eError::Timeout("Playwright driver startup".into()))??
            .ok_or(E2eError::DriverClosed)?;
        match serde_json::from_str::<Ready>(&ready) {
            Ok(Ready { ready: true }) => {}
            _ => return Err(E2eError::Playwright(format!("unexpected driver greeting: {}", ready))),
        }

        info!("Launched {} (headless: {})", config.browser.as_str(), config.headless);

        Ok(Self {
            config,
            io: Mutex::new(io),
            child: Mutex::new(child),
            _script_dir: script_dir,
        })
    }

    /// Check if Playwright is installed
    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    async fn request(&self, command: DriverCommand<'_>) -> E2eResult<serde_json::Value> {
        let op = command.name();
        let limit = Duration::from_millis(self.config.command_timeout_ms);

        let mut io = self.io.lock().await;
        io.next_id += 1;
        let id = io.next_id;

        let mut line = serde_json::to_string(&Request { id, command })?;
        line.push('\n');
        io.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|_| E2eError::DriverClosed)?;
        io.stdin.flush().await.map_err(|_| E2eError::DriverClosed)?;

        let reply = tokio::time::timeout(limit, async {
            loop {
                let line = match io.stdout.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => return Err(E2eError::DriverClosed),
                    Err(e) => return Err(E2eError::Io(e)),
                };
                match serde_json::from_str::<Reply>(&line) {
                    Ok(reply) if reply.id == id => return Ok(reply),
                    Ok(reply) => debug!("Dropping stale reply {} (waiting for {})", reply.id, id),
                    Err(_) => debug!(target: "playwright", "{}", line),
                }
            }
        })
        .await
        .map_err(|_| E2eError::Timeout(format!("driver command '{}'", op)))??;

        if reply.ok {
            Ok(reply.value)
        } else {
            Err(E2eError::Playwright(format!(
                "{}: {}",
                op,
                reply.error.unwrap_or_else(|| "unknown error".into())
            )))
        }
    }

    /// Navigate to a URL or a path relative to the base URL
    pub async fn goto(&self, path: &str) -> E2eResult<()> {
        let url = self.config.url_for(path);
        debug!("Navigating to {}", url);
        self.request(DriverCommand::Goto { url: &url }).await?;
        Ok(())
    }

    pub async fn click(&self, target: Locate<'_>) -> E2eResult<()> {
        self.request(DriverCommand::Click {
            target,
            timeout_ms: self.config.action_timeout_ms,
        })
        .await?;
        Ok(())
    }

    pub async fn fill(&self, target: Locate<'_>, value: &str) -> E2eResult<()> {
        self.request(DriverCommand::Fill {
            target,
            value,
            timeout_ms: self.config.action_timeout_ms,
        })
        .await?;
        Ok(())
    }

    /// Choose the option of a `<select>` by its visible label
    pub async fn select_option(&self, target: Locate<'_>, label: &str) -> E2eResult<()> {
        self.request(DriverCommand::SelectOption {
            target,
            label,
            timeout_ms: self.config.action_timeout_ms,
        })
        .await?;
        Ok(())
    }

    /// Check or uncheck a checkbox, leaving it alone when already in `checked` state
    pub async fn set_checked(&self, target: Locate<'_>, checked: bool) -> E2eResult<()> {
        if self.is_checked(target).await? == checked {
            return Ok(());
        }
        self.request(DriverCommand::SetChecked {
            target,
            checked,
            timeout_ms: self.config.action_timeout_ms,
        })
        .await?;
        Ok(())
    }

    /// Whether the element becomes visible within `timeout`
    pub async fn is_visible_within(&self, target: Locate<'_>, timeout: Duration) -> E2eResult<bool> {
        let value = self
            .request(DriverCommand::IsVisible {
                target,
                timeout_ms: timeout.as_millis() as u64,
            })
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn text_content(&self, target: Locate<'_>, timeout: Duration) -> E2eResult<Option<String>> {
        let value = self
            .request(DriverCommand::TextContent {
                target,
                timeout_ms: timeout.as_millis() as u64,
            })
            .await?;
        Ok(value.as_str().map(String::from))
    }

    pub async fn is_checked(&self, target: Locate<'_>) -> E2eResult<bool> {
        let value = self
            .request(DriverCommand::IsChecked {
                target,
                timeout_ms: self.config.action_timeout_ms,
            })
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Wait for the element to reach `state` (visible, hidden, attached, detached)
    pub async fn wait_for(&self, target: Locate<'_>, state: &str, timeout: Duration) -> E2eResult<()> {
        self.request(DriverCommand::WaitFor {
            target,
            state,
            timeout_ms: timeout.as_millis() as u64,
        })
        .await
        .map_err(|e| match e {
            E2eError::Playwright(_) => E2eError::Timeout(format!("{} to be {}", target.selector, state)),
            other => other,
        })?;
        Ok(())
    }

    pub async fn current_url(&self) -> E2eResult<String> {
        let value = self.request(DriverCommand::Url).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Text, cell texts and visible row controls of every row
    pub async fn rows(&self, row_selector: &str, actions: &BTreeMap<RowAction, String>) -> E2eResult<Vec<RawRow>> {
        let value = self.request(DriverCommand::Rows { row_selector, actions }).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Full-page screenshot saved as `<screenshot_dir>/<name>.png`
    pub async fn screenshot(&self, name: &str) -> E2eResult<PathBuf> {
        let path = self.config.screenshot_dir.join(format!("{}.png", name));
        self.request(DriverCommand::Screenshot {
            path: &path,
            full_page: true,
        })
        .await?;
        Ok(path)
    }

    /// Persist cookies and local storage for later sessions
    pub async fn save_storage_state(&self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.request(DriverCommand::SaveStorageState { path }).await?;
        info!("Session state saved to {}", path.display());
        Ok(())
    }

    /// Close the browser and wait for the driver to exit
    pub async fn close(&self) -> E2eResult<()> {
        if let Err(e) = self.request(DriverCommand::Close).await {
            warn!("Driver did not acknowledge close: {}", e);
        }

        let mut child = self.child.lock().await;
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(status) => debug!("Driver exited: {:?}", status?),
            Err(_) => {
                warn!("Driver did not exit - killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Surface for PlaywrightSession {
    async fn is_visible(&self, target: Target<'_>, timeout: Duration) -> E2eResult<bool> {
        self.is_visible_within(Locate::from_target(target, DEFAULT_ROW_SELECTOR), timeout)
            .await
    }

    async fn click(&self, target: Target<'_>) -> E2eResult<()> {
        PlaywrightSession::click(self, Locate::from_target(target, DEFAULT_ROW_SELECTOR)).await
    }
}

/// Build the Node driver script for a configuration
pub fn build_driver_script(config: &PlaywrightConfig) -> E2eResult<String> {
    let storage_state = config.storage_state.as_deref().filter(|p| p.exists());
    if let (Some(requested), None) = (&config.storage_state, storage_state) {
        warn!("Storage state {} not found - starting without it", requested.display());
    }

    let settings = DriverSettings {
        browser: config.browser.as_str(),
        headless: config.headless,
        viewport: Viewport {
            width: config.viewport_width,
            height: config.viewport_height,
        },
        storage_state,
        action_timeout: config.action_timeout_ms,
        navigation_timeout: config.navigation_timeout_ms,
    };

    Ok(DRIVER_SCRIPT.replace("__SETTINGS__", &serde_json::to_string(&settings)?))
}

const DRIVER_SCRIPT: &str = r#"
const { chromium, firefox, webkit } = require('playwright');
const readline = require('readline');

const settings = __SETTINGS__;

function reply(id, ok, value, error) {
  process.stdout.write(JSON.stringify({ id, ok, value: value === undefined ? null : value, error }) + '\n');
}

function locate(page, target) {
  const scope = target.row ? page.locator(target.row.selector).nth(target.row.index) : page;
  return scope.locator(target.selector).first();
}

const handlers = {
  goto: async (page, cmd) => {
    await page.goto(cmd.url, { waitUntil: 'domcontentloaded', timeout: settings.navigationTimeout });
    return page.url();
  },
  click: async (page, cmd) => {
    await locate(page, cmd.target).click({ timeout: cmd.timeout_ms });
    return null;
  },
  fill: async (page, cmd) => {
    await locate(page, cmd.target).fill(cmd.value, { timeout: cmd.timeout_ms });
    return null;
  },
  select_option: async (page, cmd) => {
    await locate(page, cmd.target).selectOption({ label: cmd.label }, { timeout: cmd.timeout_ms });
    return null;
  },
  set_checked: async (page, cmd) => {
    await locate(page, cmd.target).setChecked(cmd.checked, { timeout: cmd.timeout_ms });
    return null;
  },
  is_visible: async (page, cmd) =>
    locate(page, cmd.target)
      .waitFor({ state: 'visible', timeout: cmd.timeout_ms })
      .then(() => true, () => false),
  text_content: async (page, cmd) => locate(page, cmd.target).textContent({ timeout: cmd.timeout_ms }),
  is_checked: async (page, cmd) => locate(page, cmd.target).isChecked({ timeout: cmd.timeout_ms }),
  wait_for: async (page, cmd) => {
    await locate(page, cmd.target).waitFor({ state: cmd.state, timeout: cmd.timeout_ms });
    return null;
  },
  url: async (page) => page.url(),
  rows: async (page, cmd) => {
    const rows = page.locator(cmd.row_selector);
    const count = await rows.count();
    const out = [];
    for (let i = 0; i < count; i++) {
      const row = rows.nth(i);
      const text = (await row.textContent().catch(() => '')) || '';
      const cells = await row.locator('td').allTextContents().catch(() => []);
      const actions = [];
      for (const [name, selector] of Object.entries(cmd.actions)) {
        if (await row.locator(selector).first().isVisible().catch(() => false)) {
          actions.push(name);
        }
      }
      out.push({ text, cells, actions });
    }
    return out;
  },
  screenshot: async (page, cmd) => {
    await page.screenshot({ path: cmd.path, fullPage: cmd.full_page });
    return cmd.path;
  },
  save_storage_state: async (page, cmd, context) => {
    await context.storageState({ path: cmd.path });
    return cmd.path;
  },
};

(async () => {
  const engine = { chromium, firefox, webkit }[settings.browser];
  const browser = await engine.launch({ headless: settings.headless });
  const options = { viewport: settings.viewport, ignoreHTTPSErrors: true };
  if (settings.storageState) {
    options.storageState = settings.storageState;
  }
  const context = await browser.newContext(options);
  context.setDefaultTimeout(settings.actionTimeout);
  context.setDefaultNavigationTimeout(settings.navigationTimeout);
  const page = await context.newPage();

  process.stdout.write(JSON.stringify({ ready: true }) + '\n');

  const input = readline.createInterface({ input: process.stdin });
  for await (const line of input) {
    if (!line.trim()) continue;
    let cmd;
    try {
      cmd = JSON.parse(line);
    } catch (error) {
      console.error('unparseable command: ' + line);
      continue;
    }
    if (cmd.op === 'close') {
      reply(cmd.id, true, null);
      break;
    }
    try {
      const handler = handlers[cmd.op];
      if (!handler) throw new Error('unknown op ' + cmd.op);
      reply(cmd.id, true, await handler(page, cmd, context));
    } catch (error) {
      reply(cmd.id, false, null, error.message);
    }
  }

  await browser.close();
})().catch((error) => {
  console.error(error.stack || error.message);
  process.exit(1);
});
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_joins_relative_paths() {
        let config = PlaywrightConfig {
            base_url: "https://rcm.example.com/".into(),
            ..Default::default()
        };
        assert_eq!(config.url_for("/Financials#claims/generation"), "https://rcm.example.com/Financials#claims/generation");
        assert_eq!(config.url_for("https://other.example.com/Login"), "https://other.example.com/Login");
    }

    #[test]
    fn test_driver_script_embeds_settings() {
        let config = PlaywrightConfig {
            browser: Browser::Firefox,
            headless: false,
            ..Default::default()
        };
        let script = build_driver_script(&config).unwrap();
        assert!(!script.contains("__SETTINGS__"));
        assert!(script.contains(r#""browser":"firefox""#));
        assert!(script.contains(r#""headless":false"#));
        assert!(script.contains(r#""storageState":null"#));
    }

    #[test]
    fn test_request_serializes_row_scoped_target() {
        let request = Request {
            id: 7,
            command: DriverCommand::Click {
                target: Locate::in_row(DEFAULT_ROW_SELECTOR, 2, ".fa-trash"),
                timeout_ms: 2000,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["op"], "click");
        assert_eq!(json["target"]["row"]["index"], 2);
        assert_eq!(json["target"]["selector"], ".fa-trash");
    }

    #[test]
    fn test_rows_request_uses_action_names() {
        let actions: BTreeMap<RowAction, String> = [(RowAction::View, ".fa-eye".to_string())].into_iter().collect();
        let request = Request {
            id: 1,
            command: DriverCommand::Rows {
                row_selector: DEFAULT_ROW_SELECTOR,
                actions: &actions,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["actions"]["view"], ".fa-eye");
    }

    #[test]
    fn test_set_checked_request_shape() {
        let request = Request {
            id: 3,
            command: DriverCommand::SetChecked {
                target: Locate::page(r#"input[type="checkbox"][name*="MonthEnd"]"#),
                checked: false,
                timeout_ms: 500,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["op"], "set_checked");
        assert_eq!(json["checked"], false);
        assert!(json["target"].get("row").is_none());
        assert!(DRIVER_SCRIPT.contains("set_checked:"));
        assert!(DRIVER_SCRIPT.contains("select_option:"));
    }

    #[test]
    fn test_browser_from_str() {
        assert_eq!("Firefox".parse::<Browser>().unwrap(), Browser::Firefox);
        assert!("lynx".parse::<Browser>().is_err());
    }
}
