//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::flow::FlowDefinition;
use crate::models::identity::ViewportProfile;
use crate::models::page_state::PageState;
use crate::{AppError, Result};

/// Configurable wait budgets (seconds) for blocking interactions.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct TimeoutConfig {
    /// Maximum time a manual-input pause point blocks the flow.
    pub manual_input_seconds: u64,
    /// Wait budget for element waits and environment acquisition.
    pub step_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            manual_input_seconds: 600,
            step_seconds: 30,
        }
    }
}

/// Inter-cycle pacing and preview streaming settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct PacingConfig {
    /// Pause between consecutive attempts.
    pub cooldown_seconds: u64,
    /// Interval between periodic preview frames.
    pub preview_interval_ms: u64,
    /// JPEG quality for preview frames (1-100).
    pub preview_quality: u8,
    /// JPEG quality for labeled snapshots (1-100).
    pub snapshot_quality: u8,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 5,
            preview_interval_ms: 4000,
            preview_quality: 20,
            snapshot_quality: 40,
        }
    }
}

/// Identity sequence settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct IdentityConfig {
    /// First value handed out when the persisted counter does not exist yet.
    pub sequence_start: i64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { sequence_start: 1 }
    }
}

/// Maps a CSS selector to the page state it indicates when visible.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PageDetector {
    /// Selector probed for visibility.
    pub selector: String,
    /// State reported when the selector is visible.
    pub state: PageState,
}

/// Browser environment settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct BrowserSettings {
    /// Run without a visible window.
    pub headless: bool,
    /// Explicit Chromium executable; auto-detected when absent.
    pub executable: Option<PathBuf>,
    /// Viewport presets; one is chosen at random per attempt.
    pub viewports: Vec<ViewportProfile>,
    /// Page-state detectors, probed in order; first visible match wins.
    pub page_states: Vec<PageDetector>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            viewports: vec![ViewportProfile::default()],
            page_states: Vec::new(),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_ipc_name() -> String {
    "form-pilot".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("form-pilot.db")
}

fn default_retention_days() -> u32 {
    30
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Address the observer channel binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// HTTP port for the WebSocket observer channel.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Named pipe / Unix socket identifier for `form-pilot-ctl`.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Days attempt records are kept.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Wait budgets.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Pacing and preview settings.
    #[serde(default)]
    pub pacing: PacingConfig,
    /// Identity sequence settings.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Browser environment settings.
    #[serde(default)]
    pub browser: BrowserSettings,
    /// Ordered steps executed in every attempt.
    pub flow: FlowDefinition,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Manual-input wait budget.
    #[must_use]
    pub fn manual_input_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.manual_input_seconds)
    }

    /// Per-step wait budget.
    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.step_seconds)
    }

    /// Pause between attempts.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.pacing.cooldown_seconds)
    }

    /// Interval between preview frames.
    #[must_use]
    pub fn preview_interval(&self) -> Duration {
        Duration::from_millis(self.pacing.preview_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.timeouts.manual_input_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.manual_input_seconds must be greater than zero".into(),
            ));
        }

        if self.timeouts.step_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.step_seconds must be greater than zero".into(),
            ));
        }

        if self.pacing.preview_interval_ms == 0 {
            return Err(AppError::Config(
                "pacing.preview_interval_ms must be greater than zero".into(),
            ));
        }

        for quality in [self.pacing.preview_quality, self.pacing.snapshot_quality] {
            if !(1..=100).contains(&quality) {
                return Err(AppError::Config(
                    "pacing image quality must be between 1 and 100".into(),
                ));
            }
        }

        if self.browser.viewports.is_empty() {
            return Err(AppError::Config(
                "browser.viewports must not be empty".into(),
            ));
        }

        if self.identity.sequence_start < 0 {
            return Err(AppError::Config(
                "identity.sequence_start must not be negative".into(),
            ));
        }

        self.flow
            .validate()
            .map_err(|err| AppError::Config(err.to_string()))
    }
}
