use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use waypoint_common::backend::{LaunchOptions, Viewport};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaypointConfig {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Base URL relative `navigate` steps are joined to. Journey files may override it
    /// unless `pinned` is set.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Apply `base_url` to every journey, including those that name their own.
    #[serde(default)]
    pub pinned: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Explicit headless flag; when unset it follows `ci`.
    #[serde(default)]
    pub headless: Option<bool>,
    /// Explicit slow-motion delay; when unset it is 0 on CI and 100ms locally.
    #[serde(default)]
    pub slow_mo_ms: Option<u64>,
    #[serde(default)]
    pub viewport: Viewport,
    /// Running under CI. Usually set from the `CI` environment variable.
    #[serde(default)]
    pub ci: bool,
}

impl BrowserConfig {
    pub fn headless(&self) -> bool {
        self.headless.unwrap_or(self.ci)
    }

    pub fn slow_mo(&self) -> Duration {
        let ms = self
            .slow_mo_ms
            .unwrap_or(if self.ci { 0 } else { default_local_slow_mo_ms() });
        Duration::from_millis(ms)
    }
}

fn default_local_slow_mo_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_journey_timeout_ms")]
    pub journey_timeout_ms: u64,
    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_network_quiet_ms")]
    pub network_quiet_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            journey_timeout_ms: default_journey_timeout_ms(),
            settle_timeout_ms: default_settle_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            network_quiet_ms: default_network_quiet_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    60000
}

fn default_journey_timeout_ms() -> u64 {
    300000
}

fn default_settle_timeout_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_network_quiet_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_true")]
    pub record_video: bool,
    #[serde(default = "default_true")]
    pub screenshot_on_failure: bool,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: default_artifact_dir(),
            record_video: true,
            screenshot_on_failure: true,
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_sensitive_fields")]
    pub sensitive_fields: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            sensitive_fields: default_sensitive_fields(),
        }
    }
}

fn default_sensitive_fields() -> Vec<String> {
    vec![
        "password".to_string(),
        "card_number".to_string(),
        "cvv".to_string(),
        "promo".to_string(),
    ]
}

/// Values the harness environment may impose on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub ci: bool,
    pub base_url: Option<String>,
    pub artifact_dir: Option<PathBuf>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            ci: std::env::var_os("CI").is_some(),
            base_url: std::env::var("WAYPOINT_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            artifact_dir: std::env::var_os("WAYPOINT_ARTIFACT_DIR").map(PathBuf::from),
        }
    }
}

impl WaypointConfig {
    pub fn apply_overrides(&mut self, overrides: &EnvOverrides) {
        if overrides.ci {
            self.browser.ci = true;
        }
        if let Some(url) = &overrides.base_url {
            self.target.base_url = Some(url.clone());
            self.target.pinned = true;
        }
        if let Some(dir) = &overrides.artifact_dir {
            self.artifacts.dir = dir.clone();
        }
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            headless: self.browser.headless(),
            slow_mo: self.browser.slow_mo(),
            viewport: self.browser.viewport,
            network_quiet: Duration::from_millis(self.timeouts.network_quiet_ms),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.default_timeout_ms)
    }

    pub fn journey_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.journey_timeout_ms)
    }
}
