use anyhow::{bail, Context, Result};
use httpmon_alert::engine::{AlertEngine, AlertThresholds};
use httpmon_alert::window::WindowConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/agent.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Access log to follow.
    #[serde(default = "default_log_path")]
    pub log_path: String,
    /// How often the log file is checked for new lines.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Count lines already in the file at startup instead of skipping them.
    #[serde(default)]
    pub read_from_start: bool,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            poll_interval_ms: default_poll_interval_ms(),
            read_from_start: false,
            window: WindowConfig::default(),
            alerts: AlertsConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(flatten)]
    pub thresholds: AlertThresholds,
    /// Seconds between alert evaluations.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: f64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            thresholds: AlertThresholds::default(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Seconds between stats reports; the reporting window when unset.
    #[serde(default)]
    pub interval_secs: Option<f64>,
    /// Endpoints and clients listed per report.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_secs: None,
            top_n: default_top_n(),
        }
    }
}

fn default_log_path() -> String {
    "./access.log".to_string()
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_check_interval_secs() -> f64 {
    1.0
}

fn default_top_n() -> usize {
    5
}

impl AgentConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        Self::from_toml_str(&content).with_context(|| format!("invalid config file: {path}"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the window or the evaluators would refuse, before any
    /// task is started.
    pub fn validate(&self) -> Result<()> {
        self.window.validate()?;
        AlertEngine::from_config(&self.alerts.thresholds, self.window.reporting_window_secs)?;
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than 0");
        }
        self.check_interval()?;
        self.stats_interval()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn check_interval(&self) -> Result<Duration> {
        interval("alerts.check_interval_secs", self.alerts.check_interval_secs)
    }

    pub fn stats_interval_secs(&self) -> f64 {
        self.stats
            .interval_secs
            .unwrap_or(self.window.reporting_window_secs)
    }

    pub fn stats_interval(&self) -> Result<Duration> {
        interval("stats.interval_secs", self.stats_interval_secs())
    }
}

fn interval(name: &str, secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => bail!("{name} must be a positive number of seconds, got {secs}"),
    }
}
