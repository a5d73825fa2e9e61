//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// URL of the jail custody report page
    #[serde(default = "defaults::report_url")]
    pub report_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Minimum age in seconds before the report is fetched again
    #[serde(default = "defaults::minimum_report_age_s")]
    pub minimum_report_age_s: u64,

    /// Record a history entry for inmates still present each cycle
    #[serde(default = "defaults::log_still_present")]
    pub log_still_present: bool,

    /// Request timeouts
    #[serde(default)]
    pub timeout: TimeoutConfig,

    /// Durable state file locations
    #[serde(default)]
    pub path: PathConfig,

    /// Forward proxy for report and image requests; absent means direct
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,

    /// Posting service credentials
    #[serde(default)]
    pub twitter: TwitterConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.report_url.trim().is_empty() {
            return Err(AppError::config("report_url is empty"));
        }
        if let Err(e) = Url::parse(&self.report_url) {
            return Err(AppError::config(format!("report_url is invalid: {e}")));
        }
        if self.user_agent.trim().is_empty() {
            return Err(AppError::config("user_agent is empty"));
        }
        if self.timeout.open_jail_report == 0 {
            return Err(AppError::config("timeout.open_jail_report must be > 0"));
        }
        if self.timeout.open_one_mug_shot == 0 {
            return Err(AppError::config("timeout.open_one_mug_shot must be > 0"));
        }
        for (name, value) in [
            ("path.history_log", &self.path.history_log),
            ("path.recent_report", &self.path.recent_report),
            ("path.recent_report_html", &self.path.recent_report_html),
            ("path.most_inmates", &self.path.most_inmates),
            ("path.mug_shot_dir", &self.path.mug_shot_dir),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::config(format!("{name} is empty")));
            }
        }
        if let Some(proxy) = &self.proxy {
            if proxy.host.trim().is_empty() {
                return Err(AppError::config("proxy.host is empty"));
            }
        }
        if self.twitter.enabled {
            for (name, value) in [
                ("twitter.api_key", &self.twitter.api_key),
                ("twitter.api_secret", &self.twitter.api_secret),
                ("twitter.access_token", &self.twitter.access_token),
                (
                    "twitter.access_token_secret",
                    &self.twitter.access_token_secret,
                ),
            ] {
                if value.trim().is_empty() {
                    return Err(AppError::config(format!(
                        "twitter.enabled requires {name} to be set"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            report_url: defaults::report_url(),
            user_agent: defaults::user_agent(),
            minimum_report_age_s: defaults::minimum_report_age_s(),
            log_still_present: defaults::log_still_present(),
            timeout: TimeoutConfig::default(),
            path: PathConfig::default(),
            proxy: None,
            twitter: TwitterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Request timeout settings, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Timeout for fetching the report page
    #[serde(default = "defaults::open_jail_report")]
    pub open_jail_report: u64,

    /// Timeout for fetching a single mug shot image
    #[serde(default = "defaults::open_one_mug_shot")]
    pub open_one_mug_shot: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            open_jail_report: defaults::open_jail_report(),
            open_one_mug_shot: defaults::open_one_mug_shot(),
        }
    }
}

/// Locations of the durable state files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Append-only sighting history (JSON Lines)
    #[serde(default = "defaults::history_log")]
    pub history_log: String,

    /// Snapshot of the most recently reconciled report
    #[serde(default = "defaults::recent_report")]
    pub recent_report: String,

    /// Raw HTML copy of the most recently fetched report page
    #[serde(default = "defaults::recent_report_html")]
    pub recent_report_html: String,

    /// Highest inmate count ever observed
    #[serde(default = "defaults::most_inmates")]
    pub most_inmates: String,

    /// Directory for cached mug shot images
    #[serde(default = "defaults::mug_shot_dir")]
    pub mug_shot_dir: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            history_log: defaults::history_log(),
            recent_report: defaults::recent_report(),
            recent_report_html: defaults::recent_report_html(),
            most_inmates: defaults::most_inmates(),
            mug_shot_dir: defaults::mug_shot_dir(),
        }
    }
}

/// Forward proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy host
    #[serde(default = "defaults::proxy_host")]
    pub host: String,

    /// Proxy port
    #[serde(default = "defaults::proxy_port")]
    pub port: u16,
}

/// Posting service settings.
///
/// Credentials stay empty in checked-in configuration; operators fill
/// them in locally when `enabled` is set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TwitterConfig {
    /// Post new population records
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub api_secret: String,

    #[serde(default)]
    pub access_token: String,

    #[serde(default)]
    pub access_token_secret: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (error, warn, info, debug, trace)
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    pub fn report_url() -> String {
        "http://dpdjailview.cityofdenton.com/".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0".into()
    }
    pub fn minimum_report_age_s() -> u64 {
        300
    }
    pub fn log_still_present() -> bool {
        true
    }

    // Timeout defaults
    pub fn open_jail_report() -> u64 {
        60
    }
    pub fn open_one_mug_shot() -> u64 {
        30
    }

    // Path defaults
    pub fn history_log() -> String {
        "jailwatch_history.jsonl".into()
    }
    pub fn recent_report() -> String {
        "jailwatch_recent.json".into()
    }
    pub fn recent_report_html() -> String {
        "jailwatch_recent.html".into()
    }
    pub fn most_inmates() -> String {
        "jailwatch_most.json".into()
    }
    pub fn mug_shot_dir() -> String {
        "mugs".into()
    }

    // Proxy defaults
    pub fn proxy_host() -> String {
        "127.0.0.1".into()
    }
    pub fn proxy_port() -> u16 {
        8123
    }

    // Logging defaults
    pub fn log_level() -> String {
        "info".into()
    }
}
