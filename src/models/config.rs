//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::format::{Item as FormatItem, StrftimeItems};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Item;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Retailer account used by the prober session
    #[serde(default)]
    pub login: LoginConfig,

    /// Outbound mail relay settings
    #[serde(default)]
    pub mail: MailConfig,

    /// Liveness marker for an external health check
    #[serde(default)]
    pub liveness: LivenessConfig,

    /// Round scheduling
    #[serde(default)]
    pub check: CheckConfig,

    /// Notification throttle
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Snapshot, history and debug locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP prober behavior
    #[serde(default)]
    pub prober: ProberConfig,

    /// History row formatting
    #[serde(default)]
    pub history: HistoryConfig,
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
        if self.check.interval_secs == 0 {
            return Err(AppError::validation("check.interval_secs must be > 0"));
        }
        if self.prober.timeout_secs == 0 {
            return Err(AppError::validation("prober.timeout_secs must be > 0"));
        }
        if self.prober.user_agent.trim().is_empty() {
            return Err(AppError::validation("prober.user_agent is empty"));
        }
        if self.prober.in_stock_selector.trim().is_empty() {
            return Err(AppError::validation("prober.in_stock_selector is empty"));
        }
        if self.mail.host.trim().is_empty() {
            return Err(AppError::validation("mail.host is empty"));
        }
        if self.mail.port == 0 {
            return Err(AppError::validation("mail.port must be > 0"));
        }
        if !(-23..=23).contains(&self.history.utc_offset_hours) {
            return Err(AppError::validation(
                "history.utc_offset_hours must be within -23..=23",
            ));
        }
        for (key, pattern) in [
            ("history.date_format", &self.history.date_format),
            ("history.time_format", &self.history.time_format),
        ] {
            if StrftimeItems::new(pattern).any(|item| matches!(item, FormatItem::Error)) {
                return Err(AppError::validation(format!(
                    "{key} '{pattern}' is not a valid strftime pattern"
                )));
            }
        }
        url::Url::parse(&self.login.login_url)?;
        Ok(())
    }
}

/// Retailer login settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub pass: String,

    /// Entry point of the single sign-on flow
    #[serde(default = "defaults::login_url")]
    pub login_url: String,

    /// Title fragment shown when the session is already signed in
    #[serde(default = "defaults::authenticated_title")]
    pub authenticated_title: String,

    /// Title fragment shown after a completed sign-in
    #[serde(default = "defaults::success_title")]
    pub success_title: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            pass: String::new(),
            login_url: defaults::login_url(),
            authenticated_title: defaults::authenticated_title(),
            success_title: defaults::success_title(),
        }
    }
}

/// Mail relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "defaults::mail_host")]
    pub host: String,

    #[serde(default = "defaults::mail_port")]
    pub port: u16,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub pass: String,

    #[serde(default)]
    pub from: String,

    #[serde(default)]
    pub to: String,

    #[serde(default = "defaults::mail_subject")]
    pub subject: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            host: defaults::mail_host(),
            port: defaults::mail_port(),
            user: String::new(),
            pass: String::new(),
            from: String::new(),
            to: String::new(),
            subject: defaults::mail_subject(),
        }
    }
}

/// Liveness marker settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LivenessConfig {
    /// File whose mtime is refreshed after every completed round
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// How the sleep between rounds is computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulePolicy {
    /// Sleep the full interval after each round.
    Fixed,
    /// Sleep the interval minus the current second of the minute.
    #[default]
    Aligned,
}

/// Round scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default)]
    pub policy: SchedulePolicy,

    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// Pause after each probed item
    #[serde(default = "defaults::item_delay")]
    pub item_delay_secs: u64,
}

impl CheckConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_secs(self.item_delay_secs)
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            policy: SchedulePolicy::default(),
            interval_secs: defaults::interval(),
            item_delay_secs: defaults::item_delay(),
        }
    }
}

/// Notification throttle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Marker file; keep it on memory-backed storage so reboots reset it
    #[serde(default = "defaults::marker_path")]
    pub marker_path: PathBuf,

    #[serde(default = "defaults::cooldown")]
    pub cooldown_secs: u64,
}

impl NotifyConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            marker_path: defaults::marker_path(),
            cooldown_secs: defaults::cooldown(),
        }
    }
}

/// Snapshot, history and debug locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Keep the snapshot on disk across restarts
    #[serde(default = "defaults::persist")]
    pub persist: bool,

    #[serde(default = "defaults::snapshot_file")]
    pub snapshot_file: PathBuf,

    #[serde(default = "defaults::history_file")]
    pub history_file: PathBuf,

    #[serde(default = "defaults::debug_dir")]
    pub debug_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            persist: defaults::persist(),
            snapshot_file: defaults::snapshot_file(),
            history_file: defaults::history_file(),
            debug_dir: defaults::debug_dir(),
        }
    }
}

/// HTTP prober settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProberConfig {
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Page load timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Element present only when the item can be bought
    #[serde(default = "defaults::in_stock_selector")]
    pub in_stock_selector: String,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            in_stock_selector: defaults::in_stock_selector(),
        }
    }
}

/// History row formatting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "defaults::utc_offset")]
    pub utc_offset_hours: i32,

    #[serde(default = "defaults::date_format")]
    pub date_format: String,

    #[serde(default = "defaults::time_format")]
    pub time_format: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: defaults::utc_offset(),
            date_format: defaults::date_format(),
            time_format: defaults::time_format(),
        }
    }
}

/// Tracked items, kept in a file of their own.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Targets {
    #[serde(default, rename = "item")]
    pub items: Vec<Item>,
}

impl Targets {
    /// Load tracked items from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Check names are unique and non-empty, and URLs parse.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for item in &self.items {
            if item.name.trim().is_empty() {
                return Err(AppError::validation("item name is empty"));
            }
            if !seen.insert(item.name.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate item name '{}'",
                    item.name
                )));
            }
            url::Url::parse(&item.url).map_err(|e| {
                AppError::validation(format!("item '{}' has invalid url: {}", item.name, e))
            })?;
        }
        Ok(())
    }
}

mod defaults {
    use std::path::PathBuf;

    // Login defaults
    pub fn login_url() -> String {
        "https://sso.ui.com/api/sso/v1/shopify_login".into()
    }
    pub fn authenticated_title() -> String {
        "Account".into()
    }
    pub fn success_title() -> String {
        "Ubiquiti Account".into()
    }

    // Mail defaults
    pub fn mail_host() -> String {
        "smtp.gmail.com".into()
    }
    pub fn mail_port() -> u16 {
        587
    }
    pub fn mail_subject() -> String {
        "Ubiquiti Store Checker".into()
    }

    // Check defaults
    pub fn interval() -> u64 {
        300
    }
    pub fn item_delay() -> u64 {
        5
    }

    // Notify defaults
    pub fn marker_path() -> PathBuf {
        PathBuf::from("/dev/shm/stock_checker_notify")
    }
    pub fn cooldown() -> u64 {
        8 * 60 * 60
    }

    // Storage defaults
    pub fn persist() -> bool {
        true
    }
    pub fn snapshot_file() -> PathBuf {
        PathBuf::from("data/stock_cache.json")
    }
    pub fn history_file() -> PathBuf {
        PathBuf::from("data/log/history.csv")
    }
    pub fn debug_dir() -> PathBuf {
        PathBuf::from("data/debug")
    }

    // Prober defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; stock-checker/0.1)".into()
    }
    pub fn timeout() -> u64 {
        5
    }
    pub fn in_stock_selector() -> String {
        r#"span[id="titleInStockBadge"]"#.into()
    }

    // History defaults
    pub fn utc_offset() -> i32 {
        9
    }
    pub fn date_format() -> String {
        "%Y/%m/%d".into()
    }
    pub fn time_format() -> String {
        "%H:%M".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.check.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_selector() {
        let mut config = Config::default();
        config.prober.in_stock_selector = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_time_specifier() {
        let mut config = Config::default();
        config.history.date_format = "%Q".to_string();
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));

        let mut config = Config::default();
        config.history.time_format = "%H:%M %Q".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [mail]
            user = "me@example.com"
            to = "you@example.com"

            [check]
            policy = "fixed"
            interval_secs = 3600
            "#,
        )
        .unwrap();

        assert_eq!(config.mail.port, 587);
        assert_eq!(config.mail.subject, "Ubiquiti Store Checker");
        assert_eq!(config.check.policy, SchedulePolicy::Fixed);
        assert_eq!(config.check.interval_secs, 3600);
        assert_eq!(config.check.item_delay_secs, 5);
        assert_eq!(config.notify.cooldown_secs, 28_800);
        assert!(config.liveness.file.is_none());
    }

    #[test]
    fn targets_parse_in_order() {
        let targets: Targets = toml::from_str(
            r#"
            [[item]]
            name = "UDM"
            url = "https://store.example/products/udm"

            [[item]]
            name = "U6-Lite"
            url = "https://store.example/products/u6-lite"
            "#,
        )
        .unwrap();

        assert_eq!(targets.items.len(), 2);
        assert_eq!(targets.items[0].name, "UDM");
        assert_eq!(targets.items[1].name, "U6-Lite");
        assert!(targets.validate().is_ok());
    }

    #[test]
    fn targets_reject_duplicate_names() {
        let targets = Targets {
            items: vec![
                Item::new("UDM", "https://store.example/a"),
                Item::new("UDM", "https://store.example/b"),
            ],
        };
        assert!(targets.validate().is_err());
    }

    #[test]
    fn targets_reject_bad_url() {
        let targets = Targets {
            items: vec![Item::new("UDM", "not a url")],
        };
        assert!(targets.validate().is_err());
    }
}
