use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::domain::display::{DisplayOptions, Thresholds};
use crate::domain::trend::TREND_WINDOW;

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub nightscout: NightscoutSettings,
    #[serde(default)]
    pub widget: WidgetSettings,
    #[serde(default)]
    pub bg: BgSettings,
}

#[derive(Deserialize, Clone, PartialEq)]
pub struct NightscoutSettings {
    #[serde(default)]
    pub url: String,
    /// Long-lived API secret exchanged for bearer tokens.
    #[serde(default, alias = "token")]
    pub secret: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Consecutive failures before the user is alerted.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct WidgetSettings {
    #[serde(default = "default_age_limit")]
    pub age_limit: i64,
    #[serde(default = "default_true")]
    pub show_age: bool,
    #[serde(default)]
    pub calc_trend: bool,
    #[serde(default)]
    pub units_in_mmol: bool,
}

/// Thresholds in the configured display unit.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BgSettings {
    #[serde(default = "default_high")]
    pub high: f64,
    #[serde(default = "default_low")]
    pub low: f64,
    #[serde(default)]
    pub target: TargetRange,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TargetRange {
    #[serde(default = "default_target_top")]
    pub top: f64,
    #[serde(default = "default_target_bottom")]
    pub bottom: f64,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_limit() -> u32 {
    2
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_retry_count() -> u32 {
    3
}

fn default_age_limit() -> i64 {
    15
}

fn default_true() -> bool {
    true
}

fn default_high() -> f64 {
    250.0
}

fn default_low() -> f64 {
    70.0
}

fn default_target_top() -> f64 {
    180.0
}

fn default_target_bottom() -> f64 {
    80.0
}

impl Default for NightscoutSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            secret: String::new(),
            interval_secs: default_interval_secs(),
            limit: default_limit(),
            timeout_ms: default_timeout_ms(),
            retry_count: default_retry_count(),
        }
    }
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            age_limit: default_age_limit(),
            show_age: true,
            calc_trend: false,
            units_in_mmol: false,
        }
    }
}

impl Default for BgSettings {
    fn default() -> Self {
        Self {
            high: default_high(),
            low: default_low(),
            target: TargetRange::default(),
        }
    }
}

impl Default for TargetRange {
    fn default() -> Self {
        Self {
            top: default_target_top(),
            bottom: default_target_bottom(),
        }
    }
}

impl fmt::Debug for NightscoutSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NightscoutSettings")
            .field("url", &self.url)
            .field("secret", &mask_secret(&self.secret))
            .field("interval_secs", &self.interval_secs)
            .field("limit", &self.limit)
            .field("timeout_ms", &self.timeout_ms)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}

#[cfg(test)]
impl NightscoutSettings {
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret: secret.into(),
            ..Default::default()
        }
    }
}

impl NightscoutSettings {
    /// Site address without surrounding whitespace or trailing slashes.
    pub fn base_url(&self) -> &str {
        self.url.trim().trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Row count to request; local trends need a full window.
    pub fn effective_limit(&self, calc_trend: bool) -> u32 {
        if calc_trend {
            self.limit.max(TREND_WINDOW as u32)
        } else {
            self.limit
        }
    }
}

impl WidgetSettings {
    pub fn display_options(&self) -> DisplayOptions {
        DisplayOptions {
            units_in_mmol: self.units_in_mmol,
            calc_trend: self.calc_trend,
            age_limit: self.age_limit,
        }
    }
}

impl BgSettings {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            high: self.high,
            low: self.low,
            target_top: self.target.top,
            target_bottom: self.target.bottom,
        }
    }
}

impl AppConfig {
    /// Reject values the poll loop cannot work with. A blank URL or secret is
    /// allowed here and reported on the first fetch instead.
    pub fn validate(&self) -> anyhow::Result<()> {
        let ns = &self.nightscout;
        if ns.interval_secs == 0 {
            anyhow::bail!("nightscout.interval_secs must be greater than zero");
        }
        if ns.limit == 0 {
            anyhow::bail!("nightscout.limit must be at least 1");
        }
        if ns.timeout_ms == 0 {
            anyhow::bail!("nightscout.timeout_ms must be greater than zero");
        }
        let url = ns.base_url();
        if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("nightscout.url must start with http:// or https://, got: {}", url);
        }
        if self.bg.low >= self.bg.high {
            anyhow::bail!("bg.low ({}) must be below bg.high ({})", self.bg.low, self.bg.high);
        }
        if self.bg.target.bottom >= self.bg.target.top {
            anyhow::bail!(
                "bg.target.bottom ({}) must be below bg.target.top ({})",
                self.bg.target.bottom,
                self.bg.target.top
            );
        }
        Ok(())
    }
}

/// Keep only the first and last four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Load settings from `path` (any format the config crate understands) with
/// `OWLET__SECTION__KEY` environment overrides.
pub fn load_app_config(path: &str) -> anyhow::Result<AppConfig> {
    load_with_environment(path, environment())
}

// Values stay strings until deserialization so secrets keep leading zeros
fn environment() -> config::Environment {
    config::Environment::with_prefix("OWLET").separator("__")
}

fn load_with_environment(path: &str, env: config::Environment) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(env)
        .build()?;

    Ok(settings.try_deserialize()?)
}
