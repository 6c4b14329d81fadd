use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::domain::Granularity;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub market: MarketConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub schedule: ScheduleConfig,
    pub retry: RetryConfig,
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// REST endpoint for kline data
    pub base_url: String,
    /// Traded pair (e.g., "BTCUSDT")
    pub symbol: String,
    /// Initial window preset
    #[serde(default)]
    pub granularity: Granularity,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    /// PostgreSQL connection URL
    #[serde(default)]
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// Base URL of the hosted auth service
    #[serde(default)]
    pub url: String,
    /// Public API key sent with every auth request
    #[serde(default)]
    pub anon_key: String,
}

/// Which agents the dashboard lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMode {
    /// Only the signed-in user's agents
    #[default]
    Owner,
    /// Every agent in the hive
    Hive,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between data refreshes
    pub refresh_interval_secs: u64,
    /// Seconds between automatic simulation passes
    pub simulation_interval_secs: u64,
    /// Run simulation passes without user confirmation
    pub auto_simulation: bool,
    /// Reasoning entries kept in memory
    pub log_window: usize,
    #[serde(default)]
    pub scope: ScopeMode,
}

impl ScheduleConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn simulation_interval(&self) -> Duration {
        Duration::from_secs(self.simulation_interval_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 10,
            simulation_interval_secs: 60,
            auto_simulation: true,
            log_window: 5,
            scope: ScopeMode::Owner,
        }
    }
}

/// Bounded retry for the automatic refresh path only
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
    pub timeout_secs: u64,
    pub google_url: String,
    pub openai_url: String,
    pub anthropic_url: String,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            google_url: "https://generativelanguage.googleapis.com".to_string(),
            openai_url: "https://api.openai.com".to_string(),
            anthropic_url: "https://api.anthropic.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for a daily rolling log file
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let defaults = Self::default_config();

        let builder = Config::builder()
            .set_default("market.base_url", defaults.market.base_url)?
            .set_default("market.symbol", defaults.market.symbol)?
            .set_default("market.granularity", "daily")?
            .set_default("store.max_connections", 5)?
            .set_default("schedule.refresh_interval_secs", 10)?
            .set_default("schedule.simulation_interval_secs", 60)?
            .set_default("schedule.auto_simulation", true)?
            .set_default("schedule.log_window", 5)?
            .set_default("schedule.scope", "owner")?
            .set_default("retry.attempts", 3)?
            .set_default("retry.delay_ms", 500)?
            .set_default("connectivity.timeout_secs", 15)?
            .set_default("connectivity.google_url", defaults.connectivity.google_url)?
            .set_default("connectivity.openai_url", defaults.connectivity.openai_url)?
            .set_default("connectivity.anthropic_url", defaults.connectivity.anthropic_url)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("HIVE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (HIVE_STORE__URL, etc.)
            .add_source(
                Environment::with_prefix("HIVE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Built-in configuration for offline and CLI usage
    pub fn default_config() -> Self {
        Self {
            market: MarketConfig {
                base_url: "https://api.binance.com".to_string(),
                symbol: "BTCUSDT".to_string(),
                granularity: Granularity::Daily,
            },
            store: StoreConfig {
                url: String::new(),
                max_connections: 5,
            },
            auth: AuthConfig::default(),
            schedule: ScheduleConfig::default(),
            retry: RetryConfig::default(),
            connectivity: ConnectivityConfig::default(),
            logging: LoggingConfig {
                level: default_log_level(),
                json: false,
                dir: None,
            },
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.market.symbol.trim().is_empty() {
            errors.push("market.symbol must not be empty".to_string());
        }

        if self.schedule.refresh_interval_secs == 0 {
            errors.push("schedule.refresh_interval_secs must be positive".to_string());
        }

        if self.schedule.simulation_interval_secs == 0 {
            errors.push("schedule.simulation_interval_secs must be positive".to_string());
        }

        if self.schedule.log_window == 0 {
            errors.push("schedule.log_window must be positive".to_string());
        }

        if self.retry.attempts == 0 {
            errors.push("retry.attempts must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.schedule.refresh_interval(), Duration::from_secs(10));
        assert_eq!(config.schedule.simulation_interval(), Duration::from_secs(60));
        assert_eq!(config.schedule.log_window, 5);
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = AppConfig::default_config();
        config.schedule.refresh_interval_secs = 0;
        config.retry.attempts = 0;
        config.market.symbol = " ".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let config = AppConfig::load_from("/nonexistent/hive-config").unwrap();
        assert_eq!(config.market.symbol, "BTCUSDT");
        assert_eq!(config.market.granularity, Granularity::Daily);
        assert_eq!(config.schedule.scope, ScopeMode::Owner);
        assert_eq!(config.retry.attempts, 3);
    }
}
