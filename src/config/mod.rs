//! Configuration management for FxBot
//!
//! Loads from YAML files + environment variables via .env

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub strategy: StrategyConfig,
    pub broker: BrokerConfig,
    pub telegram: TelegramConfig,
    pub server: ServerConfig,
    pub schedule: ScheduleConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Bot version tag for logging
    pub tag: String,
    /// Traded currency pair (broker notation, e.g. GBP_USD)
    pub instrument: String,
    /// Fixed order size in units
    pub units: i64,
    /// Dry run mode (no real orders)
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Minimum confidence to trade (0.0 - 1.0), inclusive
    pub min_confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// REST endpoint (practice or live)
    pub base_url: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Candles requested per timeframe
    pub candle_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot API endpoint
    pub api_url: String,
    /// Receive commands through the webhook route instead of long polling
    pub use_webhook: bool,
    /// Public host the webhook is registered under
    pub webhook_host: String,
    /// Long polling timeout in seconds
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port for the keep-alive / webhook HTTP server
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Trade cycle interval in seconds
    pub trade_interval_secs: u64,
    /// Daily retrain wall-clock time (HH:MM, UTC)
    pub retrain_at: String,
    /// Heartbeat line interval in seconds
    pub heartbeat_interval_secs: u64,
    /// Daily heartbeat log truncation time (HH:MM, UTC)
    pub heartbeat_reset_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory
    pub data_dir: String,
    pub trade_log: String,
    pub skipped_log: String,
    pub scheduler_log: String,
    /// Trained model file (JSON)
    pub model_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human format
    pub json: bool,
}

/// Secrets read from the environment only, never from config files
#[derive(Clone)]
pub struct Secrets {
    pub oanda_api_key: String,
    pub oanda_account_id: String,
    pub telegram_token: String,
    pub telegram_chat_id: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("oanda_account_id", &self.oanda_account_id)
            .field("telegram_chat_id", &self.telegram_chat_id)
            .finish_non_exhaustive()
    }
}

impl ScheduleConfig {
    pub fn retrain_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.retrain_at).context("Invalid schedule.retrain_at")
    }

    pub fn heartbeat_reset_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.heartbeat_reset_at).context("Invalid schedule.heartbeat_reset_at")
    }
}

impl PersistenceConfig {
    pub fn data_path(&self, file: &str) -> PathBuf {
        PathBuf::from(&self.data_dir).join(file)
    }

    pub fn model_path(&self) -> PathBuf {
        self.data_path(&self.model_file)
    }
}

/// Parse a `HH:MM` wall-clock time
pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .with_context(|| format!("expected HH:MM, got '{}'", value))
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (FXBOT__*)
            .add_source(Environment::with_prefix("FXBOT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Defaults only, no files or environment
    pub fn defaults() -> Result<Self> {
        let config = Self::builder()?
            .build()
            .context("Failed to build configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("bot.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("bot.instrument", "GBP_USD")?
            .set_default("bot.units", 1000)?
            .set_default("bot.dry_run", false)?
            // Strategy defaults
            .set_default("strategy.min_confidence", 0.55)?
            // Broker defaults
            .set_default("broker.base_url", "https://api-fxpractice.oanda.com/v3")?
            .set_default("broker.request_timeout_secs", 30)?
            .set_default("broker.candle_count", 300)?
            // Telegram defaults
            .set_default("telegram.api_url", "https://api.telegram.org")?
            .set_default("telegram.use_webhook", false)?
            .set_default("telegram.webhook_host", "")?
            .set_default("telegram.poll_timeout_secs", 30)?
            // Server defaults
            .set_default("server.port", 8080)?
            // Schedule defaults
            .set_default("schedule.trade_interval_secs", 900)?
            .set_default("schedule.retrain_at", "23:00")?
            .set_default("schedule.heartbeat_interval_secs", 60)?
            .set_default("schedule.heartbeat_reset_at", "00:00")?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.trade_log", "trade_log.csv")?
            .set_default("persistence.skipped_log", "skipped_trades.csv")?
            .set_default("persistence.scheduler_log", "scheduler_log.txt")?
            .set_default("persistence.model_file", "model.json")?
            // Logging defaults
            .set_default("logging.json", false)?)
    }

    /// Sanity checks on values the deserializer cannot express
    pub fn validate(&self) -> Result<()> {
        if self.bot.units <= 0 {
            bail!("bot.units must be positive, got {}", self.bot.units);
        }
        if !(0.0..=1.0).contains(&self.strategy.min_confidence) {
            bail!(
                "strategy.min_confidence must be within [0, 1], got {}",
                self.strategy.min_confidence
            );
        }
        if self.schedule.trade_interval_secs == 0 || self.schedule.heartbeat_interval_secs == 0 {
            bail!("schedule intervals must be non-zero");
        }
        self.schedule.retrain_time()?;
        self.schedule.heartbeat_reset_time()?;
        if self.telegram.use_webhook && self.telegram.webhook_host.trim().is_empty() {
            bail!("telegram.webhook_host is required when telegram.use_webhook = true");
        }
        Ok(())
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "bot={} instrument={} units={} dry_run={} min_conf={:.2} interval={}s retrain_at={}",
            self.bot.tag,
            self.bot.instrument,
            self.bot.units,
            self.bot.dry_run,
            self.strategy.min_confidence,
            self.schedule.trade_interval_secs,
            self.schedule.retrain_at
        )
    }

    /// Validate required environment variables
    pub fn validate_env(&self) -> Result<Secrets> {
        let required = [
            "OANDA_API_KEY",
            "OANDA_ACCOUNT_ID",
            "TELEGRAM_TOKEN",
            "TELEGRAM_CHAT_ID",
        ];

        for var in required {
            match std::env::var(var) {
                Ok(v) if !v.trim().is_empty() => {}
                _ => bail!("Required environment variable {} is not set", var),
            }
        }

        Ok(Secrets {
            oanda_api_key: std::env::var("OANDA_API_KEY")?,
            oanda_account_id: std::env::var("OANDA_ACCOUNT_ID")?,
            telegram_token: std::env::var("TELEGRAM_TOKEN")?,
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID")?,
        })
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = AppConfig::defaults().unwrap();
        assert_eq!(cfg.bot.instrument, "GBP_USD");
        assert_eq!(cfg.bot.units, 1000);
        assert!((cfg.strategy.min_confidence - 0.55).abs() < f64::EPSILON);
        assert_eq!(cfg.schedule.trade_interval_secs, 900);
        assert_eq!(cfg.schedule.heartbeat_interval_secs, 60);
        assert_eq!(
            cfg.schedule.retrain_time().unwrap(),
            NaiveTime::from_hms_opt(23, 0, 0).unwrap()
        );
        assert_eq!(
            cfg.schedule.heartbeat_reset_time().unwrap(),
            NaiveTime::from_hms_opt(0, 0, 0).unwrap()
        );
        cfg.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut cfg = AppConfig::defaults().unwrap();
        cfg.strategy.min_confidence = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_wall_clock() {
        let mut cfg = AppConfig::defaults().unwrap();
        cfg.schedule.retrain_at = "25:99".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_digest_has_no_secrets() {
        let cfg = AppConfig::defaults().unwrap();
        let digest = cfg.digest();
        assert!(digest.contains("instrument=GBP_USD"));
        assert!(!digest.to_lowercase().contains("token"));
    }
}
