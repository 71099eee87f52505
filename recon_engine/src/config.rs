//! Engine configuration.
//!
//! Configuration is read from environment variables by [`ReconConfig::from_env_or_default`]. Invalid values are logged
//! and replaced with their defaults, so loading the configuration never fails.
use std::{fmt::Display, str::FromStr, time::Duration};

use log::*;
use recon_common::{
    helpers::{parse_boolean_flag, parse_env_var},
    Amount,
    Secret,
};
use thiserror::Error;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_TIMING_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_ASYNC_QUEUE_SIZE: usize = 1024;
pub const DEFAULT_ASYNC_WORKERS: u32 = 5;

#[derive(Debug, Clone, Error)]
#[error("Invalid configuration value: {0}")]
pub struct ConfigError(String);

#[derive(Clone, Debug)]
pub struct ReconConfig {
    /// When false, every reconciliation entry point is rejected.
    pub enabled: bool,
    /// Create the reconciliation tables on start-up if they do not exist.
    pub auto_init_tables: bool,
    /// The maximum absolute difference between the paid amount and the accounted-for amount that still passes.
    pub amount_tolerance: Amount,
    /// The page size used by the batch sweep.
    pub batch_size: usize,
    pub timing: TimingConfig,
    pub alarm: AlarmConfig,
    pub async_refund: AsyncRefundConfig,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_init_tables: true,
            amount_tolerance: default_amount_tolerance(),
            batch_size: DEFAULT_BATCH_SIZE,
            timing: TimingConfig::default(),
            alarm: AlarmConfig::default(),
            async_refund: AsyncRefundConfig::default(),
        }
    }
}

/// The default amount tolerance, 0.01
pub fn default_amount_tolerance() -> Amount {
    Amount::new(1, 2)
}

#[derive(Clone, Debug)]
pub struct TimingConfig {
    /// Whether the scheduled daily sweep runs at all.
    pub enabled: bool,
    /// How often the scheduled sweep runs.
    pub interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self { enabled: false, interval: DEFAULT_TIMING_INTERVAL }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlarmType {
    /// Alarms are only written to the log.
    #[default]
    Log,
    /// Alarms are written to the log and posted to a DingTalk robot webhook.
    DingTalk,
}

impl FromStr for AlarmType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "dingtalk" => Ok(Self::DingTalk),
            other => Err(ConfigError(format!("{other} is not a valid alarm type. Use 'log' or 'dingtalk'"))),
        }
    }
}

impl Display for AlarmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Log => write!(f, "log"),
            Self::DingTalk => write!(f, "dingtalk"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AlarmConfig {
    pub alarm_type: AlarmType,
    pub dingtalk_webhook_url: Secret<String>,
}

impl AlarmConfig {
    pub fn dingtalk<S: Into<String>>(webhook_url: S) -> Self {
        Self { alarm_type: AlarmType::DingTalk, dingtalk_webhook_url: Secret::new(webhook_url.into()) }
    }
}

#[derive(Clone, Debug)]
pub struct AsyncRefundConfig {
    /// Capacity of the async refund queue. Jobs submitted to a full queue are rejected and alarmed.
    pub queue_size: usize,
    /// Maximum number of refund jobs executing at the same time.
    pub workers: u32,
}

impl Default for AsyncRefundConfig {
    fn default() -> Self {
        Self { queue_size: DEFAULT_ASYNC_QUEUE_SIZE, workers: DEFAULT_ASYNC_WORKERS }
    }
}

impl ReconConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        let enabled = parse_boolean_flag(std::env::var("RECON_ENABLED").ok(), defaults.enabled);
        if !enabled {
            warn!("🪛️ RECON_ENABLED is off. All reconciliation requests will be rejected.");
        }
        let auto_init_tables =
            parse_boolean_flag(std::env::var("RECON_AUTO_INIT_TABLES").ok(), defaults.auto_init_tables);
        let amount_tolerance = env_or("RECON_AMOUNT_TOLERANCE", defaults.amount_tolerance);
        let amount_tolerance = if amount_tolerance.is_negative() {
            error!("🪛️ RECON_AMOUNT_TOLERANCE cannot be negative. Using the default, {}.", defaults.amount_tolerance);
            defaults.amount_tolerance
        } else {
            amount_tolerance
        };
        let batch_size = match env_or("RECON_BATCH_SIZE", defaults.batch_size) {
            0 => {
                error!("🪛️ RECON_BATCH_SIZE must be at least 1. Using the default, {DEFAULT_BATCH_SIZE}.");
                DEFAULT_BATCH_SIZE
            },
            n => n,
        };
        let timing = TimingConfig {
            enabled: parse_boolean_flag(std::env::var("RECON_TIMING_ENABLED").ok(), defaults.timing.enabled),
            interval: Duration::from_secs(
                env_or("RECON_TIMING_INTERVAL_SECS", defaults.timing.interval.as_secs()).max(1),
            ),
        };
        let alarm = AlarmConfig::from_env_or_default();
        let async_refund = AsyncRefundConfig {
            queue_size: env_or("RECON_ASYNC_QUEUE_SIZE", defaults.async_refund.queue_size).max(1),
            workers: env_or("RECON_ASYNC_WORKERS", defaults.async_refund.workers).max(1),
        };
        Self { enabled, auto_init_tables, amount_tolerance, batch_size, timing, alarm, async_refund }
    }
}

impl AlarmConfig {
    pub fn from_env_or_default() -> Self {
        let alarm_type = env_or("RECON_ALARM_TYPE", AlarmType::default());
        let url = std::env::var("RECON_ALARM_DINGTALK_WEBHOOK_URL").unwrap_or_default();
        if alarm_type == AlarmType::DingTalk && url.trim().is_empty() {
            warn!(
                "🪛️ RECON_ALARM_TYPE is dingtalk, but RECON_ALARM_DINGTALK_WEBHOOK_URL is not set. Alarms will only be \
                 logged."
            );
        }
        Self { alarm_type, dingtalk_webhook_url: Secret::new(url) }
    }
}

/// Reads an environment variable, falling back to `default` (and logging the problem) when it is unset or invalid.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match parse_env_var::<T>(name) {
        Ok(Some(value)) => value,
        Ok(None) => {
            debug!("🪛️ {name} is not set. Using the default, {default}.");
            default
        },
        Err(e) => {
            error!("🪛️ {e} Using the default, {default}, instead.");
            default
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = ReconConfig::default();
        assert!(config.enabled);
        assert!(config.auto_init_tables);
        assert_eq!(config.amount_tolerance, Amount::new(1, 2));
        assert_eq!(config.batch_size, 1000);
        assert!(!config.timing.enabled);
        assert_eq!(config.alarm.alarm_type, AlarmType::Log);
        assert_eq!(config.async_refund.workers, 5);
    }

    #[test]
    fn alarm_types() {
        assert_eq!("DingTalk".parse::<AlarmType>().unwrap(), AlarmType::DingTalk);
        assert_eq!(" log ".parse::<AlarmType>().unwrap(), AlarmType::Log);
        assert!("email".parse::<AlarmType>().is_err());
    }

    #[test]
    fn from_env() {
        std::env::set_var("RECON_BATCH_SIZE", "250");
        std::env::set_var("RECON_AMOUNT_TOLERANCE", "0.05");
        std::env::set_var("RECON_ASYNC_WORKERS", "not-a-number");
        let config = ReconConfig::from_env_or_default();
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.amount_tolerance, Amount::new(5, 2));
        assert_eq!(config.async_refund.workers, DEFAULT_ASYNC_WORKERS);
        std::env::remove_var("RECON_BATCH_SIZE");
        std::env::remove_var("RECON_AMOUNT_TOLERANCE");
        std::env::remove_var("RECON_ASYNC_WORKERS");
    }
}
