use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::core_types::{Bps, Coins};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Mirror log lines to stdout (text mode only)
    #[serde(default = "default_true")]
    pub log_stdout: bool,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub orders: OrderConfig,
    #[serde(default)]
    pub payments: PaymentConfig,
    /// PostgreSQL connection URL; in-memory stores are used when absent
    #[serde(default)]
    pub postgres_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "service_ledger.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            log_stdout: true,
            ledger: LedgerConfig::default(),
            orders: OrderConfig::default(),
            payments: PaymentConfig::default(),
            postgres_url: None,
        }
    }
}

/// Optimistic-write retry policy and wallet defaults
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Total attempts per conditional write (first try included)
    pub max_attempts: u32,
    /// Delay before retry n is `backoff_base_ms * n`
    pub backoff_base_ms: u64,
    /// Random spread applied to each delay, 0.0..=1.0
    #[serde(default)]
    pub backoff_jitter_pct: f64,
    /// Coins granted when a wallet is created lazily
    pub signup_bonus_coins: Coins,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 50,
            backoff_jitter_pct: 0.0,
            signup_bonus_coins: 100,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderConfig {
    /// Platform fee applied when an order is created without one
    pub default_platform_fee_bps: Bps,
    /// How long after payment a refund may still be requested
    pub refund_window_hours: u64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            default_platform_fee_bps: 500,
            refund_window_hours: 24 * 7,
        }
    }
}

impl OrderConfig {
    pub fn refund_window(&self) -> Duration {
        Duration::from_secs(self.refund_window_hours.saturating_mul(3600))
    }
}

/// URLs handed to third-party gateways with every checkout
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaymentConfig {
    /// Where the gateway sends the buyer after paying
    pub return_url: String,
    /// Where the gateway posts its asynchronous callback
    pub notify_url: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            return_url: "http://localhost:8080/orders/paid".to_string(),
            notify_url: "http://localhost:8080/payments/notify".to_string(),
        }
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml_str(&content).with_context(|| format!("Invalid config: {}", config_path))
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(content).context("Failed to parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.ledger.max_attempts == 0 {
            anyhow::bail!("ledger.max_attempts must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.ledger.backoff_jitter_pct) {
            anyhow::bail!("ledger.backoff_jitter_pct must be within 0.0..=1.0");
        }
        if u64::from(self.orders.default_platform_fee_bps) > crate::core_types::BPS_DENOMINATOR {
            anyhow::bail!("orders.default_platform_fee_bps cannot exceed 10000");
        }
        Ok(())
    }
}
