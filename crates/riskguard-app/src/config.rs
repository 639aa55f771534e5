//! Application configuration.

use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Broker backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Client Portal REST API.
    #[default]
    Rest,
    /// TWS socket API.
    Tws,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub tws: TwsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Risk calculation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RiskConfig {
    /// Accounts covered by reports and protect operations.
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    /// Assumed exit loss (percent of entry price) for unprotected positions.
    #[serde(default = "default_unprotected_loss_percentage")]
    pub unprotected_loss_percentage: Decimal,
}

fn default_base_currency() -> String {
    "EUR".to_string()
}

fn default_unprotected_loss_percentage() -> Decimal {
    Decimal::from(50)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            base_currency: default_base_currency(),
            unprotected_loss_percentage: default_unprotected_loss_percentage(),
        }
    }
}

/// Client Portal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RestConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Session cookie injected into every request when set.
    #[serde(default)]
    pub session_cookie: Option<String>,
    /// Pause after an account switch. The gateway's server-side state is not
    /// observable; shorter pauses have produced stale reads.
    #[serde(default = "default_switch_delay_ms")]
    pub switch_delay_ms: u64,
    /// Pause between the refresh-triggering orders call and the read.
    #[serde(default = "default_refresh_delay_ms")]
    pub refresh_delay_ms: u64,
    /// The local gateway serves a self-signed certificate.
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
}

fn default_base_url() -> String {
    "https://localhost:5000/v1/api".to_string()
}

fn default_switch_delay_ms() -> u64 {
    200
}

fn default_refresh_delay_ms() -> u64 {
    300
}

fn default_accept_invalid_certs() -> bool {
    true
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_cookie: None,
            switch_delay_ms: default_switch_delay_ms(),
            refresh_delay_ms: default_refresh_delay_ms(),
            accept_invalid_certs: default_accept_invalid_certs(),
        }
    }
}

/// TWS socket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TwsConfig {
    #[serde(default = "default_tws_host")]
    pub host: String,
    #[serde(default = "default_tws_port")]
    pub port: u16,
    #[serde(default = "default_tws_client_id")]
    pub client_id: i32,
}

fn default_tws_host() -> String {
    "127.0.0.1".to_string()
}

fn default_tws_port() -> u16 {
    4001
}

fn default_tws_client_id() -> i32 {
    1
}

impl Default for TwsConfig {
    fn default() -> Self {
        Self {
            host: default_tws_host(),
            port: default_tws_port(),
            client_id: default_tws_client_id(),
        }
    }
}

/// Telemetry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `RISKGUARD_CONFIG` or the default path.
    pub fn load() -> AppResult<Self> {
        let config_path = std::env::var("RISKGUARD_CONFIG")
            .unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Reject configurations the services cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.risk.accounts.is_empty() {
            return Err(AppError::Config(
                "risk.accounts must list at least one account".to_string(),
            ));
        }
        if self.risk.unprotected_loss_percentage <= Decimal::ZERO {
            return Err(AppError::Config(
                "risk.unprotected-loss-percentage must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
