use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Service token for operational access (metrics scrapes, admin tooling)
    #[serde(default = "default_service_token")]
    pub service_token: String,
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            service_token: default_service_token(),
            session_ttl_days: default_session_ttl_days(),
        }
    }
}

fn default_service_token() -> String {
    // Generate a random token if not provided
    uuid::Uuid::new_v4().to_string()
}

fn default_session_ttl_days() -> i64 {
    7
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    /// Base URL of the Cashfree order API
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Attempts while waiting for the payment record to appear
    #[serde(default = "default_lookup_attempts")]
    pub lookup_attempts: u32,
    #[serde(default = "default_lookup_delay")]
    pub lookup_delay_secs: u64,
    /// Attempts while the gateway still reports the order as pending
    #[serde(default = "default_pending_attempts")]
    pub pending_attempts: u32,
    #[serde(default = "default_pending_delay")]
    pub pending_delay_secs: u64,
    /// Automatic retries after an unexpected verification error
    #[serde(default = "default_error_attempts")]
    pub error_attempts: u32,
    #[serde(default = "default_error_delay")]
    pub error_delay_secs: u64,
    #[serde(default = "default_manual_retries")]
    pub max_manual_retries: u32,
    #[serde(default = "default_support_url")]
    pub support_url: String,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            client_id: None,
            client_secret: None,
            lookup_attempts: default_lookup_attempts(),
            lookup_delay_secs: default_lookup_delay(),
            pending_attempts: default_pending_attempts(),
            pending_delay_secs: default_pending_delay(),
            error_attempts: default_error_attempts(),
            error_delay_secs: default_error_delay(),
            max_manual_retries: default_manual_retries(),
            support_url: default_support_url(),
        }
    }
}

fn default_gateway_url() -> String {
    "https://api.cashfree.com/pg".to_string()
}

fn default_lookup_attempts() -> u32 {
    8
}

fn default_lookup_delay() -> u64 {
    3
}

fn default_pending_attempts() -> u32 {
    12
}

fn default_pending_delay() -> u64 {
    4
}

fn default_error_attempts() -> u32 {
    5
}

fn default_error_delay() -> u64 {
    5
}

fn default_manual_retries() -> u32 {
    3
}

fn default_support_url() -> String {
    "/support?topic=payments".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_sweeper_enabled")]
    pub enabled: bool,
    /// Interval between expiry sweeps in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweeper_enabled(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_sweeper_enabled() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Tutordesk".to_string()
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_confirmation_cadences() {
        let config = PaymentsConfig::default();
        assert_eq!(config.lookup_attempts, 8);
        assert_eq!(config.lookup_delay_secs, 3);
        assert_eq!(config.pending_attempts, 12);
        assert_eq!(config.pending_delay_secs, 4);
        assert_eq!(config.error_attempts, 5);
        assert_eq!(config.error_delay_secs, 5);
        assert_eq!(config.max_manual_retries, 3);
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            api_port = 9000

            [sweeper]
            sweep_interval_seconds = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.server.api_port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.sweeper.sweep_interval_seconds, 30);
        assert!(config.sweeper.enabled);
    }
}
