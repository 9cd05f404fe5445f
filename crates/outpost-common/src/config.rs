//! Configuration for Outpost

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Messaging gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Inbound webhook configuration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Campaign dispatch defaults
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname used in logs and health output
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Operator bearer token (plaintext; compared via SHA-256 digest)
    pub auth_token: Option<String>,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            auth_token: None,
            cors_origins: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Messaging gateway (WhatsApp provider) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Provider API base URL
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    /// Provider API token; sends are refused when missing
    pub token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            token: None,
            timeout_secs: default_gateway_timeout(),
        }
    }
}

fn default_gateway_base_url() -> String {
    "https://gate.whapi.cloud".to_string()
}

fn default_gateway_timeout() -> u64 {
    30
}

/// Inbound webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhookConfig {
    /// Shared secret required on every webhook delivery; requests are
    /// rejected when unset or mismatched
    pub secret: Option<String>,
}

/// Campaign dispatch defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Default inter-message delay in milliseconds
    #[serde(default = "default_delay_ms")]
    pub default_delay_ms: i64,

    /// Default per-item retry budget
    #[serde(default = "default_max_retries")]
    pub default_max_retries: i32,

    /// Base retry backoff in milliseconds
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: i64,

    /// Sleep between polls when all pending items are waiting on backoff
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_delay_ms: default_delay_ms(),
            default_max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

fn default_delay_ms() -> i64 {
    2000
}

fn default_max_retries() -> i32 {
    3
}

fn default_retry_base_ms() -> i64 {
    5000
}

fn default_idle_poll_ms() -> u64 {
    1000
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/outpost/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let api = ApiConfig::default();
        assert_eq!(api.port, 8080);
        assert!(api.auth_token.is_none());

        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.default_delay_ms, 2000);
        assert_eq!(dispatch.default_max_retries, 3);
    }

    #[test]
    fn test_parse_minimal() {
        let config: Config = toml::from_str(
            r#"
            [database]
            url = "postgres://localhost/outpost"

            [gateway]
            token = "tok"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.url, "postgres://localhost/outpost");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.gateway.token.as_deref(), Some("tok"));
        assert_eq!(config.gateway.base_url, "https://gate.whapi.cloud");
        assert!(config.webhook.secret.is_none());
    }
}
