//! Configuration for Mailpilot

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

    /// Outbound SMTP relay configuration
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Google OAuth configuration (refresh-token exchange)
    #[serde(default)]
    pub google: GoogleConfig,

    /// Open-tracking configuration
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Sweep configuration
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname
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
    /// Database URL (PostgreSQL)
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

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Outbound SMTP relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host
    #[serde(default = "default_relay_host")]
    pub relay_host: String,

    /// Relay port (STARTTLS submission)
    #[serde(default = "default_relay_port")]
    pub relay_port: u16,

    /// Per-send timeout in seconds
    #[serde(default = "default_send_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            relay_host: default_relay_host(),
            relay_port: default_relay_port(),
            timeout_secs: default_send_timeout(),
        }
    }
}

fn default_relay_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_relay_port() -> u16 {
    587
}

fn default_send_timeout() -> u64 {
    30
}

/// Google OAuth configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// OAuth client id
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,

    /// Token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_url: default_token_url(),
        }
    }
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Open-tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrackingConfig {
    /// Public base URL for tracking-pixel links. When unset, the API layer
    /// derives an origin from the incoming request.
    pub public_url: Option<String>,
}

/// Sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Interval between sweep ticks in seconds
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,

    /// Maximum due items fetched per tick
    #[serde(default = "default_sweep_batch")]
    pub batch_size: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
            batch_size: default_sweep_batch(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    15
}

fn default_sweep_batch() -> i64 {
    25
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

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/mailpilot/config.toml"),
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

    #[test]
    fn test_default_config() {
        let sweep = SweepConfig::default();
        assert_eq!(sweep.interval_secs, 15);
        assert_eq!(sweep.batch_size, 25);

        let smtp = SmtpConfig::default();
        assert_eq!(smtp.relay_host, "smtp.gmail.com");
        assert_eq!(smtp.relay_port, 587);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
hostname = "mail.example.com"

[database]
url = "postgres://localhost/mailpilot"

[tracking]
public_url = "https://mail.example.com"

[sweep]
interval_secs = 5
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.hostname, "mail.example.com");
        assert_eq!(config.database.url, "postgres://localhost/mailpilot");
        assert_eq!(
            config.tracking.public_url.as_deref(),
            Some("https://mail.example.com")
        );
        assert_eq!(config.sweep.interval_secs, 5);
        assert_eq!(config.sweep.batch_size, 25);
    }
}
