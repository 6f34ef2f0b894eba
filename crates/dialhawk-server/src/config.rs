//! Server configuration loading from file and environment variables.

use dialhawk_voice::{ReplyConfig, SttConfig, TtsConfig};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Live speech-recognition settings.
    #[serde(default)]
    pub stt: SttConfig,

    /// Reply generation settings.
    #[serde(default)]
    pub reply: ReplyConfig,

    /// Speech synthesis settings.
    #[serde(default)]
    pub tts: TtsConfig,

    /// Telephony provider settings.
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Dispatch engine settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Optional calendar-booking webhook; booking intents are forwarded
    /// here. Empty disables booking.
    #[serde(default)]
    pub booking_url: String,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "dialhawk_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Telephony provider credentials and addressing.
#[derive(Clone, Default, Deserialize)]
pub struct TelephonyConfig {
    /// REST API base, e.g. "https://api.twilio.com".
    #[serde(default = "default_telephony_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    /// Caller ID for outbound calls.
    #[serde(default)]
    pub from_number: String,
    /// Public base URL of this server; the provider fetches call
    /// instructions from and posts status callbacks to it.
    #[serde(default)]
    pub public_url: String,
}

impl std::fmt::Debug for TelephonyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelephonyConfig")
            .field("api_url", &self.api_url)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("from_number", &self.from_number)
            .field("public_url", &self.public_url)
            .finish()
    }
}

/// Dispatch engine tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Number of concurrent call workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Idle worker poll interval, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Autopilot sweep interval, in seconds. 0 disables the sweep.
    #[serde(default = "default_autopilot_interval_seconds")]
    pub autopilot_interval_seconds: u64,

    /// Usage reset tick interval, in seconds. 0 disables resets.
    #[serde(default = "default_reset_interval_seconds")]
    pub usage_reset_interval_seconds: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "dialhawk.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_telephony_api_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_workers() -> usize {
    2
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_autopilot_interval_seconds() -> u64 {
    300
}

fn default_reset_interval_seconds() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            autopilot_interval_seconds: default_autopilot_interval_seconds(),
            usage_reset_interval_seconds: default_reset_interval_seconds(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `DIALHAWK_HOST` / `DIALHAWK_PORT` override the bind address
/// - `DIALHAWK_DB_PATH` overrides `database.path`
/// - `DIALHAWK_LOG_LEVEL` / `DIALHAWK_LOG_JSON` override logging
/// - `DEEPGRAM_API_KEY`, `OPENAI_API_KEY`, `ELEVENLABS_API_KEY`
///   override the upstream service keys
/// - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_FROM_NUMBER`
///   override the telephony credentials
/// - `DIALHAWK_PUBLIC_URL` overrides `telephony.public_url`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(host) = std::env::var("DIALHAWK_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("DIALHAWK_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("DIALHAWK_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("DIALHAWK_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("DIALHAWK_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(key) = std::env::var("DEEPGRAM_API_KEY") {
        config.stt.api_key = key;
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        config.reply.api_key = key;
    }
    if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
        config.tts.api_key = key;
    }
    if let Ok(sid) = std::env::var("TWILIO_ACCOUNT_SID") {
        config.telephony.account_sid = sid;
    }
    if let Ok(token) = std::env::var("TWILIO_AUTH_TOKEN") {
        config.telephony.auth_token = token;
    }
    if let Ok(number) = std::env::var("TWILIO_FROM_NUMBER") {
        config.telephony.from_number = number;
    }
    if let Ok(url) = std::env::var("DIALHAWK_PUBLIC_URL") {
        config.telephony.public_url = url;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file() {
        let config = load_config(None).expect("defaults should load");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.path, "dialhawk.db");
        assert_eq!(config.dispatch.workers, 2);
        assert_eq!(config.dispatch.usage_reset_interval_seconds, 60);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [server]
            port = 8080

            [dispatch]
            workers = 4

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        let config = load_config(path.to_str()).expect("should parse");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.dispatch.workers, 4);
        assert_eq!(config.logging.level, "debug");
        // Untouched sections keep defaults.
        assert_eq!(config.database.pool_max_size, 8);
    }

    #[test]
    fn telephony_debug_redacts_token() {
        let mut config = TelephonyConfig::default();
        config.auth_token = "tw-secret".into();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("tw-secret"));
    }
}
