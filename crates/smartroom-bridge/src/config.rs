//! Bridge configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smartroom_types::Thresholds;
use smartroom_types::types::{DEFAULT_FAN_THRESHOLD, DEFAULT_LIGHT_THRESHOLD};

/// Environment variable overriding `mqtt.username`.
pub const ENV_MQTT_USERNAME: &str = "SMARTROOM_MQTT_USERNAME";
/// Environment variable overriding `mqtt.password`.
pub const ENV_MQTT_PASSWORD: &str = "SMARTROOM_MQTT_PASSWORD";

/// Bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Message bus settings.
    pub mqtt: MqttConfig,
    /// Sample aggregation settings.
    pub aggregator: AggregatorConfig,
    /// Initial control thresholds.
    pub thresholds: ThresholdConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Apply `SMARTROOM_MQTT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(username) = lookup(ENV_MQTT_USERNAME) {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = lookup(ENV_MQTT_PASSWORD) {
            self.mqtt.password = Some(password);
        }
    }

    /// Validate the configuration and return every problem found.
    ///
    /// # Example
    ///
    /// ```
    /// use smartroom_bridge::Config;
    ///
    /// let config = Config::default();
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.mqtt.validate());
        errors.extend(self.aggregator.validate());
        errors.extend(self.thresholds.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind: String,
    /// Capacity of the real-time event channel. Slow subscribers that fall
    /// further behind than this miss events.
    pub broadcast_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            broadcast_buffer: 100,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
        } else {
            match self.bind.rsplit_once(':') {
                None => errors.push(ValidationError::new(
                    "server.bind",
                    format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                )),
                Some((_, port)) => match port.parse::<u16>() {
                    Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                    Err(_) => errors.push(ValidationError::new(
                        "server.bind",
                        format!("invalid port '{}': must be a number 1-65535", port),
                    )),
                    Ok(_) => {}
                },
            }
        }

        if self.broadcast_buffer == 0 {
            errors.push(ValidationError::new(
                "server.broadcast_buffer",
                "broadcast buffer must be at least 1",
            ));
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: smartroom_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Message bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker URL (`mqtt://host:port` or `mqtts://host:port`).
    pub broker: String,
    /// Account name. Also the default feed owner.
    pub username: Option<String>,
    /// Account key.
    pub password: Option<String>,
    /// Client identifier. A random one is generated when unset.
    pub client_id: Option<String>,
    /// Topic prefix in front of every feed name. Defaults to `{username}/feeds`.
    pub feed_prefix: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive: u64,
    /// How long a command waits for the broker to acknowledge a publish.
    pub ack_timeout_secs: u64,
}

/// Minimum keep-alive interval in seconds.
pub const MIN_KEEP_ALIVE: u64 = 5;
/// Maximum acknowledgement timeout in seconds.
pub const MAX_ACK_TIMEOUT: u64 = 300;

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "mqtts://io.adafruit.com".to_string(),
            username: None,
            password: None,
            client_id: None,
            feed_prefix: None,
            keep_alive: 30,
            ack_timeout_secs: 10,
        }
    }
}

impl MqttConfig {
    /// Topic prefix, or `None` when neither a prefix nor a username is set.
    pub fn feed_prefix(&self) -> Option<String> {
        match (&self.feed_prefix, &self.username) {
            (Some(prefix), _) => Some(prefix.trim_end_matches('/').to_string()),
            (None, Some(username)) => Some(format!("{}/feeds", username)),
            (None, None) => None,
        }
    }

    /// Client identifier to connect with.
    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("smartroom-bridge-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Publish acknowledgement timeout.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    /// Validate bus configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = crate::mqtt::parse_broker_url(&self.broker) {
            errors.push(ValidationError::new(
                "mqtt.broker",
                format!("invalid broker URL '{}': {}", self.broker, e),
            ));
        }

        if let Some(prefix) = &self.feed_prefix
            && (prefix.trim_matches('/').is_empty() || prefix.contains(['#', '+']))
        {
            errors.push(ValidationError::new(
                "mqtt.feed_prefix",
                format!("invalid feed prefix '{}'", prefix),
            ));
        }

        if self.keep_alive < MIN_KEEP_ALIVE {
            errors.push(ValidationError::new(
                "mqtt.keep_alive",
                format!(
                    "keep alive {} is too short (minimum {} seconds)",
                    self.keep_alive, MIN_KEEP_ALIVE
                ),
            ));
        }

        if self.ack_timeout_secs == 0 || self.ack_timeout_secs > MAX_ACK_TIMEOUT {
            errors.push(ValidationError::new(
                "mqtt.ack_timeout_secs",
                format!(
                    "ack timeout {} must be between 1 and {} seconds",
                    self.ack_timeout_secs, MAX_ACK_TIMEOUT
                ),
            ));
        }

        errors
    }
}

/// Sample aggregation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Quiet period after the last sensor update before a sample is closed.
    pub debounce_ms: u64,
}

/// Maximum debounce window in milliseconds (10 minutes).
pub const MAX_DEBOUNCE_MS: u64 = 600_000;

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { debounce_ms: 3000 }
    }
}

impl AggregatorConfig {
    /// Debounce window as a duration.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Validate aggregation configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.debounce_ms == 0 || self.debounce_ms > MAX_DEBOUNCE_MS {
            errors.push(ValidationError::new(
                "aggregator.debounce_ms",
                format!(
                    "debounce {} must be between 1 and {} milliseconds",
                    self.debounce_ms, MAX_DEBOUNCE_MS
                ),
            ));
        }

        errors
    }
}

/// Thresholds in force at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Fan threshold (degrees Celsius).
    pub fan: f64,
    /// Light threshold.
    pub light: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            fan: DEFAULT_FAN_THRESHOLD,
            light: DEFAULT_LIGHT_THRESHOLD,
        }
    }
}

impl ThresholdConfig {
    /// The configured pair.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            fan: self.fan,
            light: self.light,
        }
    }

    /// Validate threshold configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, value) in [("thresholds.fan", self.fan), ("thresholds.light", self.light)] {
            if !value.is_finite() {
                errors.push(ValidationError::new(field, "threshold must be a finite number"));
            }
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `mqtt.broker`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smartroom")
        .join("bridge.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert_eq!(config.server.broadcast_buffer, 100);
        assert_eq!(config.mqtt.broker, "mqtts://io.adafruit.com");
        assert_eq!(config.mqtt.ack_timeout(), Duration::from_secs(10));
        assert_eq!(config.aggregator.debounce(), Duration::from_millis(3000));
        assert_eq!(config.thresholds.thresholds(), Thresholds::default());
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.path, smartroom_store::default_db_path());
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [server]
            bind = "127.0.0.1:8080"
            broadcast_buffer = 16

            [storage]
            path = "/data/smartroom.db"

            [mqtt]
            broker = "mqtt://localhost:1883"
            username = "alice"
            keep_alive = 60
            ack_timeout_secs = 3

            [aggregator]
            debounce_ms = 500

            [thresholds]
            fan = 28.5
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.server.broadcast_buffer, 16);
        assert_eq!(config.storage.path, PathBuf::from("/data/smartroom.db"));
        assert_eq!(config.mqtt.username.as_deref(), Some("alice"));
        assert_eq!(config.mqtt.ack_timeout_secs, 3);
        assert_eq!(config.aggregator.debounce_ms, 500);
        assert_eq!(config.thresholds.fan, 28.5);
        assert_eq!(config.thresholds.light, DEFAULT_LIGHT_THRESHOLD);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("bridge.toml");

        let mut config = Config::default();
        config.server.bind = "0.0.0.0:9090".to_string();
        config.storage.path = PathBuf::from("/tmp/test.db");
        config.mqtt.username = Some("alice".to_string());
        config.aggregator.debounce_ms = 1500;

        config.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(loaded.server.bind, "0.0.0.0:9090");
        assert_eq!(loaded.storage.path, PathBuf::from("/tmp/test.db"));
        assert_eq!(loaded.mqtt.username.as_deref(), Some("alice"));
        assert_eq!(loaded.aggregator.debounce_ms, 1500);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/bridge.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("smartroom/bridge.toml"));
    }

    #[test]
    fn test_feed_prefix_resolution() {
        let mut mqtt = MqttConfig::default();
        assert_eq!(mqtt.feed_prefix(), None);

        mqtt.username = Some("alice".to_string());
        assert_eq!(mqtt.feed_prefix().as_deref(), Some("alice/feeds"));

        mqtt.feed_prefix = Some("home/room1/".to_string());
        assert_eq!(mqtt.feed_prefix().as_deref(), Some("home/room1"));
    }

    #[test]
    fn test_client_id() {
        let mut mqtt = MqttConfig::default();
        assert!(mqtt.client_id().starts_with("smartroom-bridge-"));

        mqtt.client_id = Some("room-1".to_string());
        assert_eq!(mqtt.client_id(), "room-1");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.mqtt.username = Some("from-file".to_string());

        config.apply_overrides_from(|key| match key {
            ENV_MQTT_USERNAME => Some("from-env".to_string()),
            ENV_MQTT_PASSWORD => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.mqtt.username.as_deref(), Some("from-env"));
        assert_eq!(config.mqtt.password, None);
    }

    #[test]
    fn test_server_bind_validation() {
        let mut server = ServerConfig::default();
        assert!(server.validate().is_empty());

        server.bind = "[::1]:8080".to_string();
        assert!(server.validate().is_empty());

        server.bind = "".to_string();
        assert!(server.validate()[0].message.contains("cannot be empty"));

        server.bind = "127.0.0.1".to_string();
        assert!(server.validate()[0].message.contains("host:port"));

        server.bind = "127.0.0.1:0".to_string();
        assert!(server.validate()[0].message.contains("cannot be 0"));

        server.bind = "127.0.0.1:abc".to_string();
        assert!(server.validate()[0].message.contains("must be a number"));
    }

    #[test]
    fn test_mqtt_validation() {
        let mqtt = MqttConfig {
            broker: "http://localhost".to_string(),
            feed_prefix: Some("alice/#".to_string()),
            keep_alive: 1,
            ack_timeout_secs: 0,
            ..MqttConfig::default()
        };

        let errors = mqtt.validate();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "mqtt.broker",
                "mqtt.feed_prefix",
                "mqtt.keep_alive",
                "mqtt.ack_timeout_secs"
            ]
        );
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.server.broadcast_buffer = 0;
        config.storage.path = PathBuf::new();
        config.aggregator.debounce_ms = 0;
        config.thresholds.light = f64::NAN;

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 4);
                let display = ConfigError::Validation(errors).to_string();
                assert!(display.contains("aggregator.debounce_ms"));
                assert!(display.contains("thresholds.light"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
