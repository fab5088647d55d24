//! Configuration loading for Counterpart.
//!
//! Configuration is loaded from a TOML file. Every section and field is
//! optional; missing values fall back to the defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartConfig {
    /// Mesh transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Liveness configuration.
    #[serde(default)]
    pub liveness: LivenessConfig,
    /// Heart-rate display configuration.
    #[serde(default)]
    pub heart_rate: HeartRateConfig,
    /// Sensor configuration.
    #[serde(default)]
    pub sensor: SensorConfig,
    /// Sender configuration.
    #[serde(default)]
    pub sender: SenderConfig,
    /// Relay configuration.
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Mesh transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Upper bound for every transport call in milliseconds (default: 10000).
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

/// Where remote liveness is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessSource {
    /// `alive` / `inactive` messages on the status path.
    Messages,
    /// Advertisement of the active capability.
    Capability,
}

/// Liveness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Liveness source (default: messages).
    #[serde(default = "default_liveness_source")]
    pub source: LivenessSource,
    /// Interval between keep-alive messages in seconds (default: 15).
    #[serde(default = "default_keep_alive_interval_secs")]
    pub keep_alive_interval_secs: u64,
    /// Missed-interval multiplier before the remote is inactive (default: 2).
    #[serde(default = "default_timeout_multiplier")]
    pub timeout_multiplier: u32,
}

/// Heart-rate display configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartRateConfig {
    /// Seconds a reading stays visible without a new sample (default: 10).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

/// Sensor implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Random walk around a baseline.
    Simulated,
    /// Replays a fixed list of readings.
    Scripted,
}

/// Sensor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Sensor implementation (default: simulated).
    #[serde(default = "default_sensor_kind")]
    pub kind: SensorKind,
    /// Milliseconds between readings (default: 1000).
    #[serde(default = "default_sensor_interval_ms")]
    pub interval_ms: u64,
    /// Starting BPM of the simulated sensor (default: 72).
    #[serde(default = "default_baseline_bpm")]
    pub baseline_bpm: u8,
    /// Readings replayed by the scripted sensor.
    #[serde(default)]
    pub script: Vec<u8>,
}

/// Sender implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    /// Heart-rate channel over the mesh.
    Mesh,
    /// TCP relay.
    Relay,
}

/// Sender configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Sender implementation (default: mesh).
    #[serde(default = "default_sender_kind")]
    pub kind: SenderKind,
}

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Relay address (default: 127.0.0.1:7400).
    #[serde(default = "default_relay_address")]
    pub address: String,
    /// Connect timeout in seconds (default: 15).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

// Default value functions
fn default_call_timeout_ms() -> u64 {
    10_000
}

fn default_liveness_source() -> LivenessSource {
    LivenessSource::Messages
}

fn default_keep_alive_interval_secs() -> u64 {
    15
}

fn default_timeout_multiplier() -> u32 {
    2
}

fn default_ttl_secs() -> u64 {
    10
}

fn default_sensor_kind() -> SensorKind {
    SensorKind::Simulated
}

fn default_sensor_interval_ms() -> u64 {
    1000
}

fn default_baseline_bpm() -> u8 {
    72
}

fn default_sender_kind() -> SenderKind {
    SenderKind::Mesh
}

fn default_relay_address() -> String {
    "127.0.0.1:7400".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    15
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            source: default_liveness_source(),
            keep_alive_interval_secs: default_keep_alive_interval_secs(),
            timeout_multiplier: default_timeout_multiplier(),
        }
    }
}

impl Default for HeartRateConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            kind: default_sensor_kind(),
            interval_ms: default_sensor_interval_ms(),
            baseline_bpm: default_baseline_bpm(),
            script: Vec::new(),
        }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            kind: default_sender_kind(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            address: default_relay_address(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for CounterpartConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            liveness: LivenessConfig::default(),
            heart_rate: HeartRateConfig::default(),
            sensor: SensorConfig::default(),
            sender: SenderConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl CounterpartConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.transport.call_timeout_ms == 0, "transport.call_timeout_ms must be > 0"),
            (
                self.liveness.keep_alive_interval_secs == 0,
                "liveness.keep_alive_interval_secs must be > 0",
            ),
            (
                self.liveness.timeout_multiplier == 0,
                "liveness.timeout_multiplier must be >= 1",
            ),
            (self.heart_rate.ttl_secs == 0, "heart_rate.ttl_secs must be > 0"),
            (self.sensor.interval_ms == 0, "sensor.interval_ms must be > 0"),
            (
                self.sensor.kind == SensorKind::Scripted && self.sensor.script.is_empty(),
                "sensor.script must not be empty for the scripted sensor",
            ),
            (
                self.relay.connect_timeout_secs == 0,
                "relay.connect_timeout_secs must be > 0",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::Invalid(message.to_string())),
            None => Ok(()),
        }
    }

    /// Upper bound for transport calls.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.transport.call_timeout_ms)
    }

    /// Interval between keep-alive messages.
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.liveness.keep_alive_interval_secs)
    }

    /// Freshness window of the displayed heart rate.
    pub fn heart_rate_ttl(&self) -> Duration {
        Duration::from_secs(self.heart_rate.ttl_secs)
    }

    /// Interval between sensor readings.
    pub fn sensor_interval(&self) -> Duration {
        Duration::from_millis(self.sensor.interval_ms)
    }

    /// Relay connect timeout.
    pub fn relay_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.relay.connect_timeout_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = CounterpartConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.call_timeout(), Duration::from_secs(10));
        assert_eq!(config.keep_alive_interval(), Duration::from_secs(15));
        assert_eq!(config.liveness.timeout_multiplier, 2);
        assert_eq!(config.liveness.source, LivenessSource::Messages);
        assert_eq!(config.relay_connect_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[transport]
call_timeout_ms = 2500

[liveness]
source = "capability"
keep_alive_interval_secs = 5
timeout_multiplier = 3

[heart_rate]
ttl_secs = 4

[sensor]
kind = "scripted"
interval_ms = 500
script = [70, 71, 72]

[sender]
kind = "relay"

[relay]
address = "10.0.0.2:9000"
connect_timeout_secs = 3
"#;

        let config = CounterpartConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.call_timeout(), Duration::from_millis(2500));
        assert_eq!(config.liveness.source, LivenessSource::Capability);
        assert_eq!(config.keep_alive_interval(), Duration::from_secs(5));
        assert_eq!(config.liveness.timeout_multiplier, 3);
        assert_eq!(config.heart_rate_ttl(), Duration::from_secs(4));
        assert_eq!(config.sensor.kind, SensorKind::Scripted);
        assert_eq!(config.sensor.script, vec![70, 71, 72]);
        assert_eq!(config.sender.kind, SenderKind::Relay);
        assert_eq!(config.relay.address, "10.0.0.2:9000");
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config = CounterpartConfig::from_toml_str("").unwrap();
        assert_eq!(config, CounterpartConfig::default());

        let config = CounterpartConfig::from_toml_str("[liveness]\ntimeout_multiplier = 4\n").unwrap();
        assert_eq!(config.liveness.timeout_multiplier, 4);
        assert_eq!(config.liveness.keep_alive_interval_secs, 15);
    }

    #[test]
    fn zero_multiplier_is_rejected() {
        let err = CounterpartConfig::from_toml_str("[liveness]\ntimeout_multiplier = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn scripted_sensor_needs_script() {
        let err = CounterpartConfig::from_toml_str("[sensor]\nkind = \"scripted\"\n").unwrap_err();
        assert!(err.to_string().contains("sensor.script"));
    }

    #[test]
    fn unknown_source_is_parse_error() {
        let err = CounterpartConfig::from_toml_str("[liveness]\nsource = \"psychic\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[heart_rate]\nttl_secs = 7").unwrap();

        let config = CounterpartConfig::load(file.path()).unwrap();
        assert_eq!(config.heart_rate.ttl_secs, 7);
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let err = CounterpartConfig::load(Path::new("/nonexistent/counterpart.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
