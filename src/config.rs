//! Bridge configuration
//!
//! Loaded once at startup from a TOML file. Every section and field has a
//! default so a partial file (or none at all) still yields a usable setup.
//!
//! ```text
//! [mqtt]      client id, broker address, keep-alive, credentials
//! [sensor]    telemetry topic and publish interval
//! [control]   joystick topic
//! [display]   display topic, action names, scroll speed
//! [hardware]  I2C bus and optional device overrides
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::display::command::DisplayActions;
use crate::mqtt::config::MqttConfig;

/// Directory below `$HOME` searched when the given config file is missing.
pub const CONFIG_DIR: &str = ".sensebridge";
pub const DEFAULT_CONFIG_FILE: &str = "sensebridge.toml";

/// Accepted range for `sensor.publish_freq`, in seconds
pub const MIN_PUBLISH_INTERVAL: Duration = Duration::from_millis(1);
pub const MAX_PUBLISH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub mqtt: MqttConfig,
    pub sensor: SensorConfig,
    pub control: ControlConfig,
    pub display: DisplayConfig,
    pub hardware: HardwareConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    pub topic: String,
    /// Seconds between two published readings
    pub publish_freq: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            topic: "sensor".to_string(),
            publish_freq: 5.0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    pub topic: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            topic: "control".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub topic: String,
    pub clear: String,
    pub text: String,
    pub draw: String,
    /// Delay between two scroll steps of a text message
    pub scroll_speed_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            topic: "display".to_string(),
            clear: "clear".to_string(),
            text: "text".to_string(),
            draw: "draw".to_string(),
            scroll_speed_ms: 100,
        }
    }
}

impl DisplayConfig {
    pub fn actions(&self) -> DisplayActions {
        DisplayActions {
            clear: self.clear.clone(),
            text: self.text.clone(),
            draw: self.draw.clone(),
        }
    }

    pub fn scroll_speed(&self) -> Duration {
        Duration::from_millis(self.scroll_speed_ms)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HardwareConfig {
    pub i2c_bus: u8,
    /// Skips framebuffer discovery when set
    pub framebuffer: Option<PathBuf>,
    /// Skips joystick discovery when set
    pub joystick: Option<PathBuf>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            framebuffer: None,
            joystick: None,
        }
    }
}

impl BridgeConfig {
    /// Parses and validates a configuration from TOML text.
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Read {} bytes from {}", content.len(), path.display());
        Self::from_toml(&content, path)
    }

    /// Loads the given file, falling back to `~/.sensebridge/sensebridge.toml`
    /// and finally to the built-in defaults.
    ///
    /// A file that exists but fails to parse or validate is an error; only a
    /// missing file triggers the fallback chain.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        for candidate in Self::candidates(path) {
            if candidate.exists() {
                let config = Self::load(&candidate)?;
                info!("Loaded configuration from {}", candidate.display());
                return Ok(config);
            }
            debug!("No configuration at {}", candidate.display());
        }

        warn!(
            "No configuration file found at {}, using defaults",
            path.display()
        );
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    fn candidates(path: &Path) -> Vec<PathBuf> {
        let mut candidates = vec![path.to_path_buf()];
        if let Some(mut home) = dirs::home_dir() {
            home.push(CONFIG_DIR);
            home.push(DEFAULT_CONFIG_FILE);
            if home != path {
                candidates.push(home);
            }
        }
        candidates
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.id.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.id must not be empty".into()));
        }
        if self.mqtt.broker.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.broker must not be empty".into()));
        }
        let accepted = MIN_PUBLISH_INTERVAL..=MAX_PUBLISH_INTERVAL;
        let interval = Duration::try_from_secs_f64(self.sensor.publish_freq).ok();
        if !interval.is_some_and(|i| accepted.contains(&i)) {
            return Err(ConfigError::Invalid(format!(
                "sensor.publish_freq must be between {} and {} seconds, got {}",
                MIN_PUBLISH_INTERVAL.as_secs_f64(),
                MAX_PUBLISH_INTERVAL.as_secs_f64(),
                self.sensor.publish_freq
            )));
        }
        let actions = [&self.display.clear, &self.display.text, &self.display.draw];
        if actions.iter().any(|a| a.is_empty()) {
            return Err(ConfigError::Invalid(
                "display action names must not be empty".into(),
            ));
        }
        if self.display.clear == self.display.text
            || self.display.clear == self.display.draw
            || self.display.text == self.display.draw
        {
            return Err(ConfigError::Invalid(
                "display action names must be distinct".into(),
            ));
        }
        Ok(())
    }

    /// Interval between readings, clamped to the accepted range.
    pub fn publish_interval(&self) -> Duration {
        let out_of_range = if self.sensor.publish_freq > 0.0 {
            MAX_PUBLISH_INTERVAL
        } else {
            MIN_PUBLISH_INTERVAL
        };
        Duration::try_from_secs_f64(self.sensor.publish_freq)
            .unwrap_or(out_of_range)
            .clamp(MIN_PUBLISH_INTERVAL, MAX_PUBLISH_INTERVAL)
    }

    pub fn sensor_topic(&self) -> String {
        format!("{}/{}", self.sensor.topic, self.mqtt.id)
    }

    pub fn control_topic(&self) -> String {
        format!("{}/{}", self.control.topic, self.mqtt.id)
    }

    pub fn display_topic(&self) -> String {
        format!("{}/{}", self.display.topic, self.mqtt.id)
    }
}
