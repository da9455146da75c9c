//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `bridge.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ServerConfig: Where the JSON api listens, where the dashboard lives.
//!     - SerialConfig: Device hints, fallback probe list, timeouts and delays.
//!     - LoggingConfig: Log level and whether to echo every reading.
//!
//! notes:
//!     the baud rate is not here on purpose: the firmware speaks 9600 only
//!     (see domain::BAUD_RATE).
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// env var pointing at an explicit config file
pub const CONFIG_ENV: &str = "AQI_BRIDGE_CONFIG";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub serial: SerialConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// loopback by default, the api has no authentication
    pub bind: String,
    /// directory holding index.html
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            static_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SerialConfig {
    /// case-sensitive substrings of a port description that mark the sensor
    pub device_hints: Vec<String>,
    /// probed in order when enumeration finds nothing
    pub fallback_ports: Vec<String>,
    pub probe_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device_hints: ["Arduino", "CH340", "USB"].map(String::from).to_vec(),
            fallback_ports: default_fallback_ports(),
            probe_timeout_ms: 500,
            read_timeout_ms: 1000,
            retry_delay_ms: 2000,
            poll_interval_ms: 100,
        }
    }
}

impl SerialConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// common names for usb-serial adapters on this platform
#[cfg(windows)]
fn default_fallback_ports() -> Vec<String> {
    ["COM3", "COM4", "COM5", "COM1", "COM2"].map(String::from).to_vec()
}

#[cfg(target_os = "macos")]
fn default_fallback_ports() -> Vec<String> {
    ["/dev/cu.usbmodem1101", "/dev/cu.usbserial-1410"].map(String::from).to_vec()
}

#[cfg(not(any(windows, target_os = "macos")))]
fn default_fallback_ports() -> Vec<String> {
    ["/dev/ttyACM0", "/dev/ttyUSB0", "/dev/ttyACM1", "/dev/ttyUSB1"]
        .map(String::from)
        .to_vec()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// log every accepted reading at info instead of debug
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_sensor_data: false,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load with default fallback
    ///
    /// returns the config plus a note about where it came from; logging is
    /// not up yet when this runs, so main logs the note afterwards.
    pub fn load_or_default() -> (Self, String) {
        let mut paths = Vec::new();
        if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from("config").join("bridge.toml"));
        paths.push(PathBuf::from("..").join("config").join("bridge.toml"));

        let mut notes = Vec::new();
        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        notes.push(format!("Loaded from {}", path.display()));
                        return (config, notes.join("; "));
                    }
                    Err(e) => {
                        notes.push(format!("Failed to load {}: {}", path.display(), e));
                    }
                }
            }
        }

        notes.push("No config file found - using defaults".to_string());
        (Self::default(), notes.join("; "))
    }

    /// Log configuration summary
    pub fn print_summary(&self) {
        tracing::info!(
            bind = %self.server.bind,
            static_dir = %self.server.static_dir.display(),
            "server config"
        );
        tracing::info!(
            hints = ?self.serial.device_hints,
            fallback = ?self.serial.fallback_ports,
            retry_delay_ms = self.serial.retry_delay_ms,
            poll_interval_ms = self.serial.poll_interval_ms,
            "serial config"
        );
    }
}
