use serde::{Deserialize, Serialize};

/// serial speed the sensor firmware is flashed with
pub const BAUD_RATE: u32 = 9600;

/// status reported before the first valid line arrives
pub const UNKNOWN_STATUS: &str = "UNKNOWN";

/// status the api substitutes while no device is connected
pub const DISCONNECTED_STATUS: &str = "DISCONNECTED";

/// one parsed line from the sensor, e.g. `112,GOOD`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// raw sensor value as sent by the device
    pub sensor_value: i64,
    /// air-quality status token (e.g. "GOOD", "MODERATE")
    pub aqi_status: String,
}

impl Reading {
    pub fn new(sensor_value: i64, aqi_status: impl Into<String>) -> Self {
        Self {
            sensor_value,
            aqi_status: aqi_status.into(),
        }
    }
}

impl Default for Reading {
    fn default() -> Self {
        Self::new(0, UNKNOWN_STATUS)
    }
}

/// live view of the serial handle owned by the connection manager
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// port name (e.g. "/dev/ttyUSB0" or "COM3"), None until a port opened
    pub port_identifier: Option<String>,
    pub baud_rate: u32,
    pub is_connected: bool,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            port_identifier: None,
            baud_rate: BAUD_RATE,
            is_connected: false,
        }
    }
}

/// a port as seen by enumeration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortDescriptor {
    /// identifier passed back to open()
    pub name: String,
    /// human readable description matched against device hints
    pub description: String,
}

impl PortDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

// ==============================================================================
// api views
// ==============================================================================

/// body of GET /data
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataView {
    pub sensor_value: i64,
    pub aqi_status: String,
}

/// body of GET /config
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigView {
    pub port: Option<String>,
    pub baud_rate: u32,
    pub connected: bool,
}

impl From<&ConnectionInfo> for ConfigView {
    fn from(info: &ConnectionInfo) -> Self {
        Self {
            port: info.port_identifier.clone(),
            baud_rate: info.baud_rate,
            connected: info.is_connected,
        }
    }
}
