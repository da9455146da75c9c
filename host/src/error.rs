//! serial error taxonomy
//!
//! none of these are fatal: the locator turns `Enumeration` into "no ports",
//! the connection manager turns `Open` into the disconnected state, and the
//! acquisition loop answers `Transport` with close + delayed reopen.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerialError {
    /// listing ports failed at the os/driver level
    #[error("failed to enumerate serial ports: {0}")]
    Enumeration(#[source] serialport::Error),

    /// the chosen port could not be opened
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// i/o failure on an open handle (device unplugged, driver reset, ...)
    #[error("serial transport error: {0}")]
    Transport(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
