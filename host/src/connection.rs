//! ==============================================================================
//! connection.rs - serial connection lifecycle
//! ==============================================================================
//!
//! purpose:
//!     owns the one serial handle of the process. nothing else reads from or
//!     writes to it; the acquisition loop asks for lines through
//!     `read_available_line` and drives open/close on failure.
//!
//! state machine:
//!
//! ```text
//!     Disconnected ──open() ok──▶ Connected
//!          ▲                          │
//!          └──── close() / open() ◀───┘  (open() always closes first)
//! ```
//!
//! relationships:
//!     - uses: locator.rs (which port), hal.rs (the handle itself)
//!     - used by: acquisition.rs, main.rs (initial open)
//!
//! ==============================================================================

use crate::config::SerialConfig;
use crate::domain::{ConnectionInfo, BAUD_RATE};
use crate::error::Result;
use crate::hal::{SerialBackend, SerialLink};
use crate::locator::PortLocator;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// largest read issued per call
const READ_CHUNK: usize = 1024;

/// an unterminated line longer than this is garbage, not a message
const MAX_PARTIAL_LINE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

pub struct ConnectionManager {
    backend: Arc<dyn SerialBackend>,
    locator: PortLocator,
    fallback_ports: Vec<String>,
    read_timeout: Duration,
    link: Option<Box<dyn SerialLink>>,
    state: LinkState,
    port: Option<String>,
    /// bytes received after the last complete line
    pending: Vec<u8>,
}

impl ConnectionManager {
    pub fn new(backend: Arc<dyn SerialBackend>, config: &SerialConfig) -> Self {
        let locator = PortLocator::new(
            backend.clone(),
            config.device_hints.clone(),
            config.probe_timeout(),
        );
        Self {
            backend,
            locator,
            fallback_ports: config.fallback_ports.clone(),
            read_timeout: config.read_timeout(),
            link: None,
            state: LinkState::Disconnected,
            port: None,
            pending: Vec::new(),
        }
    }

    /// (re)open the device; false means degraded mode, not an error
    pub fn open(&mut self) -> bool {
        if self.link.is_some() {
            self.close();
        }

        let candidate = self
            .locator
            .find_candidate_port()
            .or_else(|| self.locator.probe_fallback_ports(self.fallback_ports.as_slice()));

        let Some(port) = candidate else {
            tracing::warn!("No serial port found, running in degraded mode");
            self.state = LinkState::Disconnected;
            return false;
        };

        match self.backend.open(&port, BAUD_RATE, self.read_timeout) {
            Ok(link) => {
                tracing::info!(port = %port, baud = BAUD_RATE, "Serial port opened");
                self.link = Some(link);
                self.port = Some(port);
                self.state = LinkState::Connected;
                true
            }
            Err(e) => {
                tracing::warn!("{e}");
                self.state = LinkState::Disconnected;
                false
            }
        }
    }

    pub fn close(&mut self) {
        if let Some(link) = self.link.take() {
            // serialport closes on drop and never reports a close error
            drop(link);
            tracing::debug!(port = ?self.port, "Serial port closed");
        }
        self.pending.clear();
        self.state = LinkState::Disconnected;
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected && self.link.as_ref().is_some_and(|l| l.is_open())
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            port_identifier: self.port.clone(),
            baud_rate: BAUD_RATE,
            is_connected: self.is_connected(),
        }
    }

    /// next complete line (terminator stripped) if one is available
    ///
    /// `Ok(None)`: nothing complete yet, try again later.
    /// `Err(Transport)`: the handle is broken, caller must close and reopen.
    pub fn read_available_line(&mut self) -> Result<Option<Vec<u8>>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }
        let Some(link) = self.link.as_mut() else {
            return Ok(None);
        };

        let available = link.bytes_available()? as usize;
        if available == 0 {
            return Ok(None);
        }

        let mut buf = vec![0u8; available.min(READ_CHUNK)];
        match link.read(&mut buf) {
            Ok(n) => self.pending.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let line = self.take_line();
        if line.is_none() && self.pending.len() > MAX_PARTIAL_LINE {
            tracing::trace!(len = self.pending.len(), "dropping unterminated input");
            self.pending.clear();
        }
        Ok(line)
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        Some(line)
    }
}
