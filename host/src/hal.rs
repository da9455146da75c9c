//! ==============================================================================
//! hal.rs - serial hardware abstraction layer
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for serial port access.
//!     abstracts away the difference between a real device on a usb-serial
//!     adapter (using `serialport`) and a scripted in-memory device (tests).
//!
//! relationships:
//!     - used by: locator.rs (enumerate + probe), connection.rs (open + read)
//!     - uses: serialport (SystemSerial)
//!     - mock: MockBackend, built for unit tests and behind the `mock` feature
//!       for tests/api.rs
//!
//! ==============================================================================

use crate::domain::PortDescriptor;
use crate::error::{Result, SerialError};
use std::io;
use std::time::Duration;

/// one open serial handle
pub trait SerialLink: Send {
    /// bytes waiting in the driver's input buffer, never blocks
    fn bytes_available(&mut self) -> io::Result<u32>;
    /// read up to `buf.len()` bytes, bounded by the handle's timeout
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn is_open(&self) -> bool {
        true
    }
}

/// enumerates and opens ports
pub trait SerialBackend: Send + Sync {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>>;
    fn open(&self, port: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialLink>>;
}

// ==============================================================================================
// REAL IMPLEMENTATION (serialport)
// ==============================================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerial;

impl SystemSerial {
    pub fn new() -> Self {
        tracing::debug!("Using system serial backend");
        Self
    }
}

/// human readable description, roughly what device managers show
fn describe(port_type: &serialport::SerialPortType) -> String {
    match port_type {
        serialport::SerialPortType::UsbPort(info) => {
            let parts: Vec<&str> = [info.manufacturer.as_deref(), info.product.as_deref()]
                .into_iter()
                .flatten()
                .filter(|s| !s.is_empty())
                .collect();
            if parts.is_empty() {
                "USB Serial".to_string()
            } else {
                parts.join(" ")
            }
        }
        serialport::SerialPortType::PciPort => "PCI".to_string(),
        serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        serialport::SerialPortType::Unknown => "n/a".to_string(),
    }
}

impl SerialBackend for SystemSerial {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        let ports = serialport::available_ports().map_err(SerialError::Enumeration)?;
        Ok(ports
            .into_iter()
            .map(|p| {
                let description = describe(&p.port_type);
                PortDescriptor::new(p.port_name, description)
            })
            .collect())
    }

    fn open(&self, port: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialLink>> {
        let handle = serialport::new(port, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|source| SerialError::Open {
                port: port.to_string(),
                source,
            })?;
        Ok(Box::new(SystemLink { port: handle }))
    }
}

struct SystemLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink for SystemLink {
    fn bytes_available(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(io::Error::from)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.port, buf)
    }
}

// ==============================================================================================
// MOCK IMPLEMENTATION (scripted device, no hardware access)
// ==============================================================================================

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::{HashSet, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard};

    #[derive(Default)]
    struct MockState {
        ports: Vec<PortDescriptor>,
        enumeration_fails: bool,
        openable: HashSet<String>,
        rx: VecDeque<u8>,
        transport_fault: bool,
        open_attempts: Vec<String>,
        opened: Vec<String>,
    }

    /// in-memory stand-in for the os serial layer
    ///
    /// clones share one device: the test keeps a clone to feed bytes and
    /// inject faults while the connection manager owns another.
    #[derive(Clone, Default)]
    pub struct MockBackend {
        inner: Arc<Mutex<MockState>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> MutexGuard<'_, MockState> {
            self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        /// enumerated and openable port
        pub fn with_port(self, name: &str, description: &str) -> Self {
            {
                let mut s = self.state();
                s.ports.push(PortDescriptor::new(name, description));
                s.openable.insert(name.to_string());
            }
            self
        }

        /// enumerated port that refuses to open
        pub fn with_locked_port(self, name: &str, description: &str) -> Self {
            self.state().ports.push(PortDescriptor::new(name, description));
            self
        }

        /// openable port that enumeration does not report
        pub fn with_hidden_port(self, name: &str) -> Self {
            self.state().openable.insert(name.to_string());
            self
        }

        pub fn with_failing_enumeration(self) -> Self {
            self.state().enumeration_fails = true;
            self
        }

        pub fn feed(&self, bytes: &[u8]) {
            self.state().rx.extend(bytes.iter().copied());
        }

        pub fn feed_line(&self, line: &str) {
            let mut s = self.state();
            s.rx.extend(line.bytes());
            s.rx.push_back(b'\n');
        }

        /// next read on the open handle fails with a broken pipe
        pub fn inject_transport_error(&self) {
            self.state().transport_fault = true;
        }

        /// device gone: open() on this port fails until replug()
        pub fn unplug(&self, name: &str) {
            let mut s = self.state();
            s.openable.remove(name);
            s.transport_fault = true;
        }

        pub fn replug(&self, name: &str) {
            self.state().openable.insert(name.to_string());
        }

        /// every port open() was called with, in order (probes included)
        pub fn open_attempts(&self) -> Vec<String> {
            self.state().open_attempts.clone()
        }

        /// ports that opened successfully, in order
        pub fn opened(&self) -> Vec<String> {
            self.state().opened.clone()
        }
    }

    impl SerialBackend for MockBackend {
        fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
            let s = self.state();
            if s.enumeration_fails {
                return Err(SerialError::Enumeration(serialport::Error::new(
                    serialport::ErrorKind::Unknown,
                    "mock driver failure",
                )));
            }
            Ok(s.ports.clone())
        }

        fn open(&self, port: &str, _baud_rate: u32, _timeout: Duration) -> Result<Box<dyn SerialLink>> {
            let mut s = self.state();
            s.open_attempts.push(port.to_string());
            if !s.openable.contains(port) {
                return Err(SerialError::Open {
                    port: port.to_string(),
                    source: serialport::Error::new(serialport::ErrorKind::NoDevice, "no such device"),
                });
            }
            s.opened.push(port.to_string());
            Ok(Box::new(MockLink {
                backend: self.clone(),
            }))
        }
    }

    struct MockLink {
        backend: MockBackend,
    }

    impl MockLink {
        fn check_fault(&self) -> io::Result<()> {
            let mut s = self.backend.state();
            if s.transport_fault {
                s.transport_fault = false;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock device unplugged"));
            }
            Ok(())
        }
    }

    impl SerialLink for MockLink {
        fn bytes_available(&mut self) -> io::Result<u32> {
            self.check_fault()?;
            Ok(self.backend.state().rx.len() as u32)
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.check_fault()?;
            let mut s = self.backend.state();
            let n = buf.len().min(s.rx.len());
            for (slot, byte) in buf.iter_mut().zip(s.rx.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockBackend;
    use super::*;

    #[test]
    fn mock_link_reads_fed_bytes() {
        let backend = MockBackend::new().with_port("ttyMOCK0", "USB Serial");
        let mut link = backend.open("ttyMOCK0", 9600, Duration::from_secs(1)).unwrap();
        backend.feed(b"12,OK\n");
        assert_eq!(link.bytes_available().unwrap(), 6);

        let mut buf = [0u8; 4];
        assert_eq!(link.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"12,O");
        assert_eq!(link.bytes_available().unwrap(), 2);
    }

    #[test]
    fn mock_transport_fault_fires_once() {
        let backend = MockBackend::new().with_port("ttyMOCK0", "USB Serial");
        let mut link = backend.open("ttyMOCK0", 9600, Duration::from_secs(1)).unwrap();
        backend.inject_transport_error();
        assert!(link.bytes_available().is_err());
        assert_eq!(link.bytes_available().unwrap(), 0);
    }

    #[test]
    fn mock_records_open_attempts() {
        let backend = MockBackend::new().with_locked_port("COM1", "Communications Port");
        assert!(backend.open("COM1", 9600, Duration::from_millis(500)).is_err());
        assert!(backend.open("COM9", 9600, Duration::from_millis(500)).is_err());
        assert_eq!(backend.open_attempts(), vec!["COM1", "COM9"]);
        assert!(backend.opened().is_empty());
    }
}
