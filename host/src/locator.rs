//! port discovery
//!
//! best effort: picks the port most likely to be the sensor, it does not
//! verify that the device actually speaks the line protocol.

use crate::domain::BAUD_RATE;
use crate::hal::SerialBackend;
use std::sync::Arc;
use std::time::Duration;

pub struct PortLocator {
    backend: Arc<dyn SerialBackend>,
    device_hints: Vec<String>,
    probe_timeout: Duration,
}

impl PortLocator {
    pub fn new(backend: Arc<dyn SerialBackend>, device_hints: Vec<String>, probe_timeout: Duration) -> Self {
        Self {
            backend,
            device_hints,
            probe_timeout,
        }
    }

    /// first port whose description contains a device hint, else the first
    /// port at all, else nothing
    pub fn find_candidate_port(&self) -> Option<String> {
        let ports = match self.backend.list_ports() {
            Ok(ports) => ports,
            Err(e) => {
                tracing::debug!("{e}, treating as no ports");
                return None;
            }
        };

        let hinted = ports.iter().find(|p| {
            self.device_hints
                .iter()
                .any(|hint| p.description.contains(hint.as_str()))
        });
        if let Some(port) = hinted {
            tracing::debug!(port = %port.name, description = %port.description, "matched device hint");
            return Some(port.name.clone());
        }

        ports.into_iter().next().map(|p| p.name)
    }

    /// first candidate that opens; the probe handle is dropped right away
    pub fn probe_fallback_ports<S: AsRef<str>>(&self, candidates: &[S]) -> Option<String> {
        candidates.iter().find_map(|candidate| {
            let name = candidate.as_ref();
            match self.backend.open(name, BAUD_RATE, self.probe_timeout) {
                Ok(handle) => {
                    drop(handle);
                    Some(name.to_string())
                }
                Err(e) => {
                    tracing::trace!("probe failed: {e}");
                    None
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::MockBackend;

    fn hints() -> Vec<String> {
        ["Arduino", "CH340", "USB"].map(String::from).to_vec()
    }

    fn locator(backend: &MockBackend) -> PortLocator {
        PortLocator::new(Arc::new(backend.clone()), hints(), Duration::from_millis(500))
    }

    #[test]
    fn prefers_hinted_description() {
        let backend = MockBackend::new()
            .with_port("/dev/ttyS0", "PCI")
            .with_port("/dev/ttyUSB0", "QinHeng Electronics CH340 serial converter");
        assert_eq!(locator(&backend).find_candidate_port().as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn first_hinted_port_wins() {
        let backend = MockBackend::new()
            .with_port("/dev/ttyS0", "PCI")
            .with_port("/dev/ttyUSB0", "USB Serial")
            .with_port("/dev/ttyACM0", "Arduino Uno");
        assert_eq!(locator(&backend).find_candidate_port().as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn port_order_beats_hint_order() {
        // "Arduino" is the first hint, but the "USB" port is enumerated first
        let backend = MockBackend::new()
            .with_port("/dev/ttyUSB0", "USB Serial")
            .with_port("/dev/ttyACM0", "Arduino Mega");
        assert_eq!(locator(&backend).find_candidate_port().as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn hints_are_case_sensitive() {
        let backend = MockBackend::new()
            .with_port("/dev/ttyS0", "n/a")
            .with_port("/dev/ttyS1", "arduino clone");
        // no match, so the first enumerated port wins
        assert_eq!(locator(&backend).find_candidate_port().as_deref(), Some("/dev/ttyS0"));
    }

    #[test]
    fn nothing_enumerated_means_nothing() {
        assert_eq!(locator(&MockBackend::new()).find_candidate_port(), None);
    }

    #[test]
    fn enumeration_failure_is_swallowed() {
        let backend = MockBackend::new()
            .with_port("/dev/ttyUSB0", "USB Serial")
            .with_failing_enumeration();
        assert_eq!(locator(&backend).find_candidate_port(), None);
    }

    #[test]
    fn probe_returns_first_openable_in_order() {
        let backend = MockBackend::new().with_hidden_port("COM5").with_hidden_port("COM1");
        let found = locator(&backend).probe_fallback_ports(&["COM3", "COM4", "COM5", "COM1", "COM2"]);
        assert_eq!(found.as_deref(), Some("COM5"));
        assert_eq!(backend.open_attempts(), vec!["COM3", "COM4", "COM5"]);
    }

    #[test]
    fn probe_with_nothing_openable() {
        let backend = MockBackend::new();
        let found = locator(&backend).probe_fallback_ports(&["COM3", "COM4"]);
        assert_eq!(found, None);
        assert_eq!(backend.open_attempts().len(), 2);
    }
}
