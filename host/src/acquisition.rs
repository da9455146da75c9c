//! ==============================================================================
//! acquisition.rs - background serial polling loop
//! ==============================================================================
//!
//! purpose:
//!     the one long-lived task that talks to the device. each cycle it pulls
//!     at most one line out of the connection manager, parses it, and swaps
//!     the result into the shared state. transport failures are answered with
//!     close + fixed delay + reopen; nothing here ever ends the process.
//!
//! cycle:
//!
//! ```text
//!     connected? ──no──▶ reopen if the retry delay has passed
//!         │yes
//!     read_available_line
//!         ├─ Err  ──▶ close, publish, sleep(retry_delay), open, publish
//!         ├─ None ──▶ (nothing)
//!         └─ line ──▶ parse ──▶ replace_reading
//!     sleep(poll_interval)
//! ```
//!
//! relationships:
//!     - owns: connection.rs (ConnectionManager, and through it the handle)
//!     - writes: state.rs (SharedState)
//!     - uses: protocol.rs (parse)
//!     - spawned by: main.rs
//!
//! ==============================================================================

use crate::config::SerialConfig;
use crate::connection::ConnectionManager;
use crate::domain::{ConnectionInfo, Reading};
use crate::protocol;
use crate::state::SharedState;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::time::{sleep, Instant};

/// what one cycle did, mostly for tests and logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// connected, nothing complete to read
    Idle,
    /// disconnected and not yet time to retry
    Waiting,
    Accepted(Reading),
    /// a line arrived but did not parse
    Rejected,
    /// an open() attempt was made; true if it connected
    Reopened(bool),
}

pub struct AcquisitionLoop {
    conn: ConnectionManager,
    state: SharedState,
    poll_interval: Duration,
    retry_delay: Duration,
    show_sensor_data: bool,
    next_reconnect: Option<Instant>,
    /// connection info last written to the shared state
    published: Option<ConnectionInfo>,
}

impl AcquisitionLoop {
    pub fn new(conn: ConnectionManager, state: SharedState, serial: &SerialConfig) -> Self {
        Self {
            conn,
            state,
            poll_interval: serial.poll_interval(),
            retry_delay: serial.retry_delay(),
            show_sensor_data: false,
            next_reconnect: None,
            published: None,
        }
    }

    /// log each accepted reading at info
    pub fn with_sensor_echo(mut self, show: bool) -> Self {
        self.show_sensor_data = show;
        self
    }

    /// run for the lifetime of the process
    pub async fn run(self) {
        self.run_until(std::future::pending::<()>()).await
    }

    /// run until `shutdown` resolves, then release the port
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.sync_connection().await;
        tracing::info!(
            poll = ?self.poll_interval,
            retry = ?self.retry_delay,
            "Acquisition loop started"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.cycle() => {}
            }
        }

        tracing::info!("Acquisition loop stopping");
        self.conn.close();
        self.sync_connection().await;
    }

    /// one poll cycle, including the trailing poll-interval sleep
    pub async fn cycle(&mut self) -> CycleOutcome {
        self.sync_connection().await;
        let outcome = if self.conn.is_connected() {
            self.read_once().await
        } else if self.reconnect_due() {
            self.reopen().await
        } else {
            CycleOutcome::Waiting
        };

        sleep(self.poll_interval).await;
        outcome
    }

    async fn read_once(&mut self) -> CycleOutcome {
        match self.conn.read_available_line() {
            Ok(None) => CycleOutcome::Idle,
            Ok(Some(line)) => match protocol::parse(&line) {
                Some(reading) => {
                    if self.show_sensor_data {
                        tracing::info!(value = reading.sensor_value, status = %reading.aqi_status, "Data received");
                    } else {
                        tracing::debug!(value = reading.sensor_value, status = %reading.aqi_status, "Data received");
                    }
                    self.state.replace_reading(reading.clone()).await;
                    CycleOutcome::Accepted(reading)
                }
                None => {
                    tracing::trace!(line = %String::from_utf8_lossy(&line), "discarding malformed line");
                    CycleOutcome::Rejected
                }
            },
            Err(e) => {
                tracing::warn!("{e}, reconnecting in {:?}", self.retry_delay);
                self.conn.close();
                self.sync_connection().await;
                sleep(self.retry_delay).await;
                self.reopen().await
            }
        }
    }

    async fn reopen(&mut self) -> CycleOutcome {
        // enumeration + probing are blocking driver calls
        let connected = match Handle::current().runtime_flavor() {
            RuntimeFlavor::CurrentThread => self.conn.open(),
            _ => tokio::task::block_in_place(|| self.conn.open()),
        };
        self.next_reconnect = None;
        self.sync_connection().await;
        CycleOutcome::Reopened(connected)
    }

    /// while disconnected, allow one open() per retry delay
    fn reconnect_due(&mut self) -> bool {
        let now = Instant::now();
        match self.next_reconnect {
            Some(at) => at <= now,
            None => {
                self.next_reconnect = Some(now + self.retry_delay);
                false
            }
        }
    }

    /// push connection info to the shared state when it changed
    async fn sync_connection(&mut self) {
        let info = self.conn.connection_info();
        if self.published.as_ref() != Some(&info) {
            self.state.set_connection(info.clone()).await;
            self.published = Some(info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DISCONNECTED_STATUS;
    use crate::hal::mock::MockBackend;
    use std::sync::Arc;

    const PORT: &str = "/dev/ttyUSB0";

    fn serial_config() -> SerialConfig {
        SerialConfig {
            fallback_ports: Vec::new(),
            ..SerialConfig::default()
        }
    }

    fn setup(backend: &MockBackend) -> (AcquisitionLoop, SharedState) {
        let config = serial_config();
        let mut conn = ConnectionManager::new(Arc::new(backend.clone()), &config);
        conn.open();
        let state = SharedState::new();
        (AcquisitionLoop::new(conn, state.clone(), &config), state)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn valid_line_replaces_reading() {
        let backend = MockBackend::new().with_port(PORT, "USB Serial");
        let (mut acq, state) = setup(&backend);

        backend.feed_line("112,GOOD");
        assert_eq!(acq.cycle().await, CycleOutcome::Accepted(Reading::new(112, "GOOD")));

        let view = state.snapshot().await.data_view();
        assert_eq!(view.sensor_value, 112);
        assert_eq!(view.aqi_status, "GOOD");
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_line_leaves_state_alone() {
        let backend = MockBackend::new().with_port(PORT, "USB Serial");
        let (mut acq, state) = setup(&backend);

        backend.feed_line("112,GOOD");
        acq.cycle().await;
        let before = state.snapshot().await;

        for junk in ["abc,GOOD", "112", "1,2,3"] {
            backend.feed_line(junk);
            assert_eq!(acq.cycle().await, CycleOutcome::Rejected);
        }
        backend.feed(&[0xff, b',', b'X', b'\n']);
        assert_eq!(acq.cycle().await, CycleOutcome::Rejected);

        assert_eq!(state.snapshot().await, before);
        assert!(acq.conn.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_sleeps_the_poll_interval() {
        let backend = MockBackend::new().with_port(PORT, "USB Serial");
        let (mut acq, _state) = setup(&backend);

        let start = Instant::now();
        assert_eq!(acq.cycle().await, CycleOutcome::Idle);
        let elapsed = start.elapsed();
        assert!(elapsed >= ms(100) && elapsed < ms(110), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_disconnects_then_reopens_after_delay() {
        let backend = MockBackend::new().with_port(PORT, "USB Serial");
        let (mut acq, state) = setup(&backend);
        let attempts = backend.open_attempts().len();

        backend.inject_transport_error();
        let start = Instant::now();
        // port still plugged in, so the reopen succeeds
        assert_eq!(acq.cycle().await, CycleOutcome::Reopened(true));
        let elapsed = start.elapsed();
        assert!(elapsed >= ms(2100) && elapsed < ms(2110), "{elapsed:?}");
        assert_eq!(backend.open_attempts().len(), attempts + 1);
        assert!(state.snapshot().await.connection.is_connected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reopen_on_a_worker_thread() {
        let backend = MockBackend::new().with_port(PORT, "USB Serial");
        let config = SerialConfig {
            fallback_ports: Vec::new(),
            retry_delay_ms: 10,
            poll_interval_ms: 1,
            ..SerialConfig::default()
        };
        let mut conn = ConnectionManager::new(Arc::new(backend.clone()), &config);
        conn.open();
        let state = SharedState::new();
        let mut acq = AcquisitionLoop::new(conn, state.clone(), &config);

        backend.inject_transport_error();
        assert_eq!(acq.cycle().await, CycleOutcome::Reopened(true));
        assert!(state.snapshot().await.connection.is_connected);
        assert_eq!(backend.opened(), vec![PORT, PORT]);
    }

    #[tokio::test(start_paused = true)]
    async fn unplugged_device_shows_disconnected_until_it_returns() {
        let backend = MockBackend::new().with_port(PORT, "USB Serial");
        let (acq, state) = setup(&backend);
        backend.feed_line("112,GOOD");
        let task = tokio::spawn(acq.run());

        // t=50: first cycle consumed the line
        sleep(ms(50)).await;
        assert_eq!(
            state.snapshot().await.data_view(),
            crate::domain::DataView {
                sensor_value: 112,
                aqi_status: "GOOD".into()
            }
        );

        // t=100 the read fails; t=150 we are inside the retry delay
        backend.unplug(PORT);
        sleep(ms(100)).await;
        let snap = state.snapshot().await;
        assert!(!snap.connection.is_connected);
        assert_eq!(snap.data_view().aqi_status, DISCONNECTED_STATUS);
        assert_eq!(snap.data_view().sensor_value, 112);
        let attempts = backend.open_attempts().len();

        // t=2050: still waiting
        sleep(ms(1900)).await;
        assert_eq!(backend.open_attempts().len(), attempts);

        // t=2150: the delayed open() happened and failed
        sleep(ms(100)).await;
        assert_eq!(backend.open_attempts().len(), attempts + 1);
        assert!(!state.snapshot().await.connection.is_connected);

        // device comes back, picked up by the periodic retry
        backend.replug(PORT);
        sleep(ms(2200)).await;
        assert!(state.snapshot().await.connection.is_connected);

        backend.feed_line("130,MODERATE");
        sleep(ms(200)).await;
        let view = state.snapshot().await.data_view();
        assert_eq!(view.sensor_value, 130);
        assert_eq!(view.aqi_status, "MODERATE");

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn no_device_retries_at_the_fixed_delay() {
        // enumerated but never openable, so every retry shows up as an attempt
        let backend = MockBackend::new().with_locked_port(PORT, "USB Serial");
        let (acq, state) = setup(&backend);
        assert_eq!(backend.open_attempts().len(), 1);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(acq.run_until(async move {
            let _ = stop_rx.await;
        }));

        // retries at t=2000, 4100, 6200, 8300: fixed delay plus one poll, never exponential
        sleep(ms(10_050)).await;
        assert_eq!(backend.open_attempts().len(), 5);
        let snap = state.snapshot().await;
        assert!(!snap.connection.is_connected);
        assert_eq!(snap.connection.port_identifier, None);
        assert_eq!(snap.data_view().aqi_status, DISCONNECTED_STATUS);
        assert_eq!(snap.data_view().sensor_value, 0);

        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_the_port() {
        let backend = MockBackend::new().with_port(PORT, "USB Serial");
        let (acq, state) = setup(&backend);
        let task = tokio::spawn(acq.run_until(sleep(ms(350))));
        task.await.unwrap();

        let snap = state.snapshot().await;
        assert!(!snap.connection.is_connected);
        assert_eq!(snap.connection.port_identifier.as_deref(), Some(PORT));
    }
}
