//! ==============================================================================
//! main.rs - aqi bridge entry point
//! ==============================================================================
//!
//! purpose:
//!     bridges a microcontroller that prints `<value>,<status>` lines over a
//!     usb-serial link to a small json api for a browser dashboard.
//!
//! responsibilities:
//!     - load configuration and start logging
//!     - find and open the sensor's serial port (degraded mode if none)
//!     - spawn the acquisition loop (serial -> shared state)
//!     - serve /data, /config and the dashboard from shared state
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                    aqi bridge (this file)                    │
//!     │  ┌──────────────────────┐        ┌──────────────────────┐   │
//!     │  │ acquisition loop     │        │ web server           │   │
//!     │  │ (100ms poll, 2s      │        │ (127.0.0.1:5000)     │   │
//!     │  │  reconnect delay)    │        │                      │   │
//!     │  └──────────┬───────────┘        └──────────┬───────────┘   │
//!     │        write│                               │read           │
//!     │             └────────────┐  ┌───────────────┘               │
//!     │                    ┌─────┴──┴─────┐                         │
//!     │                    │ SharedState  │ <- state.rs             │
//!     │                    └──────────────┘                         │
//!     └─────────────────────────────┬───────────────────────────────┘
//!                                   │ owned by the loop only
//!                          ┌────────┴────────┐
//!                          │ serial handle   │ <- connection.rs
//!                          │ (9600 baud)     │
//!                          └─────────────────┘
//!
//! ==============================================================================

use aqi_bridge::acquisition::AcquisitionLoop;
use aqi_bridge::config::BridgeConfig;
use aqi_bridge::connection::ConnectionManager;
use aqi_bridge::hal::SystemSerial;
use aqi_bridge::state::SharedState;
use aqi_bridge::{logging, server};
use anyhow::{Context, Result};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration, then logging (level comes from config)
    let (config, config_note) = BridgeConfig::load_or_default();
    logging::init(&config.logging.level);
    tracing::info!("[CONFIG] {config_note}");
    config.print_summary();

    // step 2: initialize shared state
    let state = SharedState::new();

    // step 3: first attempt at the device; failure just means degraded mode
    let mut conn = ConnectionManager::new(Arc::new(SystemSerial::new()), &config.serial);
    if !conn.open() {
        tracing::warn!("[STARTUP] No device yet, /data will report DISCONNECTED");
    }

    // step 4: start the acquisition loop in background
    let acquisition = AcquisitionLoop::new(conn, state.clone(), &config.serial)
        .with_sensor_echo(config.logging.show_sensor_data);
    tokio::spawn(acquisition.run());

    // step 5: serve until the process is stopped
    let app = server::router(state, &config.server.static_dir);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!("[STARTUP] Dashboard live at http://{}", config.server.bind);

    server::run_server(listener, app).await
}
