//! ==============================================================================
//! state.rs - shared reading state
//! ==============================================================================
//!
//! this struct holds the latest reading and connection info shared between:
//! - the acquisition loop (writes new readings, publishes connection changes)
//! - the web server (reads snapshots for /data and /config)
//!
//! we use arc<rwlock<>> for thread-safe sharing:
//! - arc: reference-counted pointer for sharing across tasks
//! - rwlock: multiple readers OR one writer
//!
//! every write swaps a whole `Reading` or a whole `ConnectionInfo`, so a
//! reader never sees the value of one message paired with the status of
//! another.
//!
//! ==============================================================================

use crate::domain::{ConfigView, ConnectionInfo, DataView, Reading, DISCONNECTED_STATUS};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub reading: Reading,
    pub connection: ConnectionInfo,
}

impl Snapshot {
    /// what GET /data returns: last reading, status masked while disconnected
    pub fn data_view(&self) -> DataView {
        let aqi_status = if self.connection.is_connected {
            self.reading.aqi_status.clone()
        } else {
            DISCONNECTED_STATUS.to_string()
        };
        DataView {
            sensor_value: self.reading.sensor_value,
            aqi_status,
        }
    }

    pub fn config_view(&self) -> ConfigView {
        ConfigView::from(&self.connection)
    }
}

/// clone-able handle, lives for the whole process
#[derive(Clone, Default)]
pub struct SharedState {
    inner: Arc<RwLock<Snapshot>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.read().await.clone()
    }

    pub async fn reading(&self) -> Reading {
        self.inner.read().await.reading.clone()
    }

    pub async fn replace_reading(&self, reading: Reading) {
        self.inner.write().await.reading = reading;
    }

    pub async fn set_connection(&self, connection: ConnectionInfo) {
        self.inner.write().await.connection = connection;
    }
}
