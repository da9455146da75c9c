//! ==============================================================================
//! server.rs - json api + dashboard
//! ==============================================================================
//!
//! thin layer over SharedState: handlers take one snapshot and return, they
//! never touch the serial handle.
//!
//! ```text
//!     GET /data    {"sensor_value": 112, "aqi_status": "GOOD"}
//!     GET /config  {"port": "/dev/ttyUSB0", "baud_rate": 9600, "connected": true}
//!     GET /        index.html (and any other file) from the static dir
//! ```
//!
//! ==============================================================================

use crate::domain::{ConfigView, DataView};
use crate::state::SharedState;
use anyhow::Result;
use axum::{extract::State, response::Json, routing::get, Router};
use std::path::Path;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

pub fn router(state: SharedState, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/data", get(data_handler))
        .route("/config", get(config_handler))
        .fallback_service(ServeDir::new(static_dir.as_ref()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(listener: tokio::net::TcpListener, app: Router) -> Result<()> {
    axum::serve(listener, app).await?;
    Ok(())
}

/// latest reading; status reads "DISCONNECTED" while no device is attached
async fn data_handler(State(state): State<SharedState>) -> Json<DataView> {
    Json(state.snapshot().await.data_view())
}

async fn config_handler(State(state): State<SharedState>) -> Json<ConfigView> {
    Json(state.snapshot().await.config_view())
}
