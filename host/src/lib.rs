//! aqi-bridge: serial air-quality sensor -> local json api
//!
//! the binary (main.rs) wires these together; tests use them directly.

pub mod acquisition;
pub mod config;
pub mod connection;
pub mod domain;
pub mod error;
pub mod hal;
pub mod locator;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod state;
