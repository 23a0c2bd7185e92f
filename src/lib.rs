//! Air-quality telemetry node - hardware-agnostic logic.
//!
//! Everything that does not touch the ESP32 peripherals lives here so it can be
//! tested on the host. The firmware binary (`main.rs`) plugs the WiFi stack,
//! the HTTP transport and the sensors into the [`monitor::Monitor`] loop.
//!
//! Run tests on the host with:
//! ```bash
//! cargo test --lib
//! ```

// Use no_std only when NOT testing (tests need std for the test harness)
#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

pub mod config;
pub mod constants;
pub mod error;
pub mod monitor;
pub mod reading;
pub mod retry;
pub mod sensor;
pub mod severity;
pub mod telemetry;

#[cfg(test)]
mod testutil;

pub use config::{AirQualityThresholds, Settings, Thresholds};
pub use error::{ConfigError, ConnectivityError, CycleError, SensorError, UploadError};
pub use monitor::{Monitor, NetworkConnector, SensorReader, Status, StatusIndicator, TelemetryUploader};
pub use reading::Reading;
pub use severity::{assess, classify, Assessment, Severity};
pub use telemetry::UploadResult;
