use crate::constants::{MAX_HOSTNAME_LEN, MIN_MEASUREMENT_INTERVAL_SECS};
use crate::error::ConfigError;

/// Warning and danger levels for one gas, in the gas' native unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub warning: u16,
    pub danger: u16,
}

impl Thresholds {
    pub const fn is_ordered(&self) -> bool {
        self.warning < self.danger
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirQualityThresholds {
    // TVOC levels in ppb
    pub tvoc: Thresholds,

    // CO levels in ppm
    pub co: Thresholds,
}

impl Default for AirQualityThresholds {
    fn default() -> Self {
        Self {
            tvoc: Thresholds {
                warning: 200,
                danger: 500,
            },
            co: Thresholds {
                warning: 30,
                danger: 50,
            },
        }
    }
}

/// Immutable node configuration, built once at startup and handed to each
/// component by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    // Wi-Fi SSID to connect to
    pub wifi_ssid: &'static str,

    // Wi-Fi pre-shared key (password)
    pub wifi_psk: &'static str,

    // Device ID, used as DHCP hostname
    pub hostname: &'static str,

    // Telemetry server hostname
    pub server: &'static str,

    // Telemetry server port (443 with TLS, 80 otherwise)
    pub port: u16,

    // ThingSpeak channel write API key
    pub api_key: &'static str,

    // Severity thresholds per gas
    pub thresholds: AirQualityThresholds,

    // Measurement interval in seconds
    pub measurement_interval_seconds: u16,

    // TLS CA certificate (optional)
    pub tls_ca: Option<&'static str>,
}

impl Settings {
    /// Checks the invariants the rest of the node relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wifi_ssid.is_empty() {
            return Err(ConfigError::MissingField("wifi_ssid"));
        }
        if self.server.is_empty() {
            return Err(ConfigError::MissingField("server"));
        }
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingField("api_key"));
        }
        if self.hostname.len() > MAX_HOSTNAME_LEN {
            return Err(ConfigError::HostnameTooLong);
        }
        if !self.thresholds.tvoc.is_ordered() {
            return Err(ConfigError::ThresholdOrder("tvoc"));
        }
        if !self.thresholds.co.is_ordered() {
            return Err(ConfigError::ThresholdOrder("co"));
        }
        if self.measurement_interval_seconds < MIN_MEASUREMENT_INTERVAL_SECS {
            return Err(ConfigError::IntervalTooShort(
                self.measurement_interval_seconds,
            ));
        }
        Ok(())
    }
}

// Generated at compile time from cfg.toml
include!(concat!(env!("OUT_DIR"), "/settings.rs"));
