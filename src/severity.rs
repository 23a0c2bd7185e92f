//! Threshold classification.
//!
//! Each gas is classified on its own against its warning/danger pair, the
//! overall alert level is the worse of the two.

use crate::config::{AirQualityThresholds, Thresholds};
use crate::reading::Reading;

/// Alert level, ordered `Normal < Warning < Danger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Normal,
    Warning,
    Danger,
}

impl Severity {
    /// Numeric code sent to the telemetry server.
    pub const fn code(self) -> u8 {
        match self {
            Severity::Normal => 0,
            Severity::Warning => 1,
            Severity::Danger => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        }
    }
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `value < warning` is Normal, `warning <= value < danger` is Warning,
/// anything from `danger` up is Danger.
pub fn classify(value: f32, warning: f32, danger: f32) -> Severity {
    if value >= danger {
        Severity::Danger
    } else if value >= warning {
        Severity::Warning
    } else {
        Severity::Normal
    }
}

impl Thresholds {
    pub fn classify(&self, value: f32) -> Severity {
        classify(value, self.warning as f32, self.danger as f32)
    }
}

/// Per-gas and combined severity of one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub tvoc: Severity,
    pub co: Severity,
    pub overall: Severity,
}

pub fn assess(reading: &Reading, thresholds: &AirQualityThresholds) -> Assessment {
    let tvoc = thresholds.tvoc.classify(reading.tvoc_ppb);
    let co = thresholds.co.classify(reading.co_ppm);

    Assessment {
        tvoc,
        co,
        overall: tvoc.max(co),
    }
}
