use crate::error::SensorError;

/// One sample of both gases, taken at `timestamp_ms` of uptime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp_ms: u64,
    pub tvoc_ppb: f32,
    pub co_ppm: f32,
}

impl Reading {
    pub fn new(timestamp_ms: u64, tvoc_ppb: f32, co_ppm: f32) -> Result<Self, SensorError> {
        if !tvoc_ppb.is_finite() || !co_ppm.is_finite() {
            return Err(SensorError::InvalidValue);
        }

        Ok(Self {
            timestamp_ms,
            tvoc_ppb,
            co_ppm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_reading() {
        let reading = Reading::new(1_000, 150.0, 20.0).unwrap();
        assert_eq!(reading.timestamp_ms, 1_000);
        assert_eq!(reading.tvoc_ppb, 150.0);
        assert_eq!(reading.co_ppm, 20.0);
    }

    #[test]
    fn test_rejects_non_finite_values() {
        assert_eq!(
            Reading::new(0, f32::NAN, 1.0),
            Err(SensorError::InvalidValue)
        );
        assert_eq!(
            Reading::new(0, 1.0, f32::INFINITY),
            Err(SensorError::InvalidValue)
        );
    }

    #[test]
    fn test_accepts_negative_values() {
        assert!(Reading::new(0, -1.0, 0.0).is_ok());
    }
}
