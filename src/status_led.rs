use esp_hal::gpio::Output;

use esp32_air_quality::{Status, StatusIndicator};

/// On-board LED: off when healthy, solid on for a configuration error,
/// toggling every cycle while uploads keep failing.
pub struct StatusLed {
    led: Output<'static>,
}

impl StatusLed {
    pub fn new(led: Output<'static>) -> Self {
        Self { led }
    }
}

impl StatusIndicator for StatusLed {
    fn show(&mut self, status: Status) {
        match status {
            Status::Healthy => self.led.set_low(),
            Status::Degraded => self.led.toggle(),
            Status::ConfigError => self.led.set_high(),
        }
    }
}
