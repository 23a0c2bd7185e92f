use embassy_time::{Delay, Instant, Timer};
use esp_hal::{
    analog::adc::{Adc, AdcPin},
    i2c::master::I2c,
    peripherals::{ADC1, GPIO34},
    Async, Blocking,
};
use log::error;

use esp32_air_quality::sensor::{Ccs811, Mq7Calibration};
use esp32_air_quality::{Reading, SensorError, SensorReader};

/// Full scale of the 12-bit ADC at 11 dB attenuation, in millivolts
const ADC_FULL_SCALE_MV: f32 = 3300.0;
const ADC_MAX: f32 = 4095.0;
const ADC_READ_ATTEMPTS: u8 = 100;

type TvocSensor = Ccs811<I2c<'static, Async>, Delay>;

/// CCS811 on I2C for TVOC, MQ-7 on GPIO34 for CO.
pub struct GasSensors {
    tvoc: TvocSensor,
    adc: Adc<'static, ADC1<'static>, Blocking>,
    co_pin: AdcPin<GPIO34<'static>, ADC1<'static>>,
    mq7: Mq7Calibration,
}

impl GasSensors {
    pub fn new(
        tvoc: TvocSensor,
        adc: Adc<'static, ADC1<'static>, Blocking>,
        co_pin: AdcPin<GPIO34<'static>, ADC1<'static>>,
        mq7: Mq7Calibration,
    ) -> Self {
        Self {
            tvoc,
            adc,
            co_pin,
            mq7,
        }
    }

    async fn read_co_mv(&mut self) -> Result<f32, SensorError> {
        for _ in 0..ADC_READ_ATTEMPTS {
            if let Ok(raw) = self.adc.read_oneshot(&mut self.co_pin) {
                return Ok(raw as f32 * ADC_FULL_SCALE_MV / ADC_MAX);
            }
            Timer::after_micros(50).await;
        }
        error!("MQ-7: ADC conversion never completed");
        Err(SensorError::NotReady)
    }
}

impl SensorReader for GasSensors {
    async fn read(&mut self) -> Result<Reading, SensorError> {
        let sample = self.tvoc.read().await?;
        let co_mv = self.read_co_mv().await?;
        let co_ppm = self.mq7.co_ppm(co_mv)?;

        log::debug!(
            "CCS811 eCO2 {} ppm TVOC {} ppb, MQ-7 {:.0} mV",
            sample.eco2_ppm,
            sample.tvoc_ppb,
            co_mv
        );

        Reading::new(
            Instant::now().as_millis(),
            f32::from(sample.tvoc_ppb),
            co_ppm,
        )
    }
}
