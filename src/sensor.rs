use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{error, info};
use micromath::F32Ext;

use crate::constants::{CCS811_DATA_READY_ATTEMPTS, CCS811_POLL_INTERVAL_MS};
use crate::error::SensorError;

/// Default CCS811 address (ADDR pin low)
pub const CCS811_ADDRESS: u8 = 0x5A;

const REG_STATUS: u8 = 0x00;
const REG_MEAS_MODE: u8 = 0x01;
const REG_ALG_RESULT_DATA: u8 = 0x02;
const REG_HW_ID: u8 = 0x20;
const REG_APP_START: u8 = 0xF4;

const HW_ID: u8 = 0x81;

const STATUS_ERROR: u8 = 1 << 0;
const STATUS_DATA_READY: u8 = 1 << 3;
const STATUS_FW_MODE: u8 = 1 << 7;

/// Drive mode 1: one measurement per second
const MEAS_MODE_1S: u8 = 0x10;

/// eCO2 and TVOC as reported by the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ccs811Sample {
    pub eco2_ppm: u16,
    pub tvoc_ppb: u16,
}

/// CCS811 metal-oxide gas sensor (TVOC)
pub struct Ccs811<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
}

impl<I2C: I2c, D: DelayNs> Ccs811<I2C, D> {
    pub async fn new(i2c: I2C, delay: D, address: u8) -> Result<Self, SensorError> {
        info!("Initialising CCS811...");
        let mut sensor = Self {
            i2c,
            delay,
            address,
        };

        let hw_id = sensor.read_register(REG_HW_ID).await?;
        if hw_id != HW_ID {
            error!("CCS811: unexpected hardware id {:#x}", hw_id);
            return Err(SensorError::InitFailure);
        }

        // The application must be started before the sensor leaves boot mode
        sensor
            .i2c
            .write(sensor.address, &[REG_APP_START])
            .await
            .map_err(|_| SensorError::InitFailure)?;
        sensor.delay.delay_ms(1).await;

        let status = sensor.read_register(REG_STATUS).await?;
        if status & STATUS_FW_MODE == 0 {
            error!("CCS811: still in boot mode, status {:#x}", status);
            return Err(SensorError::InitFailure);
        }

        sensor
            .i2c
            .write(sensor.address, &[REG_MEAS_MODE, MEAS_MODE_1S])
            .await
            .map_err(|_| SensorError::InitFailure)?;

        info!("Initialised CCS811");
        Ok(sensor)
    }

    pub async fn read(&mut self) -> Result<Ccs811Sample, SensorError> {
        let mut attempts = 0;
        loop {
            let status = self.read_register(REG_STATUS).await?;
            if status & STATUS_ERROR != 0 {
                error!("CCS811: error flag set, status {:#x}", status);
                return Err(SensorError::DeviceError);
            }
            if status & STATUS_DATA_READY != 0 {
                break;
            }

            attempts += 1;
            if attempts >= CCS811_DATA_READY_ATTEMPTS {
                return Err(SensorError::NotReady);
            }
            self.delay.delay_ms(CCS811_POLL_INTERVAL_MS).await;
        }

        let mut data = [0u8; 4];
        self.i2c
            .write_read(self.address, &[REG_ALG_RESULT_DATA], &mut data)
            .await
            .map_err(|_| SensorError::Bus)?;

        Ok(Ccs811Sample {
            eco2_ppm: u16::from_be_bytes([data[0], data[1]]),
            tvoc_ppb: u16::from_be_bytes([data[2], data[3]]),
        })
    }

    async fn read_register(&mut self, register: u8) -> Result<u8, SensorError> {
        let mut value = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut value)
            .await
            .map_err(|_| SensorError::Bus)?;
        Ok(value[0])
    }
}

/// Electrical set-up of an MQ-7 module.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mq7Calibration {
    // Load resistor in kOhm
    pub load_kohm: f32,
    // Sensor resistance in clean air (R0) in kOhm
    pub r0_kohm: f32,
    // Divider supply in millivolts
    pub supply_mv: f32,
}

// Rs/R0 to ppm curve fitted on the MQ-7 datasheet
const MQ7_CURVE_A: f32 = 99.042;
const MQ7_CURVE_B: f32 = -1.518;

impl Mq7Calibration {
    /// Converts the voltage across the load resistor into a CO concentration.
    pub fn co_ppm(&self, output_mv: f32) -> Result<f32, SensorError> {
        if !(output_mv > 0.0 && output_mv < self.supply_mv) {
            return Err(SensorError::OutOfRange);
        }

        let rs_kohm = self.load_kohm * (self.supply_mv - output_mv) / output_mv;
        let ratio = rs_kohm / self.r0_kohm;

        Ok(MQ7_CURVE_A * ratio.powf(MQ7_CURVE_B))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeDelay;
    use embedded_hal_async::i2c::{ErrorKind, ErrorType, Operation};
    use std::collections::VecDeque;

    /// Serves register reads from a script and records writes.
    #[derive(Default)]
    struct FakeI2c {
        reads: VecDeque<Vec<u8>>,
        writes: Vec<Vec<u8>>,
        fail: bool,
    }

    impl ErrorType for FakeI2c {
        type Error = ErrorKind;
    }

    impl I2c for FakeI2c {
        async fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            assert_eq!(address, CCS811_ADDRESS);
            if self.fail {
                return Err(ErrorKind::Bus);
            }
            for op in operations {
                match op {
                    Operation::Write(bytes) => self.writes.push(bytes.to_vec()),
                    Operation::Read(buf) => {
                        let data = self.reads.pop_front().expect("unexpected read");
                        buf.copy_from_slice(&data);
                    }
                }
            }
            Ok(())
        }
    }

    fn booted_bus() -> FakeI2c {
        FakeI2c {
            reads: VecDeque::from([vec![HW_ID], vec![STATUS_FW_MODE]]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_init_starts_app_and_sets_mode() {
        let sensor = Ccs811::new(booted_bus(), FakeDelay::default(), CCS811_ADDRESS)
            .await
            .unwrap();

        assert!(sensor.i2c.writes.contains(&vec![REG_APP_START]));
        assert!(sensor.i2c.writes.contains(&vec![REG_MEAS_MODE, MEAS_MODE_1S]));
    }

    #[tokio::test]
    async fn test_init_rejects_wrong_hw_id() {
        let bus = FakeI2c {
            reads: VecDeque::from([vec![0x00]]),
            ..Default::default()
        };
        let result = Ccs811::new(bus, FakeDelay::default(), CCS811_ADDRESS).await;
        assert!(matches!(result, Err(SensorError::InitFailure)));
    }

    #[tokio::test]
    async fn test_read_sample() {
        let mut sensor = Ccs811::new(booted_bus(), FakeDelay::default(), CCS811_ADDRESS)
            .await
            .unwrap();

        sensor.i2c.reads.extend([
            vec![STATUS_FW_MODE],
            vec![STATUS_FW_MODE | STATUS_DATA_READY],
            vec![0x01, 0x90, 0x00, 0xFA],
        ]);

        let sample = sensor.read().await.unwrap();
        assert_eq!(sample.eco2_ppm, 400);
        assert_eq!(sample.tvoc_ppb, 250);
        assert_eq!(sensor.delay.waits_ms.last(), Some(&CCS811_POLL_INTERVAL_MS));
    }

    #[tokio::test]
    async fn test_read_reports_device_error() {
        let mut sensor = Ccs811::new(booted_bus(), FakeDelay::default(), CCS811_ADDRESS)
            .await
            .unwrap();

        sensor.i2c.reads.push_back(vec![STATUS_FW_MODE | STATUS_ERROR]);
        assert_eq!(sensor.read().await, Err(SensorError::DeviceError));
    }

    #[tokio::test]
    async fn test_read_gives_up_when_never_ready() {
        let mut sensor = Ccs811::new(booted_bus(), FakeDelay::default(), CCS811_ADDRESS)
            .await
            .unwrap();

        for _ in 0..CCS811_DATA_READY_ATTEMPTS {
            sensor.i2c.reads.push_back(vec![STATUS_FW_MODE]);
        }
        assert_eq!(sensor.read().await, Err(SensorError::NotReady));
    }

    #[tokio::test]
    async fn test_bus_failure() {
        let mut sensor = Ccs811::new(booted_bus(), FakeDelay::default(), CCS811_ADDRESS)
            .await
            .unwrap();

        sensor.i2c.fail = true;
        assert_eq!(sensor.read().await, Err(SensorError::Bus));
    }

    fn mq7() -> Mq7Calibration {
        Mq7Calibration {
            load_kohm: 10.0,
            r0_kohm: 10.0,
            supply_mv: 5000.0,
        }
    }

    #[test]
    fn test_mq7_reference_point() {
        // Rs == R0 when the divider sits at half the supply
        let ppm = mq7().co_ppm(2500.0).unwrap();
        assert!((ppm - MQ7_CURVE_A).abs() < 1.0, "ppm {ppm}");
    }

    #[test]
    fn test_mq7_higher_voltage_means_more_co() {
        let low = mq7().co_ppm(1000.0).unwrap();
        let high = mq7().co_ppm(4000.0).unwrap();
        assert!(high > low);
    }

    #[test]
    fn test_mq7_out_of_range() {
        assert_eq!(mq7().co_ppm(0.0), Err(SensorError::OutOfRange));
        assert_eq!(mq7().co_ppm(5000.0), Err(SensorError::OutOfRange));
        assert_eq!(mq7().co_ppm(f32::NAN), Err(SensorError::OutOfRange));
    }
}
