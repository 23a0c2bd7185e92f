#![no_std]
#![no_main]

use static_cell::StaticCell;

use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Timer};

use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{self as hal};
use esp_println::logger::init_logger;

use hal::{
    analog::adc::{Adc, AdcConfig, Attenuation},
    gpio::{Level, Output, OutputConfig},
    i2c::master::I2c,
    rng::Rng,
    time::Rate,
    timer::timg::TimerGroup,
};

extern crate alloc;

mod gas_sensors;
mod status_led;
mod thingspeak;
mod transport;
mod wifi;

use esp32_air_quality::config::PROVISIONED;
use esp32_air_quality::constants::*;
use esp32_air_quality::sensor::{Ccs811, Mq7Calibration, CCS811_ADDRESS};
use esp32_air_quality::{Monitor, Settings};

use gas_sensors::GasSensors;
use status_led::StatusLed;
use thingspeak::ThingSpeak;
use transport::HwRng;
use wifi::Wifi;

esp_bootloader_esp_idf::esp_app_desc!();

type NodeMonitor = Monitor<'static, Wifi, GasSensors, ThingSpeak, StatusLed, Delay>;

static SETTINGS: StaticCell<Settings> = StaticCell::new();
static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

static RX_BUF: StaticCell<[u8; RX_BUFFER_SIZE]> = StaticCell::new();
static TX_BUF: StaticCell<[u8; TX_BUFFER_SIZE]> = StaticCell::new();
static TLS_READ_BUF: StaticCell<[u8; TLS_READ_BUFFER_SIZE]> = StaticCell::new();
static TLS_WRITE_BUF: StaticCell<[u8; TLS_WRITE_BUFFER_SIZE]> = StaticCell::new();

#[esp_rtos::main]
async fn main(spawner: Spawner) {
    init_logger(log::LevelFilter::Info);
    log::info!("Air quality node v{}", VERSION);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_alloc::heap_allocator!(size: HEAP_SIZE);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let mut led = Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default());

    let settings: &'static Settings = SETTINGS.init(PROVISIONED);
    if let Err(e) = settings.validate() {
        log::error!("Invalid configuration: {}", e);
        led.set_high();
        loop {
            park().await;
        }
    }

    // possibly high transient required at init
    // https://github.com/esp-rs/esp-hal/issues/1626
    Timer::after(Duration::from_millis(1000)).await;

    let i2c_config = hal::i2c::master::Config::default().with_frequency(Rate::from_khz(100));
    let i2c = I2c::new(peripherals.I2C0, i2c_config)
        .unwrap()
        .with_sda(peripherals.GPIO21)
        .with_scl(peripherals.GPIO22)
        .into_async();

    let tvoc = match Ccs811::new(i2c, Delay, CCS811_ADDRESS).await {
        Ok(sensor) => sensor,
        Err(e) => {
            log::error!("TVOC sensor unavailable: {}", e);
            led.set_high();
            loop {
                park().await;
            }
        }
    };

    let mut adc_config = AdcConfig::new();
    let co_pin = adc_config.enable_pin(peripherals.GPIO34, Attenuation::_11dB);
    let adc = Adc::new(peripherals.ADC1, adc_config);

    let sensors = GasSensors::new(
        tvoc,
        adc,
        co_pin,
        Mq7Calibration {
            load_kohm: MQ7_LOAD_RESISTANCE_KOHM,
            r0_kohm: MQ7_CLEAN_AIR_RESISTANCE_KOHM,
            supply_mv: MQ7_SUPPLY_MV,
        },
    );

    let radio = RADIO.init(esp_radio::init().unwrap());
    let rng = Rng::new();

    let wifi = match Wifi::new(radio, peripherals.WIFI, rng.clone(), settings, spawner) {
        Ok(wifi) => wifi,
        Err(e) => {
            log::error!("WiFi init failed: {:?}", e);
            led.set_high();
            loop {
                park().await;
            }
        }
    };

    let uploader = ThingSpeak::new(
        settings,
        HwRng(rng),
        RX_BUF.init([0; RX_BUFFER_SIZE]),
        TX_BUF.init([0; TX_BUFFER_SIZE]),
        TLS_READ_BUF.init([0; TLS_READ_BUFFER_SIZE]),
        TLS_WRITE_BUF.init([0; TLS_WRITE_BUFFER_SIZE]),
    );

    let monitor = Monitor::new(
        settings,
        wifi,
        sensors,
        uploader,
        StatusLed::new(led),
        Delay,
    );

    spawner.spawn(monitor_task(monitor)).ok();
}

#[embassy_executor::task]
async fn monitor_task(mut monitor: NodeMonitor) {
    monitor.run().await
}

/// Parks the node after a fatal boot error.
async fn park() {
    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}
