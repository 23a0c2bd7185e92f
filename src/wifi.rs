use embassy_executor::Spawner;
use embassy_net::{Runner, Stack, StackResources};
use embassy_time::{with_timeout, Duration, Timer};

use esp_hal::rng::Rng;
use esp_radio::{
    wifi::{ClientConfig, Config, ModeConfig, WifiController, WifiDevice, WifiEvent, WifiStaState},
    Controller,
};

use core::str::FromStr;
use heapless::String;
use log::info;
use static_cell::StaticCell;

use esp32_air_quality::constants::{WIFI_CONNECT_TIMEOUT_SECS, WIFI_RECONNECT_DELAY_MS};
use esp32_air_quality::{ConnectivityError, NetworkConnector, Settings};

static RESOURCES: StaticCell<StackResources<5>> = StaticCell::new();

/// WiFi station plus the embassy-net stack running on top of it.
pub struct Wifi {
    pub stack: Stack<'static>,
}

#[derive(Debug)]
pub enum Error {
    WifiInitFailed,
    HostnameTooLong,
    TaskSpawnFailed,
}

impl Wifi {
    pub fn new(
        init: &'static Controller<'static>,
        wifi: esp_hal::peripherals::WIFI<'static>,
        rng: Rng,
        settings: &'static Settings,
        spawner: Spawner,
    ) -> Result<Self, Error> {
        let (controller, interfaces) = esp_radio::wifi::new(init, wifi, Config::default())
            .map_err(|_| Error::WifiInitFailed)?;

        let mut dhcp_config = embassy_net::DhcpConfig::default();
        dhcp_config.hostname =
            Some(String::<32>::from_str(settings.hostname).map_err(|_| Error::HostnameTooLong)?);

        let seed = (rng.random() as u64) << 32 | rng.random() as u64;
        let config = embassy_net::Config::dhcpv4(dhcp_config);

        let resources = RESOURCES.init(StackResources::new());
        let (stack, runner) = embassy_net::new(interfaces.sta, config, resources, seed);

        spawner
            .spawn(connection(controller, settings))
            .map_err(|_| Error::TaskSpawnFailed)?;
        spawner
            .spawn(net_task(runner))
            .map_err(|_| Error::TaskSpawnFailed)?;

        Ok(Self { stack })
    }

    fn is_up(&self) -> bool {
        self.stack.is_link_up() && self.stack.config_v4().is_some()
    }

    async fn wait_up(&self) {
        self.stack.wait_link_up().await;
        info!("WiFi link up, waiting for DHCP lease...");
        self.stack.wait_config_up().await;
    }
}

impl NetworkConnector for Wifi {
    type Handle = Stack<'static>;

    async fn ensure_connected(&mut self) -> Result<Stack<'static>, ConnectivityError> {
        if self.is_up() {
            return Ok(self.stack);
        }

        info!("Waiting for network stack to be ready...");
        match with_timeout(
            Duration::from_secs(WIFI_CONNECT_TIMEOUT_SECS),
            self.wait_up(),
        )
        .await
        {
            Ok(()) => {
                if let Some(config) = self.stack.config_v4() {
                    info!("Got IP: {}", config.address);
                }
                Ok(self.stack)
            }
            Err(_) if !self.stack.is_link_up() => Err(ConnectivityError::LinkDown),
            Err(_) => Err(ConnectivityError::NoAddress),
        }
    }
}

/// Keeps the station associated, reconnecting whenever the link drops.
#[embassy_executor::task]
async fn connection(mut controller: WifiController<'static>, settings: &'static Settings) {
    info!(
        "Start connection task, device capabilities: {:?}",
        controller.capabilities()
    );
    loop {
        if esp_radio::wifi::sta_state() == WifiStaState::Connected {
            // wait until we're no longer connected
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            log::warn!("WiFi disconnected");
            Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await
        }

        if !matches!(controller.is_started(), Ok(true)) {
            info!("Connecting to wifi with SSID: {:?}", settings.wifi_ssid);
            let client_config = ClientConfig::default()
                .with_ssid(settings.wifi_ssid.into())
                .with_password(settings.wifi_psk.into());
            let config = ModeConfig::Client(client_config);
            if let Err(e) = controller.set_config(&config) {
                log::error!("Failed to set WiFi config: {:?}. Retrying...", e);
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await;
                continue;
            }
            info!("Starting wifi");
            if let Err(e) = controller.start_async().await {
                log::error!("Failed to start WiFi: {:?}. Retrying...", e);
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await;
                continue;
            }
            info!("Wifi started!");
        }

        info!("About to connect to {:?}...", settings.wifi_ssid);
        match with_timeout(
            Duration::from_secs(WIFI_CONNECT_TIMEOUT_SECS),
            controller.connect_async(),
        )
        .await
        {
            Ok(Ok(_)) => info!("Wifi connected!"),
            Ok(Err(e)) => {
                info!("Failed to connect to wifi: {e:?}");
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await
            }
            Err(_) => {
                info!("Wifi connection timed out");
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await
            }
        }
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}
