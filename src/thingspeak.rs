use embassy_net::Stack;
use embassy_time::{with_timeout, Duration};

use esp32_air_quality::constants::*;
use esp32_air_quality::telemetry::{
    format_update_request, parse_update_response, response_complete, UploadResult,
};
use esp32_air_quality::{Assessment, Reading, Settings, TelemetryUploader, UploadError};

use crate::transport::{Buffers, HwRng, Transport};

/// Posts readings to the ThingSpeak `/update` endpoint.
pub struct ThingSpeak {
    settings: &'static Settings,
    rng: HwRng,
    rx_buf: &'static mut [u8; RX_BUFFER_SIZE],
    tx_buf: &'static mut [u8; TX_BUFFER_SIZE],
    tls_read_buf: &'static mut [u8; TLS_READ_BUFFER_SIZE],
    tls_write_buf: &'static mut [u8; TLS_WRITE_BUFFER_SIZE],
    response_buf: [u8; HTTP_RESPONSE_BUFFER_SIZE],
}

impl ThingSpeak {
    pub fn new(
        settings: &'static Settings,
        rng: HwRng,
        rx_buf: &'static mut [u8; RX_BUFFER_SIZE],
        tx_buf: &'static mut [u8; TX_BUFFER_SIZE],
        tls_read_buf: &'static mut [u8; TLS_READ_BUFFER_SIZE],
        tls_write_buf: &'static mut [u8; TLS_WRITE_BUFFER_SIZE],
    ) -> Self {
        Self {
            settings,
            rng,
            rx_buf,
            tx_buf,
            tls_read_buf,
            tls_write_buf,
            response_buf: [0; HTTP_RESPONSE_BUFFER_SIZE],
        }
    }

    async fn exchange(
        &mut self,
        stack: Stack<'static>,
        api_key: &str,
        reading: &Reading,
        assessment: &Assessment,
    ) -> Result<UploadResult, UploadError> {
        let request = format_update_request(self.settings.server, api_key, reading, assessment)
            .map_err(|_| {
                log::error!("Update request does not fit the request buffer");
                UploadError::ServerError(0)
            })?;

        let buffers = Buffers {
            rx: &mut self.rx_buf[..],
            tx: &mut self.tx_buf[..],
            tls_read: &mut self.tls_read_buf[..],
            tls_write: &mut self.tls_write_buf[..],
        };

        // An unreachable server is treated like one that never answered
        let mut transport = Transport::new(
            stack,
            &mut self.rng,
            buffers,
            self.settings.server,
            self.settings.port,
            self.settings.tls_ca,
        )
        .await
        .map_err(|e| {
            log::error!("Could not reach {}: {:?}", self.settings.server, e);
            UploadError::Timeout
        })?;

        log::debug!("POST {}:{}/update", self.settings.server, self.settings.port);
        transport
            .send(request.as_bytes())
            .await
            .map_err(|_| UploadError::Timeout)?;

        let len = transport
            .receive(&mut self.response_buf, response_complete)
            .await
            .map_err(|_| UploadError::Timeout)?;
        if len == self.response_buf.len() && !response_complete(&self.response_buf) {
            log::warn!("Response exceeded {} bytes", HTTP_RESPONSE_BUFFER_SIZE);
        }

        parse_update_response(&self.response_buf[..len])
    }
}

impl TelemetryUploader<Stack<'static>> for ThingSpeak {
    async fn upload(
        &mut self,
        stack: &Stack<'static>,
        api_key: &str,
        reading: &Reading,
        assessment: &Assessment,
    ) -> Result<UploadResult, UploadError> {
        with_timeout(
            Duration::from_secs(NETWORK_TIMEOUT_SECS),
            self.exchange(*stack, api_key, reading, assessment),
        )
        .await
        .map_err(|_| {
            log::error!("Upload timed out after {}s", NETWORK_TIMEOUT_SECS);
            UploadError::Timeout
        })?
    }
}
