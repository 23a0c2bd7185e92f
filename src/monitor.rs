//! Sampling and upload loop.
//!
//! One cycle walks `Idle -> Connecting -> Sampling -> Classifying ->
//! Uploading -> Idle`. Any failure logs and drops straight back to `Idle`;
//! the loop itself never stops. A rejected API key halts uploads for the rest
//! of the run since the settings cannot change until the node is
//! re-provisioned.

use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::config::Settings;
use crate::constants::{
    CONNECT_MAX_RETRIES, CONNECT_RETRY_DELAY_MS, UPLOAD_RETRY_DELAY_MS, WIFI_CONNECT_TIMEOUT_SECS,
};
use crate::error::{ConnectivityError, CycleError, SensorError, UploadError};
use crate::reading::Reading;
use crate::retry::RetryPolicy;
use crate::severity::{assess, Assessment};
use crate::telemetry::UploadResult;

/// Keeps the node on the network.
pub trait NetworkConnector {
    /// Whatever the uploader needs to open connections (e.g. the IP stack).
    type Handle;

    /// Returns immediately when already connected.
    async fn ensure_connected(&mut self) -> Result<Self::Handle, ConnectivityError>;
}

pub trait SensorReader {
    async fn read(&mut self) -> Result<Reading, SensorError>;
}

pub trait TelemetryUploader<H> {
    async fn upload(
        &mut self,
        handle: &H,
        api_key: &str,
        reading: &Reading,
        assessment: &Assessment,
    ) -> Result<UploadResult, UploadError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Last cycle uploaded successfully
    Healthy,
    /// Last cycle failed, will try again
    Degraded,
    /// Uploads halted until the configuration is fixed
    ConfigError,
}

pub trait StatusIndicator {
    fn show(&mut self, status: Status);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Connecting,
    Sampling,
    Classifying,
    Uploading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Uploaded(UploadResult),
    /// Uploads are halted, the reading was only logged
    UploadSkipped,
    Failed(CycleError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub reading: Option<Reading>,
    pub assessment: Option<Assessment>,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    fn failed(reading: Option<Reading>, assessment: Option<Assessment>, e: CycleError) -> Self {
        Self {
            reading,
            assessment,
            outcome: CycleOutcome::Failed(e),
        }
    }
}

pub struct Monitor<'a, C, S, U, I, D> {
    settings: &'a Settings,
    connector: C,
    sensors: S,
    uploader: U,
    indicator: I,
    delay: D,
    connect_policy: RetryPolicy,
    upload_policy: RetryPolicy,
    state: CycleState,
    uploads_halted: bool,
}

impl<'a, C, S, U, I, D> Monitor<'a, C, S, U, I, D>
where
    C: NetworkConnector,
    S: SensorReader,
    U: TelemetryUploader<C::Handle>,
    I: StatusIndicator,
    D: DelayNs,
{
    pub fn new(
        settings: &'a Settings,
        connector: C,
        sensors: S,
        uploader: U,
        indicator: I,
        delay: D,
    ) -> Self {
        Self {
            settings,
            connector,
            sensors,
            uploader,
            indicator,
            delay,
            connect_policy: RetryPolicy::exponential(
                CONNECT_MAX_RETRIES,
                CONNECT_RETRY_DELAY_MS,
                (WIFI_CONNECT_TIMEOUT_SECS * 1000) as u32,
            ),
            upload_policy: RetryPolicy::once(UPLOAD_RETRY_DELAY_MS),
            state: CycleState::Idle,
            uploads_halted: false,
        }
    }

    pub fn with_connect_policy(mut self, policy: RetryPolicy) -> Self {
        self.connect_policy = policy;
        self
    }

    pub fn with_upload_policy(mut self, policy: RetryPolicy) -> Self {
        self.upload_policy = policy;
        self
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn uploads_halted(&self) -> bool {
        self.uploads_halted
    }

    /// Runs cycles forever, sleeping the measurement interval in between.
    pub async fn run(&mut self) {
        loop {
            self.tick().await;
        }
    }

    /// One cycle followed by the measurement interval.
    pub async fn tick(&mut self) -> CycleReport {
        let report = self.run_cycle().await;
        self.delay
            .delay_ms(u32::from(self.settings.measurement_interval_seconds) * 1000)
            .await;
        report
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        self.enter(CycleState::Connecting);
        let handle = match self.connect().await {
            Ok(handle) => handle,
            Err(e) => return self.abort(None, None, e.into()),
        };

        self.enter(CycleState::Sampling);
        let reading = match self.sensors.read().await {
            Ok(reading) => reading,
            Err(e) => return self.abort(None, None, e.into()),
        };
        debug!("Reading: {:?}", reading);

        self.enter(CycleState::Classifying);
        let assessment = assess(&reading, &self.settings.thresholds);
        info!(
            "TVOC {:.1} ppb ({}), CO {:.1} ppm ({}), overall {}",
            reading.tvoc_ppb, assessment.tvoc, reading.co_ppm, assessment.co, assessment.overall
        );

        if self.uploads_halted {
            warn!("Uploads halted: API key was rejected, fix the configuration");
            self.enter(CycleState::Idle);
            return CycleReport {
                reading: Some(reading),
                assessment: Some(assessment),
                outcome: CycleOutcome::UploadSkipped,
            };
        }

        self.enter(CycleState::Uploading);
        match self.upload(&handle, &reading, &assessment).await {
            Ok(result) => {
                info!("Telemetry uploaded, entry {}", result.entry_id);
                self.indicator.show(Status::Healthy);
                self.enter(CycleState::Idle);
                CycleReport {
                    reading: Some(reading),
                    assessment: Some(assessment),
                    outcome: CycleOutcome::Uploaded(result),
                }
            }
            Err(UploadError::AuthRejected) => {
                error!("Server rejected the API key, halting uploads");
                self.uploads_halted = true;
                self.abort(
                    Some(reading),
                    Some(assessment),
                    UploadError::AuthRejected.into(),
                )
            }
            Err(e) => self.abort(Some(reading), Some(assessment), e.into()),
        }
    }

    async fn connect(&mut self) -> Result<C::Handle, ConnectivityError> {
        let mut backoff = self.connect_policy.backoff();
        loop {
            match self.connector.ensure_connected().await {
                Ok(handle) => return Ok(handle),
                Err(e) => match backoff.next() {
                    Some(wait_ms) => {
                        warn!(
                            "Network not ready: {}, retry {}/{} in {}ms",
                            e,
                            backoff.retries(),
                            self.connect_policy.max_retries,
                            wait_ms
                        );
                        self.delay.delay_ms(wait_ms).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    async fn upload(
        &mut self,
        handle: &C::Handle,
        reading: &Reading,
        assessment: &Assessment,
    ) -> Result<UploadResult, UploadError> {
        let mut backoff = self.upload_policy.backoff();
        loop {
            let result = self
                .uploader
                .upload(handle, self.settings.api_key, reading, assessment)
                .await;

            match result {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() => match backoff.next() {
                    Some(wait_ms) => {
                        warn!("Upload failed: {}, retrying in {}ms", e, wait_ms);
                        self.delay.delay_ms(wait_ms).await;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn enter(&mut self, state: CycleState) {
        debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn abort(
        &mut self,
        reading: Option<Reading>,
        assessment: Option<Assessment>,
        e: CycleError,
    ) -> CycleReport {
        error!("Cycle failed in {:?}: {}", self.state, e);
        self.indicator.show(if self.uploads_halted {
            Status::ConfigError
        } else {
            Status::Degraded
        });
        self.enter(CycleState::Idle);
        CycleReport::failed(reading, assessment, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AirQualityThresholds;
    use crate::severity::Severity;
    use crate::testutil::FakeDelay;
    use std::collections::VecDeque;

    static SETTINGS: Settings = Settings {
        wifi_ssid: "ssid",
        wifi_psk: "secret",
        hostname: "air-quality-node",
        server: "api.thingspeak.com",
        port: 443,
        api_key: "WRITEKEY",
        thresholds: AirQualityThresholds {
            tvoc: crate::config::Thresholds {
                warning: 200,
                danger: 500,
            },
            co: crate::config::Thresholds {
                warning: 30,
                danger: 50,
            },
        },
        measurement_interval_seconds: 60,
        tls_ca: None,
    };

    #[derive(Default)]
    struct FakeConnector {
        calls: usize,
        failures: usize,
    }

    impl NetworkConnector for FakeConnector {
        type Handle = u8;

        async fn ensure_connected(&mut self) -> Result<u8, ConnectivityError> {
            self.calls += 1;
            if self.failures > 0 {
                self.failures -= 1;
                return Err(ConnectivityError::NoAddress);
            }
            Ok(7)
        }
    }

    struct FakeSensors {
        calls: usize,
        result: Result<(f32, f32), SensorError>,
    }

    impl FakeSensors {
        fn returning(tvoc_ppb: f32, co_ppm: f32) -> Self {
            Self {
                calls: 0,
                result: Ok((tvoc_ppb, co_ppm)),
            }
        }
    }

    impl SensorReader for FakeSensors {
        async fn read(&mut self) -> Result<Reading, SensorError> {
            self.calls += 1;
            let (tvoc, co) = self.result?;
            Reading::new(self.calls as u64, tvoc, co)
        }
    }

    /// Pops scripted results, succeeds once the script is empty.
    #[derive(Default)]
    struct FakeUploader {
        script: VecDeque<Result<UploadResult, UploadError>>,
        uploads: Vec<(u8, String, Reading, Assessment)>,
    }

    impl FakeUploader {
        fn scripted(results: impl IntoIterator<Item = Result<UploadResult, UploadError>>) -> Self {
            Self {
                script: results.into_iter().collect(),
                uploads: Vec::new(),
            }
        }
    }

    impl TelemetryUploader<u8> for FakeUploader {
        async fn upload(
            &mut self,
            handle: &u8,
            api_key: &str,
            reading: &Reading,
            assessment: &Assessment,
        ) -> Result<UploadResult, UploadError> {
            self.uploads
                .push((*handle, api_key.to_string(), *reading, *assessment));
            self.script.pop_front().unwrap_or(Ok(UploadResult {
                entry_id: self.uploads.len() as u32,
            }))
        }
    }

    #[derive(Default)]
    struct FakeIndicator {
        shown: Vec<Status>,
    }

    impl StatusIndicator for FakeIndicator {
        fn show(&mut self, status: Status) {
            self.shown.push(status);
        }
    }

    type TestMonitor =
        Monitor<'static, FakeConnector, FakeSensors, FakeUploader, FakeIndicator, FakeDelay>;

    fn monitor(sensors: FakeSensors, uploader: FakeUploader) -> TestMonitor {
        Monitor::new(
            &SETTINGS,
            FakeConnector::default(),
            sensors,
            uploader,
            FakeIndicator::default(),
            FakeDelay::default(),
        )
    }

    #[tokio::test]
    async fn test_cycle_runs_each_step_once() {
        let mut m = monitor(FakeSensors::returning(150.0, 20.0), FakeUploader::default());

        let report = m.run_cycle().await;

        assert_eq!(
            report.outcome,
            CycleOutcome::Uploaded(UploadResult { entry_id: 1 })
        );
        assert_eq!(m.connector.calls, 1);
        assert_eq!(m.sensors.calls, 1);
        assert_eq!(m.uploader.uploads.len(), 1);
        assert_eq!(m.state(), CycleState::Idle);
        assert_eq!(m.indicator.shown, vec![Status::Healthy]);
        assert!(m.delay.waits_ms.is_empty());
    }

    #[tokio::test]
    async fn test_upload_carries_handle_key_and_assessment() {
        let mut m = monitor(FakeSensors::returning(100.0, 60.0), FakeUploader::default());

        let report = m.run_cycle().await;

        let (handle, key, reading, assessment) = &m.uploader.uploads[0];
        assert_eq!(*handle, 7);
        assert_eq!(key, "WRITEKEY");
        assert_eq!(reading.tvoc_ppb, 100.0);
        assert_eq!(reading.co_ppm, 60.0);
        assert_eq!(assessment.overall, Severity::Danger);
        assert_eq!(report.assessment, Some(*assessment));
    }

    #[tokio::test]
    async fn test_scenarios() {
        let cases = [
            (150.0, 20.0, Severity::Normal),
            (250.0, 10.0, Severity::Warning),
            (100.0, 60.0, Severity::Danger),
        ];

        for (tvoc, co, expected) in cases {
            let mut m = monitor(FakeSensors::returning(tvoc, co), FakeUploader::default());
            let report = m.run_cycle().await;
            assert_eq!(
                report.assessment.map(|a| a.overall),
                Some(expected),
                "tvoc={tvoc} co={co}"
            );
        }
    }

    #[tokio::test]
    async fn test_no_duplicate_uploads_across_cycles() {
        let mut m = monitor(FakeSensors::returning(150.0, 20.0), FakeUploader::default());

        for _ in 0..3 {
            m.run_cycle().await;
        }

        assert_eq!(m.connector.calls, 3);
        assert_eq!(m.sensors.calls, 3);
        assert_eq!(m.uploader.uploads.len(), 3);
        let timestamps: Vec<u64> = m
            .uploader
            .uploads
            .iter()
            .map(|(_, _, r, _)| r.timestamp_ms)
            .collect();
        assert_eq!(timestamps, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_auth_rejected_is_not_retried_and_halts_uploads() {
        let mut m = monitor(
            FakeSensors::returning(150.0, 20.0),
            FakeUploader::scripted([Err(UploadError::AuthRejected)]),
        );

        let first = m.run_cycle().await;
        assert_eq!(
            first.outcome,
            CycleOutcome::Failed(CycleError::Upload(UploadError::AuthRejected))
        );
        assert_eq!(m.uploader.uploads.len(), 1);
        assert!(m.delay.waits_ms.is_empty());
        assert!(m.uploads_halted());

        // The loop keeps going, it just stops uploading
        let second = m.run_cycle().await;
        assert_eq!(second.outcome, CycleOutcome::UploadSkipped);
        assert!(second.assessment.is_some());
        assert_eq!(m.connector.calls, 2);
        assert_eq!(m.sensors.calls, 2);
        assert_eq!(m.uploader.uploads.len(), 1);
        assert_eq!(m.state(), CycleState::Idle);
        assert_eq!(m.indicator.shown, vec![Status::ConfigError]);
    }

    #[tokio::test]
    async fn test_timeout_is_retried_once() {
        let mut m = monitor(
            FakeSensors::returning(150.0, 20.0),
            FakeUploader::scripted([Err(UploadError::Timeout)]),
        );

        let report = m.run_cycle().await;

        assert!(matches!(report.outcome, CycleOutcome::Uploaded(_)));
        assert_eq!(m.uploader.uploads.len(), 2);
        assert_eq!(m.delay.waits_ms, vec![UPLOAD_RETRY_DELAY_MS]);
    }

    #[tokio::test]
    async fn test_server_error_surfaces_after_one_retry() {
        let mut m = monitor(
            FakeSensors::returning(150.0, 20.0),
            FakeUploader::scripted([
                Err(UploadError::ServerError(503)),
                Err(UploadError::ServerError(503)),
            ]),
        );

        let report = m.run_cycle().await;

        assert_eq!(
            report.outcome,
            CycleOutcome::Failed(CycleError::Upload(UploadError::ServerError(503)))
        );
        assert_eq!(m.uploader.uploads.len(), 2);
        assert!(!m.uploads_halted());
        assert_eq!(m.indicator.shown, vec![Status::Degraded]);

        // Next cycle succeeds again
        let report = m.run_cycle().await;
        assert!(matches!(report.outcome, CycleOutcome::Uploaded(_)));
        assert_eq!(m.indicator.shown, vec![Status::Degraded, Status::Healthy]);
    }

    #[tokio::test]
    async fn test_connect_retries_with_backoff() {
        let mut m = monitor(FakeSensors::returning(150.0, 20.0), FakeUploader::default());
        m.connector.failures = 2;

        let report = m.run_cycle().await;

        assert!(matches!(report.outcome, CycleOutcome::Uploaded(_)));
        assert_eq!(m.connector.calls, 3);
        assert_eq!(
            m.delay.waits_ms,
            vec![CONNECT_RETRY_DELAY_MS, CONNECT_RETRY_DELAY_MS * 2]
        );
    }

    #[tokio::test]
    async fn test_connectivity_error_after_budget() {
        let mut m = monitor(FakeSensors::returning(150.0, 20.0), FakeUploader::default())
            .with_connect_policy(RetryPolicy::exponential(2, 10, 100));
        m.connector.failures = usize::MAX;

        let report = m.run_cycle().await;

        assert_eq!(
            report.outcome,
            CycleOutcome::Failed(CycleError::Connectivity(ConnectivityError::NoAddress))
        );
        assert_eq!(m.connector.calls, 3);
        assert_eq!(m.sensors.calls, 0);
        assert!(m.uploader.uploads.is_empty());
        assert_eq!(m.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn test_sensor_error_skips_upload() {
        let sensors = FakeSensors {
            calls: 0,
            result: Err(SensorError::NotReady),
        };
        let mut m = monitor(sensors, FakeUploader::default());

        let report = m.run_cycle().await;

        assert_eq!(
            report.outcome,
            CycleOutcome::Failed(CycleError::Sensor(SensorError::NotReady))
        );
        assert!(report.reading.is_none());
        assert!(m.uploader.uploads.is_empty());
        assert_eq!(m.indicator.shown, vec![Status::Degraded]);
    }

    #[tokio::test]
    async fn test_tick_sleeps_measurement_interval() {
        let mut m = monitor(FakeSensors::returning(150.0, 20.0), FakeUploader::default());

        m.tick().await;

        assert_eq!(m.delay.waits_ms, vec![60_000]);
    }

    #[tokio::test]
    async fn test_upload_policy_override() {
        let mut m = monitor(
            FakeSensors::returning(150.0, 20.0),
            FakeUploader::scripted([Err(UploadError::Timeout)]),
        )
        .with_upload_policy(RetryPolicy::none());

        let report = m.run_cycle().await;

        assert_eq!(
            report.outcome,
            CycleOutcome::Failed(CycleError::Upload(UploadError::Timeout))
        );
        assert_eq!(m.uploader.uploads.len(), 1);
    }
}
