use thiserror::Error;

/// Invalid `Settings`
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    MissingField(&'static str),

    #[error("hostname longer than 32 bytes")]
    HostnameTooLong,

    #[error("{0} warning threshold must be below its danger threshold")]
    ThresholdOrder(&'static str),

    #[error("measurement interval of {0}s is below the server minimum")]
    IntervalTooShort(u16),
}

/// The node could not get onto the network
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    #[error("timed out waiting for the network")]
    Timeout,

    #[error("WiFi link is down")]
    LinkDown,

    #[error("no IPv4 address assigned")]
    NoAddress,
}

/// A telemetry upload failed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadError {
    #[error("upload timed out")]
    Timeout,

    /// The server refused the API key. Retrying cannot help.
    #[error("API key rejected by the server")]
    AuthRejected,

    /// HTTP status of the failed request, 0 when the entry itself was refused
    #[error("server error (status {0})")]
    ServerError(u16),
}

impl UploadError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, UploadError::AuthRejected)
    }
}

/// A sensor could not produce a reading
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("sensor initialisation failed")]
    InitFailure,

    #[error("sensor data not ready")]
    NotReady,

    #[error("bus communication error")]
    Bus,

    #[error("sensor reported an internal error")]
    DeviceError,

    #[error("raw value out of range")]
    OutOfRange,

    #[error("reading is not a finite number")]
    InvalidValue,
}

/// Why a monitor cycle went back to idle early
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleError {
    #[error("connectivity: {0}")]
    Connectivity(#[from] ConnectivityError),

    #[error("sensor: {0}")]
    Sensor(#[from] SensorError),

    #[error("upload: {0}")]
    Upload(#[from] UploadError),
}
