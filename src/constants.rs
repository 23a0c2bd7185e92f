/// Current firmware version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Size of the heap in DRAM (internal memory)
pub const HEAP_SIZE: usize = 72 * 1024;

/// Size of the TCP socket receive buffer
pub const RX_BUFFER_SIZE: usize = 4096;
/// Size of the TCP socket transmit buffer
pub const TX_BUFFER_SIZE: usize = 4096;

/// TLS record buffers (embedded-tls needs a full 16 KiB record on read)
pub const TLS_READ_BUFFER_SIZE: usize = 16640;
pub const TLS_WRITE_BUFFER_SIZE: usize = 4096;

/// Capacity of a formatted update request (headers + form body)
pub const HTTP_REQUEST_CAPACITY: usize = 512;
/// Buffer for the server response, headers included
pub const HTTP_RESPONSE_BUFFER_SIZE: usize = 2048;

/// DHCP hostnames are carried in a `heapless::String<32>`
pub const MAX_HOSTNAME_LEN: usize = 32;

/// ThingSpeak rejects channel updates spaced less than 15 seconds apart
pub const MIN_MEASUREMENT_INTERVAL_SECS: u16 = 15;

/// Maximum time to wait for a WiFi association and DHCP lease
pub const WIFI_CONNECT_TIMEOUT_SECS: u64 = 20;
/// Delay before the background task retries a dropped connection
pub const WIFI_RECONNECT_DELAY_MS: u64 = 5_000;

/// Retries after a failed connect-check within one cycle
pub const CONNECT_MAX_RETRIES: u32 = 3;
/// Initial backoff between connect-check attempts
pub const CONNECT_RETRY_DELAY_MS: u32 = 1_000;

/// Upper bound for every DNS lookup, TCP/TLS handshake and HTTP exchange
pub const NETWORK_TIMEOUT_SECS: u64 = 15;

/// Backoff before the single upload retry
pub const UPLOAD_RETRY_DELAY_MS: u32 = 2_000;

/// Number of STATUS polls before a CCS811 read gives up
pub const CCS811_DATA_READY_ATTEMPTS: u8 = 20;
/// Delay between two CCS811 STATUS polls
pub const CCS811_POLL_INTERVAL_MS: u32 = 100;

/// MQ-7 load resistor on the breakout board, in kOhm
pub const MQ7_LOAD_RESISTANCE_KOHM: f32 = 10.0;
/// MQ-7 sensor resistance in clean air, in kOhm (calibrate per sensor)
pub const MQ7_CLEAN_AIR_RESISTANCE_KOHM: f32 = 27.5;
/// Voltage across the MQ-7 divider, in millivolts
pub const MQ7_SUPPLY_MV: f32 = 3300.0;
