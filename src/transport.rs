use embassy_net::{
    dns::{DnsQueryType, Error as DNSError},
    tcp::{ConnectError, TcpSocket},
    Stack,
};
use embassy_time::Duration;
use embedded_io_async::{Read, Write};
use esp_hal::rng::Rng;

#[cfg(feature = "tls")]
use alloc::{string::String, vec::Vec};
#[cfg(feature = "tls")]
use embedded_tls::{Aes128GcmSha256, TlsConfig, TlsConnection, TlsContext, UnsecureProvider};

use esp32_air_quality::constants::NETWORK_TIMEOUT_SECS;

#[derive(Debug)]
pub enum Error {
    #[allow(dead_code)]
    DNSQueryFailed(DNSError),
    DNSLookupFailed,
    #[allow(dead_code)]
    SocketConnectionError(ConnectError),
    #[cfg_attr(not(feature = "tls"), allow(dead_code))]
    TLSHandshakeFailed,
    #[cfg_attr(not(feature = "tls"), allow(dead_code))]
    PEMParseError,
    Write,
    Read,
}

#[cfg(feature = "tls")]
type Session<'a> = TlsConnection<'a, TcpSocket<'a>, Aes128GcmSha256>;
#[cfg(not(feature = "tls"))]
type Session<'a> = TcpSocket<'a>;

/// Hardware RNG seen through `rand_core`, seeded from RF noise while the
/// radio is running.
pub struct HwRng(pub Rng);

impl rand_core::RngCore for HwRng {
    fn next_u32(&mut self) -> u32 {
        self.0.random()
    }

    fn next_u64(&mut self) -> u64 {
        (self.0.random() as u64) << 32 | self.0.random() as u64
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.0.random().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl rand_core::CryptoRng for HwRng {}

/// One connection to the telemetry server, plain TCP or a TLS session on top.
pub struct Transport<'a> {
    session: Session<'a>,
}

/// Buffers a transport borrows for its lifetime.
pub struct Buffers<'a> {
    pub rx: &'a mut [u8],
    pub tx: &'a mut [u8],
    #[cfg_attr(not(feature = "tls"), allow(dead_code))]
    pub tls_read: &'a mut [u8],
    #[cfg_attr(not(feature = "tls"), allow(dead_code))]
    pub tls_write: &'a mut [u8],
}

async fn connect_socket<'a>(
    stack: Stack<'static>,
    rx: &'a mut [u8],
    tx: &'a mut [u8],
    hostname: &str,
    port: u16,
) -> Result<TcpSocket<'a>, Error> {
    let mut socket = TcpSocket::new(stack, rx, tx);
    socket.set_timeout(Some(Duration::from_secs(NETWORK_TIMEOUT_SECS)));

    let addr = stack
        .dns_query(hostname, DnsQueryType::A)
        .await
        .map_err(Error::DNSQueryFailed)?
        .first()
        .copied()
        .ok_or(Error::DNSLookupFailed)?;

    log::info!("Connecting TCP socket to {}:{}", hostname, port);
    socket
        .connect((addr, port))
        .await
        .map_err(Error::SocketConnectionError)?;
    log::debug!("TCP connected");

    Ok(socket)
}

impl<'a> Transport<'a> {
    #[cfg(feature = "tls")]
    pub async fn new(
        stack: Stack<'static>,
        rng: &mut HwRng,
        buffers: Buffers<'a>,
        hostname: &'a str,
        port: u16,
        tls_ca: Option<&str>,
    ) -> Result<Self, Error> {
        let socket = connect_socket(stack, buffers.rx, buffers.tx, hostname, port).await?;

        let mut config = TlsConfig::new().with_server_name(hostname);

        let ca_der;
        if let Some(ca_chain) = tls_ca {
            ca_der = decode_pem(ca_chain)?;
            config = config.with_ca(embedded_tls::Certificate::X509(&ca_der));
            log::info!("CA certificate loaded: {} bytes", ca_der.len());
        } else {
            log::warn!("No CA configured, server certificate is not pinned");
        }

        let mut tls: Session<'a> =
            TlsConnection::new(socket, buffers.tls_read, buffers.tls_write);

        log::info!("Starting TLS handshake with {}", hostname);
        let crypto_provider = UnsecureProvider::new::<Aes128GcmSha256>(rng);
        tls.open(TlsContext::new(&config, crypto_provider))
            .await
            .map_err(|e| {
                log::error!("TLS handshake failed: {:?}", e);
                Error::TLSHandshakeFailed
            })?;
        log::debug!("TLS handshake complete");

        Ok(Self { session: tls })
    }

    #[cfg(not(feature = "tls"))]
    pub async fn new(
        stack: Stack<'static>,
        _rng: &mut HwRng,
        buffers: Buffers<'a>,
        hostname: &'a str,
        port: u16,
        _tls_ca: Option<&str>,
    ) -> Result<Self, Error> {
        let socket = connect_socket(stack, buffers.rx, buffers.tx, hostname, port).await?;
        Ok(Self { session: socket })
    }

    /// Writes the whole request and flushes it onto the wire.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        self.session.write_all(data).await.map_err(|e| {
            log::error!("Transport write failed: {:?}", e);
            Error::Write
        })?;
        // embedded-tls buffers records until flushed
        self.session.flush().await.map_err(|e| {
            log::error!("Transport flush failed: {:?}", e);
            Error::Write
        })
    }

    /// Reads until EOF, a full buffer, or `done` accepts what has arrived.
    pub async fn receive(
        &mut self,
        buf: &mut [u8],
        done: impl Fn(&[u8]) -> bool,
    ) -> Result<usize, Error> {
        let mut total = 0;
        while total < buf.len() {
            match self.session.read(&mut buf[total..]).await {
                Ok(0) => break,
                Ok(n) => {
                    total += n;
                    if done(&buf[..total]) {
                        break;
                    }
                }
                // Servers commonly drop the connection right after the body
                Err(e) if total > 0 => {
                    log::debug!("Read ended after {} bytes: {:?}", total, e);
                    break;
                }
                Err(e) => {
                    log::error!("Transport read failed: {:?}", e);
                    return Err(Error::Read);
                }
            }
        }
        Ok(total)
    }
}

#[cfg(feature = "tls")]
fn decode_pem(pem: &str) -> Result<Vec<u8>, Error> {
    use base64::Engine;
    let start_marker = "-----BEGIN";
    let end_marker = "-----END";
    let start = pem.find(start_marker).ok_or(Error::PEMParseError)?;
    let begin_end = pem[start..].find('\n').ok_or(Error::PEMParseError)? + start + 1;
    let end = pem.find(end_marker).ok_or(Error::PEMParseError)?;

    let base64_content: String = pem[begin_end..end]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    base64::engine::general_purpose::STANDARD
        .decode(base64_content)
        .map_err(|_| Error::PEMParseError)
}
