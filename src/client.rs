//! Status protocol client.
//!
//! Every fetch opens one TCP connection, runs the handshake, the status
//! request and the payload read, then closes the connection on every exit
//! path. The whole exchange runs under a deadline so an unresponsive target
//! cannot stall a scrape.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::protocol::{encode_handshake, encode_status_request, payload_len, PROTOCOL_VERSION};

/// Errors that end a status exchange.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    /// The length byte had its sign bit set.
    #[error("payload length byte {0:#04x} is out of range")]
    InvalidLength(u8),

    /// The connection ended before the announced payload arrived.
    /// Carries whatever was received.
    #[error("short payload: expected {expected} bytes, received {received}")]
    ShortPayload {
        expected: usize,
        received: usize,
        payload: String,
    },

    /// The deadline passed. Carries any payload bytes already received.
    #[error("exchange timed out after {after:?}")]
    Timeout { after: Duration, payload: String },
}

impl FetchError {
    /// Payload bytes received before a short read or timeout, if any.
    pub fn partial_payload(&self) -> Option<&str> {
        match self {
            FetchError::ShortPayload { payload, .. } => Some(payload),
            FetchError::Timeout { payload, .. } if !payload.is_empty() => Some(payload),
            _ => None,
        }
    }
}

/// Client for the gear server status protocol.
#[derive(Debug, Clone)]
pub struct ProtocolClient {
    timeout: Duration,
}

impl ProtocolClient {
    /// Create a client whose fetches are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Fetch the raw status payload from `address`.
    pub async fn fetch(&self, address: &str) -> Result<String, FetchError> {
        // Lives outside the timed future so a timeout still sees partial data.
        let mut received = Vec::new();
        let result = tokio::time::timeout(self.timeout, fetch_once(address, &mut received)).await;
        match result {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                after: self.timeout,
                payload: String::from_utf8_lossy(&received).into_owned(),
            }),
        }
    }
}

async fn fetch_once(address: &str, received: &mut Vec<u8>) -> Result<String, FetchError> {
    let stream = TcpStream::connect(address)
        .await
        .map_err(FetchError::Connect)?;
    debug!(server = %address, "Connected to status server");

    let mut session = Session::new(stream);
    let result = session.exchange(received).await;
    session.close().await;
    result
}

/// One protocol exchange over an owned stream. Never reused.
struct Session<S> {
    stream: S,
    version: i8,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(stream: S) -> Self {
        Self {
            stream,
            version: PROTOCOL_VERSION,
        }
    }

    /// Run the exchange. Payload bytes are appended to `buf` as they arrive.
    async fn exchange(&mut self, buf: &mut Vec<u8>) -> Result<String, FetchError> {
        self.handshake().await?;
        let len = self.request_status().await?;
        self.read_payload(len, buf).await
    }

    async fn handshake(&mut self) -> Result<(), FetchError> {
        self.send(&encode_handshake(self.version)).await?;
        // Only the presence of the ack matters.
        let ack = self.stream.read_u8().await.map_err(FetchError::Read)?;
        trace!(version = self.version, ack, "Handshake acknowledged");
        Ok(())
    }

    async fn request_status(&mut self) -> Result<usize, FetchError> {
        self.send(&encode_status_request()).await?;
        let raw = self.stream.read_u8().await.map_err(FetchError::Read)?;
        let len = payload_len(raw).ok_or(FetchError::InvalidLength(raw))?;
        trace!(len, "Status length received");
        Ok(len)
    }

    async fn read_payload(&mut self, len: usize, buf: &mut Vec<u8>) -> Result<String, FetchError> {
        buf.clear();
        buf.reserve(len);
        (&mut self.stream)
            .take(len as u64)
            .read_to_end(buf)
            .await
            .map_err(FetchError::Read)?;

        let payload = String::from_utf8_lossy(buf).into_owned();
        if buf.len() < len {
            return Err(FetchError::ShortPayload {
                expected: len,
                received: buf.len(),
                payload,
            });
        }
        trace!(%payload, "Status payload received");
        Ok(payload)
    }

    async fn send(&mut self, packet: &[u8]) -> Result<(), FetchError> {
        self.stream.write_all(packet).await.map_err(FetchError::Write)?;
        self.stream.flush().await.map_err(FetchError::Write)
    }

    async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            trace!(error = %e, "Shutdown failed");
        }
    }
}
