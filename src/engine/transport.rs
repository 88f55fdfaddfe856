//! Probe transports: one send or connect operation per iteration.
//!
//! An iteration *succeeds* when the I/O operation itself completes: the UDP
//! datagram is handed to the kernel in full, or the TCP connection is
//! established. No response is awaited on UDP; TCP connections are closed
//! immediately after establishment.

use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use serde::Serialize;
use tokio::net::{TcpStream, UdpSocket};

use super::ValidationError;

// ---------------------------------------------------------------------------
// ProbeMethod
// ---------------------------------------------------------------------------

/// Probe transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMethod {
    /// Fire UDP datagrams at the target.
    Udp,
    /// Open and immediately close TCP connections to the target.
    Tcp,
}

impl ProbeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        }
    }
}

impl std::fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProbeMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            other => Err(ValidationError::UnknownMethod {
                input: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// One probe iteration against a fixed target.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Perform a single send/connect operation. Returns the number of
    /// payload bytes sent on success.
    async fn probe_once(&self, payload: &Bytes) -> io::Result<u64>;
}

/// Build the transport for `method`, acquiring whatever socket resources it
/// needs up front. Failure here is a setup error, fatal to the run.
pub async fn build(method: ProbeMethod, target: SocketAddr) -> io::Result<Box<dyn Transport>> {
    match method {
        ProbeMethod::Udp => Ok(Box::new(UdpTransport::connect(target).await?)),
        ProbeMethod::Tcp => Ok(Box::new(TcpTransport { target })),
    }
}

// ---------------------------------------------------------------------------
// UdpTransport
// ---------------------------------------------------------------------------

/// Connected UDP socket shared by all workers of a run.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn connect(target: SocketAddr) -> io::Result<Self> {
        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(target).await?;
        Ok(Self { socket })
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    async fn probe_once(&self, payload: &Bytes) -> io::Result<u64> {
        let sent = self.socket.send(payload).await?;
        if sent < payload.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "short datagram send",
            ));
        }
        Ok(sent as u64)
    }
}

// ---------------------------------------------------------------------------
// TcpTransport
// ---------------------------------------------------------------------------

/// Per-iteration TCP connect probe. No socket is held between iterations.
pub struct TcpTransport {
    target: SocketAddr,
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn probe_once(&self, _payload: &Bytes) -> io::Result<u64> {
        let stream = TcpStream::connect(self.target).await?;
        drop(stream);
        Ok(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
