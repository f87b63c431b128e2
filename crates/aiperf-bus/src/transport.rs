//! IPC (Unix domain socket) and TCP transports, selected at startup by
//! `aiperf_core::config::CommBackend` (spec §2, §6: "IPC, default" / "TCP").

use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};

use aiperf_core::error::{AiPerfError, Result};

/// A connected duplex stream, abstracting over the two transports so the
/// framing layer above doesn't need to know which one it's talking to.
pub enum BusStream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl AsyncRead for BusStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            BusStream::Unix(s) => Pin::new(s).poll_read(cx, buf),
            BusStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for BusStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            BusStream::Unix(s) => Pin::new(s).poll_write(cx, buf),
            BusStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            BusStream::Unix(s) => Pin::new(s).poll_flush(cx),
            BusStream::Tcp(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            BusStream::Unix(s) => Pin::new(s).poll_shutdown(cx),
            BusStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// A bound listener for either transport.
pub enum BusListener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl BusListener {
    pub fn bind_ipc(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)
            .map_err(|e| AiPerfError::transport(format!("bind {}: {e}", path.display())))?;
        Ok(Self::Unix(listener))
    }

    pub async fn bind_tcp(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AiPerfError::transport(format!("bind {addr}: {e}")))?;
        Ok(Self::Tcp(listener))
    }

    pub async fn accept(&self) -> Result<BusStream> {
        match self {
            Self::Unix(l) => {
                let (stream, _) = l
                    .accept()
                    .await
                    .map_err(|e| AiPerfError::transport(format!("accept: {e}")))?;
                Ok(BusStream::Unix(stream))
            }
            Self::Tcp(l) => {
                let (stream, _) = l
                    .accept()
                    .await
                    .map_err(|e| AiPerfError::transport(format!("accept: {e}")))?;
                Ok(BusStream::Tcp(stream))
            }
        }
    }
}

/// Connects to a broker address. `addr` is either a filesystem path (IPC) or
/// a `host:port` string (TCP), matching `ServiceConfig::bus_addr`.
pub async fn connect(backend: aiperf_core::config::CommBackend, addr: &str) -> Result<BusStream> {
    match backend {
        aiperf_core::config::CommBackend::Ipc => {
            let stream = UnixStream::connect(addr)
                .await
                .map_err(|e| AiPerfError::transport(format!("connect {addr}: {e}")))?;
            Ok(BusStream::Unix(stream))
        }
        aiperf_core::config::CommBackend::Tcp => {
            let stream = TcpStream::connect(addr)
                .await
                .map_err(|e| AiPerfError::transport(format!("connect {addr}: {e}")))?;
            Ok(BusStream::Tcp(stream))
        }
    }
}
