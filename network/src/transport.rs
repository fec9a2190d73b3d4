//! Datagram transport.
//!
//! The anonymizing overlay is reached through a local datagram endpoint; the
//! node only needs unordered, unreliable send/receive of whole frames keyed
//! by an opaque address string.

use std::future::Future;

use shroud_messages::MAX_DATAGRAM_SIZE;
use tokio::net::UdpSocket;

use crate::NetworkError;

pub trait DatagramTransport: Send + Sync + 'static {
    fn local_address(&self) -> String;

    fn send_to(
        &self,
        to: &str,
        frame: &[u8],
    ) -> impl Future<Output = Result<(), NetworkError>> + Send;

    /// Next inbound frame and the address it came from.
    fn recv_from(&self) -> impl Future<Output = Result<(Vec<u8>, String), NetworkError>> + Send;
}

pub struct UdpTransport {
    socket: UdpSocket,
    local: String,
}

impl UdpTransport {
    pub async fn bind(addr: &str) -> Result<Self, NetworkError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| NetworkError::Transport(format!("bind {addr}: {e}")))?;
        let local = socket.local_addr()?.to_string();
        tracing::info!(address = %local, "datagram transport bound");
        Ok(Self { socket, local })
    }
}

impl DatagramTransport for UdpTransport {
    fn local_address(&self) -> String {
        self.local.clone()
    }

    async fn send_to(&self, to: &str, frame: &[u8]) -> Result<(), NetworkError> {
        self.socket
            .send_to(frame, to)
            .await
            .map(|_| ())
            .map_err(|e| NetworkError::Transport(format!("send to {to}: {e}")))
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, String), NetworkError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (n, from) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| NetworkError::Transport(format!("recv: {e}")))?;
        buf.truncate(n);
        Ok((buf, from.to_string()))
    }
}
