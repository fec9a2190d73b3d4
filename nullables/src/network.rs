//! Nullable transport: records sends, receives what the test injects.

use std::sync::{Arc, Mutex};

use shroud_network::{DatagramTransport, NetworkError};
use tokio::sync::mpsc;

type Frame = (Vec<u8>, String);

/// A [`DatagramTransport`] that never touches a socket.
pub struct NullTransport {
    address: String,
    sent: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
}

/// Test-side handle of a [`NullTransport`].
#[derive(Clone)]
pub struct NullTransportHandle {
    sent: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    inject: mpsc::UnboundedSender<Frame>,
}

impl NullTransport {
    pub fn new(address: impl Into<String>) -> (Self, NullTransportHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = Self {
            address: address.into(),
            sent: Arc::clone(&sent),
            inbox: tokio::sync::Mutex::new(rx),
        };
        (transport, NullTransportHandle { sent, inject: tx })
    }
}

impl DatagramTransport for NullTransport {
    fn local_address(&self) -> String {
        self.address.clone()
    }

    async fn send_to(&self, to: &str, frame: &[u8]) -> Result<(), NetworkError> {
        self.sent
            .lock()
            .map_err(|_| NetworkError::Transport("send log poisoned".into()))?
            .push((to.to_string(), frame.to_vec()));
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, String), NetworkError> {
        self.inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| NetworkError::Transport("null transport closed".into()))
    }
}

impl NullTransportHandle {
    /// Queue a frame as if it arrived from `from`.
    pub fn deliver(&self, from: &str, frame: Vec<u8>) {
        // the transport may already be dropped at test teardown
        let _ = self.inject.send((frame, from.to_string()));
    }

    /// Everything sent so far, oldest first.
    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn take_sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_injects() {
        let (transport, handle) = NullTransport::new("me:1");
        transport.send_to("you:1", b"hi").await.unwrap();
        assert_eq!(handle.sent(), vec![("you:1".to_string(), b"hi".to_vec())]);

        handle.deliver("you:1", b"1!0".to_vec());
        let (frame, from) = transport.recv_from().await.unwrap();
        assert_eq!(frame, b"1!0");
        assert_eq!(from, "you:1");
        assert_eq!(handle.take_sent().len(), 1);
        assert!(handle.sent().is_empty());
    }
}
