//! The raw message channel contract (§6): a minimal async transport the
//! client and server session engines drive. A real deployment wires this to
//! TCP/TLS/WebSocket framing; tests and the bundled demo use the in-process
//! loopback implementation below.

use async_trait::async_trait;

use crate::CoreError;

/// Out-of-band metadata exchanged when a connection is opened, before any
/// `WireMessage` framing begins — carries the client's public-key blob when
/// encryption is enabled (§4.6 step 3).
#[derive(Clone, Debug, Default)]
pub struct ConnectMetadata {
    pub peer_public_key_blob: Option<Vec<u8>>,
}

/// A bidirectional, message-framed channel. Implementors own their own
/// length-prefixing or other wire framing; callers only see whole frames.
///
/// `recv` takes `&self` (not `&mut self`) so a single channel handle can be
/// shared — via `Arc<dyn MessageChannel>` — between the task driving the
/// read loop and the tasks issuing sends, without an outer lock serializing
/// the two. Implementations hold their receive half behind their own
/// interior mutability (e.g. `tokio::sync::Mutex<mpsc::UnboundedReceiver<_>>`).
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Send one frame. An empty `frame` is a keep-alive / session-create
    /// trigger per §4.6 and §4.7.
    async fn send(&self, frame: Vec<u8>) -> Result<(), CoreError>;

    /// Receive the next frame, or `Ok(None)` on orderly channel closure.
    /// Implementations only need to support a single concurrent reader.
    async fn recv(&self) -> Result<Option<Vec<u8>>, CoreError>;

    /// Metadata captured when the connection was established.
    fn connect_metadata(&self) -> ConnectMetadata;

    /// Close the channel. Idempotent.
    async fn close(&self) -> Result<(), CoreError>;
}

/// An in-process loopback pair of [`MessageChannel`]s connected by
/// `tokio::sync::mpsc` queues — used by tests and `demos/echo-demo` so the
/// whole protocol can run without opening a socket.
pub mod loopback {
    use super::*;
    use tokio::sync::{mpsc, Mutex};

    pub struct LoopbackChannel {
        tx: mpsc::UnboundedSender<Vec<u8>>,
        rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
        metadata: ConnectMetadata,
    }

    /// Build a connected pair: `(client_end, server_end)`.
    pub fn pair(client_public_key_blob: Option<Vec<u8>>) -> (LoopbackChannel, LoopbackChannel) {
        let (c2s_tx, c2s_rx) = mpsc::unbounded_channel();
        let (s2c_tx, s2c_rx) = mpsc::unbounded_channel();

        let client = LoopbackChannel {
            tx: c2s_tx,
            rx: Mutex::new(s2c_rx),
            metadata: ConnectMetadata { peer_public_key_blob: client_public_key_blob.clone() },
        };
        let server = LoopbackChannel {
            tx: s2c_tx,
            rx: Mutex::new(c2s_rx),
            metadata: ConnectMetadata { peer_public_key_blob: client_public_key_blob },
        };
        (client, server)
    }

    #[async_trait]
    impl MessageChannel for LoopbackChannel {
        async fn send(&self, frame: Vec<u8>) -> Result<(), CoreError> {
            self.tx.send(frame).map_err(|_| CoreError::Network("loopback peer dropped".into()))
        }

        async fn recv(&self) -> Result<Option<Vec<u8>>, CoreError> {
            Ok(self.rx.lock().await.recv().await)
        }

        fn connect_metadata(&self) -> ConnectMetadata {
            self.metadata.clone()
        }

        async fn close(&self) -> Result<(), CoreError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::loopback::pair;
    use super::*;

    #[tokio::test]
    async fn loopback_delivers_frames_in_order() {
        let (client, server) = pair(Some(vec![1, 2, 3]));
        client.send(vec![]).await.unwrap();
        client.send(b"hello".to_vec()).await.unwrap();

        assert_eq!(server.recv().await.unwrap(), Some(vec![]));
        assert_eq!(server.recv().await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(server.connect_metadata().peer_public_key_blob, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn recv_returns_none_after_sender_dropped() {
        let (client, server) = pair(None);
        drop(client);
        assert_eq!(server.recv().await.unwrap(), None);
    }
}
