//! Transport-agnostic client connection.

use tokio::sync::mpsc;

use crate::error::ConnectionError;

/// What the subscription manager needs from a transport.
///
/// `send` is called synchronously from inside bus dispatch, so it must not
/// block; hand the frame to a queue and return.
pub trait ClientConnection: Send + Sync {
    /// Deliver one serialized event.
    fn send(&self, frame: String) -> Result<(), ConnectionError>;

    fn is_open(&self) -> bool;

    /// Called when `send` fails. Defaults to logging.
    fn on_error(&self, error: &ConnectionError) {
        tracing::debug!(error = %error, "client connection send failed");
    }
}

/// Connection backed by an unbounded tokio channel. The receiving half is
/// drained by the transport (e.g. a websocket writer task).
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelConnection {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ClientConnection for ChannelConnection {
    fn send(&self, frame: String) -> Result<(), ConnectionError> {
        self.tx.send(frame).map_err(|_| ConnectionError::Closed)
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_connection_closes_with_receiver() {
        let (conn, mut rx) = ChannelConnection::new();
        assert!(conn.is_open());
        conn.send("frame".into()).unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("frame"));

        drop(rx);
        assert!(!conn.is_open());
        assert_eq!(conn.send("late".into()), Err(ConnectionError::Closed));
    }
}
