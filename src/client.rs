//! Client struct definition
//!
//! Represents a connected client and its outbound event channel.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ConnectionId;

/// Connected client information
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(id: ConnectionId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, sender }
    }

    /// Queue a message for this client without waiting
    ///
    /// Returns an error if the channel is closed (client disconnected)
    /// or its buffer is full.
    pub fn deliver(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::ChannelFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_deliver() {
        let (tx, mut rx) = mpsc::channel(32);
        let client = Client::new(ConnectionId::new(), tx);

        client.deliver(ServerMessage::system("hello")).unwrap();

        assert_eq!(rx.recv().await, Some(ServerMessage::system("hello")));
    }

    #[tokio::test]
    async fn test_client_deliver_full_and_closed() {
        let (tx, rx) = mpsc::channel(1);
        let client = Client::new(ConnectionId::new(), tx);

        client.deliver(ServerMessage::system("one")).unwrap();
        assert!(matches!(
            client.deliver(ServerMessage::system("two")),
            Err(SendError::ChannelFull)
        ));

        drop(rx);
        assert!(matches!(
            client.deliver(ServerMessage::system("three")),
            Err(SendError::ChannelClosed)
        ));
    }
}
