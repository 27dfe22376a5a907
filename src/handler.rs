//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, action
//! parsing, and bidirectional communication with the hub and broadcaster.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::broadcaster::{Outcome, RoomBroadcaster};
use crate::error::AppError;
use crate::hub::ConnectionHub;
use crate::message::{ClientMessage, ServerMessage};
use crate::transport::Transport;
use crate::types::ConnectionId;

/// Outbound queue depth per connection
const CLIENT_BUFFER_SIZE: usize = 64;

/// Handle a new TCP connection
///
/// Performs WebSocket handshake, registers with the hub, and manages the
/// connection lifecycle until either side closes.
pub async fn handle_connection(
    stream: TcpStream,
    hub: Arc<ConnectionHub>,
    broadcaster: Arc<RoomBroadcaster<ConnectionHub>>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = ConnectionId::new();
    info!("Client {} connected from {}", connection_id, peer_addr);

    // Greet before registering so `connected` is always the first frame
    let connected_msg = ServerMessage::Connected {
        connection_id: connection_id.to_string(),
    };
    let json = serde_json::to_string(&connected_msg)?;
    ws_sender.send(Message::Text(json.into())).await?;

    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(CLIENT_BUFFER_SIZE);
    hub.register(connection_id, msg_tx);

    // Read task (WebSocket -> broadcaster)
    let mut read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(action) => {
                        let outcome = dispatch(&*broadcaster, connection_id, action);
                        if let Outcome::Blocked { action, remaining } = outcome {
                            debug!(
                                "Client {} throttled on {} for {:?}",
                                connection_id, action, remaining
                            );
                        }
                    }
                    Err(e) => {
                        warn!("Invalid JSON from {}: {}", connection_id, e);
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", connection_id);
                    break;
                }
                Ok(_) => {
                    // Binary, ping and pong frames carry no actions
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", connection_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", connection_id);
    });

    // Write task (ServerMessage -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }
        debug!("Write task ended for client");

        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", connection_id);
            // Dropping the hub's sender lets the write task flush and close
            hub.unregister(connection_id);
            let _ = write_task.await;
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", connection_id);
            // Stop dispatching before membership is dropped
            read_task.abort();
            let _ = read_task.await;
            hub.unregister(connection_id);
        }
    }

    info!("Client {} disconnected", connection_id);

    Ok(())
}

/// Route a parsed client action to the broadcaster
pub fn dispatch<T: Transport>(
    broadcaster: &RoomBroadcaster<T>,
    connection_id: ConnectionId,
    action: ClientMessage,
) -> Outcome {
    match action {
        ClientMessage::Join { room, user } => broadcaster.join(connection_id, &room, &user),
        ClientMessage::Leave { room, user } => broadcaster.leave(connection_id, &room, &user),
        ClientMessage::Send { room, user, text } => {
            broadcaster.send(connection_id, &room, &user, &text)
        }
        ClientMessage::Typing { room, user } => broadcaster.typing(connection_id, &room, &user),
        ClientMessage::SwitchRoom { from, to, user } => {
            broadcaster.switch_room(connection_id, &from, &to, &user)
        }
    }
}
