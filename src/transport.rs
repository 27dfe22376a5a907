//! Transport capability used by the broadcaster
//!
//! The relay core never touches sockets. It only needs to group
//! connections by room and push events at a caller, a group, or a group
//! minus its sender. Every call is fire-and-forget: delivery failures
//! stay inside the transport.

use crate::message::ServerMessage;
use crate::types::{ConnectionId, RoomKey};

pub trait Transport: Send + Sync {
    fn add_to_group(&self, connection_id: ConnectionId, room: &RoomKey);

    fn remove_from_group(&self, connection_id: ConnectionId, room: &RoomKey);

    fn send_to_caller(&self, connection_id: ConnectionId, event: ServerMessage);

    fn send_to_group(&self, room: &RoomKey, event: ServerMessage);

    fn send_to_group_except_sender(
        &self,
        room: &RoomKey,
        sender: ConnectionId,
        event: ServerMessage,
    );
}
