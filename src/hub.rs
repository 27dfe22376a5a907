//! In-process connection hub
//!
//! Implements [`Transport`] over the clients' mpsc channels. Group
//! membership lives in a `DashMap` keyed by room; member lists are
//! snapshotted before delivery so no map guard is held while sending.

use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::client::Client;
use crate::message::ServerMessage;
use crate::transport::Transport;
use crate::types::{ConnectionId, RoomKey};

#[derive(Debug, Default)]
pub struct ConnectionHub {
    clients: DashMap<ConnectionId, Client>,
    groups: DashMap<RoomKey, HashSet<ConnectionId>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound channel
    pub fn register(&self, connection_id: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        self.clients
            .insert(connection_id, Client::new(connection_id, sender));
        debug!("Total connections: {}", self.clients.len());
    }

    /// Forget a connection and drop it from every group
    pub fn unregister(&self, connection_id: ConnectionId) {
        self.clients.remove(&connection_id);

        self.groups.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
        debug!(
            "Total connections: {}, Total groups: {}",
            self.clients.len(),
            self.groups.len()
        );
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    /// Number of connections currently in the room's group
    pub fn group_size(&self, room: &RoomKey) -> usize {
        self.groups.get(room).map(|m| m.len()).unwrap_or(0)
    }

    fn members(&self, room: &RoomKey) -> Vec<ConnectionId> {
        self.groups
            .get(room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    fn deliver(&self, connection_id: ConnectionId, event: ServerMessage) {
        // Clone the client so the map shard is released before sending.
        let Some(client) = self.clients.get(&connection_id).map(|c| c.value().clone()) else {
            return;
        };
        if let Err(e) = client.deliver(event) {
            debug!("Dropped event for {}: {}", client.id, e);
        }
    }

    fn fan_out(&self, members: Vec<ConnectionId>, event: ServerMessage) {
        let Some((last, rest)) = members.split_last() else {
            return;
        };
        for member in rest {
            self.deliver(*member, event.clone());
        }
        self.deliver(*last, event);
    }
}

impl Transport for ConnectionHub {
    fn add_to_group(&self, connection_id: ConnectionId, room: &RoomKey) {
        // Hold the client entry so a concurrent unregister sees the insert.
        let Some(_client) = self.clients.get(&connection_id) else {
            debug!("Ignoring group add for unregistered {}", connection_id);
            return;
        };
        self.groups
            .entry(room.clone())
            .or_default()
            .insert(connection_id);
    }

    fn remove_from_group(&self, connection_id: ConnectionId, room: &RoomKey) {
        self.groups.remove_if_mut(room, |_, members| {
            members.remove(&connection_id);
            members.is_empty()
        });
    }

    fn send_to_caller(&self, connection_id: ConnectionId, event: ServerMessage) {
        self.deliver(connection_id, event);
    }

    fn send_to_group(&self, room: &RoomKey, event: ServerMessage) {
        self.fan_out(self.members(room), event);
    }

    fn send_to_group_except_sender(
        &self,
        room: &RoomKey,
        sender: ConnectionId,
        event: ServerMessage,
    ) {
        let mut members = self.members(room);
        members.retain(|id| *id != sender);
        self.fan_out(members, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(hub: &ConnectionHub) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(32);
        hub.register(id, tx);
        (id, rx)
    }

    #[tokio::test]
    async fn test_group_fan_out() {
        let hub = ConnectionHub::new();
        let room = RoomKey::new("general");
        let (a, mut rx_a) = connect(&hub);
        let (b, mut rx_b) = connect(&hub);
        let (_c, mut rx_c) = connect(&hub);

        hub.add_to_group(a, &room);
        hub.add_to_group(b, &room);
        hub.send_to_group(&room, ServerMessage::system("hi"));

        assert_eq!(rx_a.recv().await, Some(ServerMessage::system("hi")));
        assert_eq!(rx_b.recv().await, Some(ServerMessage::system("hi")));
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_except_sender() {
        let hub = ConnectionHub::new();
        let room = RoomKey::new("general");
        let (a, mut rx_a) = connect(&hub);
        let (b, mut rx_b) = connect(&hub);

        hub.add_to_group(a, &room);
        hub.add_to_group(b, &room);
        hub.send_to_group_except_sender(
            &room,
            a,
            ServerMessage::Typing {
                user: "A".to_string(),
            },
        );

        assert_eq!(
            rx_b.recv().await,
            Some(ServerMessage::Typing {
                user: "A".to_string()
            })
        );
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_from_group_prunes_empty() {
        let hub = ConnectionHub::new();
        let room = RoomKey::new("general");
        let (a, _rx_a) = connect(&hub);

        hub.add_to_group(a, &room);
        hub.add_to_group(a, &room);
        assert_eq!(hub.group_size(&room), 1);

        hub.remove_from_group(a, &room);
        assert_eq!(hub.group_size(&room), 0);
        hub.remove_from_group(a, &room);
    }

    #[tokio::test]
    async fn test_unregister_leaves_all_groups() {
        let hub = ConnectionHub::new();
        let general = RoomKey::new("general");
        let random = RoomKey::new("random");
        let (a, _rx_a) = connect(&hub);
        let (b, _rx_b) = connect(&hub);

        hub.add_to_group(a, &general);
        hub.add_to_group(a, &random);
        hub.add_to_group(b, &general);

        hub.unregister(a);

        assert_eq!(hub.connection_count(), 1);
        assert_eq!(hub.group_size(&general), 1);
        assert_eq!(hub.group_size(&random), 0);
    }

    #[tokio::test]
    async fn test_add_after_unregister_is_ignored() {
        let hub = ConnectionHub::new();
        let room = RoomKey::new("general");
        let (a, _rx_a) = connect(&hub);

        hub.unregister(a);
        hub.add_to_group(a, &room);

        assert_eq!(hub.group_size(&room), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_add_unknown_connection_is_ignored() {
        let hub = ConnectionHub::new();
        let room = RoomKey::new("general");

        hub.add_to_group(ConnectionId::new(), &room);
        assert_eq!(hub.group_size(&room), 0);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_ignored() {
        let hub = ConnectionHub::new();
        let room = RoomKey::new("general");
        let (a, rx_a) = connect(&hub);
        let (b, mut rx_b) = connect(&hub);
        hub.add_to_group(a, &room);
        hub.add_to_group(b, &room);

        drop(rx_a);
        hub.send_to_group(&room, ServerMessage::system("still here"));

        assert_eq!(rx_b.recv().await, Some(ServerMessage::system("still here")));
    }
}
