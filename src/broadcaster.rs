//! Room broadcaster
//!
//! Turns client actions into store updates and transport fan-out.
//! Every action is a short, non-suspending sequence: validate, consult
//! the abuse guard where needed, touch the store, then send. No store or
//! limiter lock is ever held across a transport call.
//!
//! Malformed input and throttled actions are outcomes, not errors. Only
//! the caller hears about a refusal; the rest of the room sees nothing.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::message::{is_buzz_request, ChatMessage, ServerMessage};
use crate::rate_limiter::{ActionClass, Admission, RateLimiter};
use crate::store::RoomStore;
use crate::transport::Transport;
use crate::types::{ConnectionId, IdentityKey, RoomKey};

/// Why an action was dropped without any effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A required room, user or text was empty or whitespace
    BlankInput,
}

/// Result of a client action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The action took effect
    Accepted,
    /// The action was ignored silently
    Rejected(Rejection),
    /// The abuse guard stopped the action; the caller was told how long to wait
    Blocked {
        action: ActionClass,
        remaining: Duration,
    },
}

/// Orchestrates room membership, history and fan-out
pub struct RoomBroadcaster<T: Transport> {
    store: Arc<RoomStore>,
    limiter: Arc<RateLimiter>,
    transport: Arc<T>,
    config: RelayConfig,
}

impl<T: Transport> RoomBroadcaster<T> {
    pub fn new(
        store: Arc<RoomStore>,
        limiter: Arc<RateLimiter>,
        transport: Arc<T>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            limiter,
            transport,
            config,
        }
    }

    /// Enter a room, creating it if it has no traffic yet
    ///
    /// Only creation is throttled; an existing room can always be joined.
    pub fn join(&self, connection_id: ConnectionId, room: &str, user: &str) -> Outcome {
        if is_blank(room) || is_blank(user) {
            return Outcome::Rejected(Rejection::BlankInput);
        }

        if !self.store.room_exists(room) {
            let key = IdentityKey::derive(connection_id, user);
            if let Err(outcome) = self.guard(connection_id, &key, ActionClass::RoomCreation) {
                return outcome;
            }
            debug!("Client {} is creating room {}", connection_id, room);
        }

        self.enter(connection_id, room, user);
        Outcome::Accepted
    }

    /// Leave a room and tell the remaining members
    pub fn leave(&self, connection_id: ConnectionId, room: &str, user: &str) -> Outcome {
        let key = RoomKey::new(room);
        self.transport.remove_from_group(connection_id, &key);

        info!("Client {} left room {}", connection_id, key);

        let notice = format!("{} salió de {}", user, room);
        self.transport.send_to_group(&key, ServerMessage::system(notice));
        Outcome::Accepted
    }

    /// Post a message, or a buzz when the text is the buzz sentinel
    ///
    /// The message is stored and then broadcast to the whole room,
    /// sender included. A throttled buzz leaves no trace.
    pub fn send(
        &self,
        connection_id: ConnectionId,
        room: &str,
        user: &str,
        text: &str,
    ) -> Outcome {
        if is_blank(room) || is_blank(user) || is_blank(text) {
            return Outcome::Rejected(Rejection::BlankInput);
        }

        let message = if is_buzz_request(text) {
            let key = IdentityKey::derive(connection_id, user);
            if let Err(outcome) = self.guard(connection_id, &key, ActionClass::Buzz) {
                return outcome;
            }
            ChatMessage::buzz(user)
        } else {
            ChatMessage::text(user, text)
        };

        self.store.add(room, message.clone());
        self.transport
            .send_to_group(&RoomKey::new(room), ServerMessage::Message { message });
        Outcome::Accepted
    }

    /// Tell everyone else in the room that `user` is typing
    pub fn typing(&self, connection_id: ConnectionId, room: &str, user: &str) -> Outcome {
        self.transport.send_to_group_except_sender(
            &RoomKey::new(room),
            connection_id,
            ServerMessage::Typing {
                user: user.to_string(),
            },
        );
        Outcome::Accepted
    }

    /// Move to another room
    ///
    /// The departure is silent and the destination is entered without
    /// the room-creation check.
    pub fn switch_room(
        &self,
        connection_id: ConnectionId,
        from: &str,
        to: &str,
        user: &str,
    ) -> Outcome {
        if is_blank(to) {
            return Outcome::Rejected(Rejection::BlankInput);
        }

        if !is_blank(from) {
            self.transport
                .remove_from_group(connection_id, &RoomKey::new(from));
        }

        self.enter(connection_id, to, user);
        Outcome::Accepted
    }

    /// Group-add, caller-only history replay, room-wide join notice
    fn enter(&self, connection_id: ConnectionId, room: &str, user: &str) {
        let key = RoomKey::new(room);
        self.transport.add_to_group(connection_id, &key);

        info!("Client {} joined room {}", connection_id, key);

        let messages = self.store.get_last(room, self.config.history_replay);
        self.transport
            .send_to_caller(connection_id, ServerMessage::History { messages });
        let notice = format!("{} se unió a {}", user, room);
        self.transport.send_to_group(&key, ServerMessage::system(notice));
    }

    /// Consult the abuse guard, notifying the caller on refusal
    fn guard(
        &self,
        connection_id: ConnectionId,
        key: &IdentityKey,
        action: ActionClass,
    ) -> Result<(), Outcome> {
        let remaining = match self.limiter.is_blocked(key, action) {
            Some(remaining) => {
                self.transport.send_to_caller(
                    connection_id,
                    ServerMessage::system(blocked_notice(action, remaining)),
                );
                remaining
            }
            None => match self
                .limiter
                .try_consume(key, action, self.config.policy(action))
            {
                Admission::Allowed => return Ok(()),
                Admission::Blocked { remaining } => {
                    self.transport.send_to_caller(
                        connection_id,
                        ServerMessage::system(blocked_notice(action, remaining)),
                    );
                    remaining
                }
                Admission::Refused { blocked_for } => {
                    self.transport.send_to_caller(
                        connection_id,
                        ServerMessage::system(refused_notice(action, blocked_for)),
                    );
                    blocked_for
                }
            },
        };

        Err(Outcome::Blocked { action, remaining })
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Whole seconds, rounded up for display
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

fn blocked_notice(action: ActionClass, remaining: Duration) -> String {
    let secs = ceil_secs(remaining);
    match action {
        ActionClass::Buzz => format!(
            "🚫 Estás bloqueado por spam de zumbidos. Intenta en {}s.",
            secs
        ),
        ActionClass::RoomCreation => format!(
            "🚫 Estás bloqueado por crear muchas salas. Intenta en {}s.",
            secs
        ),
    }
}

fn refused_notice(action: ActionClass, blocked_for: Duration) -> String {
    let secs = ceil_secs(blocked_for);
    match action {
        ActionClass::Buzz => format!("🚫 Demasiados zumbidos. Bloqueado por {}s.", secs),
        ActionClass::RoomCreation => {
            format!("🚫 Demasiadas salas nuevas. Bloqueado por {}s.", secs)
        }
    }
}
