//! Room-based WebSocket Message Relay Library
//!
//! Clients join named rooms, exchange short messages and typing signals,
//! and receive a bounded replay of recent history when they enter a room.
//!
//! # Features
//! - Case-insensitive named rooms with bounded per-room history
//! - History replay on join and room switch
//! - Buzz alerts and room creation throttled per connection and name
//! - Typing indicators
//! - Idle rooms expired by a background reaper
//!
//! # Architecture
//! Shared services are created once and passed around as `Arc` handles:
//! - `RoomStore` keeps history, one mutex per room inside a `DashMap`
//! - `RateLimiter` keeps windowed counters, one mutex per identity
//! - `RoomBroadcaster` validates actions and drives a `Transport`
//! - `ConnectionHub` is the in-process `Transport` over mpsc channels
//! - `IdleRoomReaper` sweeps idle rooms until cancelled
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use room_relay::{
//!     handle_connection, ConnectionHub, RateLimiter, RelayConfig, RoomBroadcaster, RoomStore,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RelayConfig::default();
//!     let store = Arc::new(RoomStore::new(config.max_per_room, config.room_ttl));
//!     let hub = Arc::new(ConnectionHub::new());
//!     let broadcaster = Arc::new(RoomBroadcaster::new(
//!         store,
//!         Arc::new(RateLimiter::new()),
//!         Arc::clone(&hub),
//!         config,
//!     ));
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, Arc::clone(&hub), Arc::clone(&broadcaster)));
//!     }
//! }
//! ```

pub mod broadcaster;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod hub;
pub mod message;
pub mod rate_limiter;
pub mod reaper;
pub mod store;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use broadcaster::{Outcome, Rejection, RoomBroadcaster};
pub use client::Client;
pub use config::RelayConfig;
pub use error::{AppError, ConfigError, SendError};
pub use handler::{dispatch, handle_connection};
pub use hub::ConnectionHub;
pub use message::{ChatMessage, ClientMessage, MessageKind, ServerMessage, BUZZ_SENTINEL};
pub use rate_limiter::{ActionClass, Admission, RateLimitPolicy, RateLimiter};
pub use reaper::{IdleRoomReaper, IdleSweep};
pub use store::RoomStore;
pub use transport::Transport;
pub use types::{ConnectionId, IdentityKey, RoomKey};
