//! Bounded per-room message history
//!
//! Each room owns a bucket behind its own mutex; the registry is a
//! `DashMap`, so traffic in one room never waits on another. Buckets are
//! created on first use and dropped by [`RoomStore::sweep_expired`] once
//! nobody has read or written them for the configured TTL.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::MIN_PER_ROOM;
use crate::message::ChatMessage;
use crate::types::RoomKey;

#[derive(Debug)]
struct RoomBucket {
    messages: VecDeque<ChatMessage>,
    last_activity: Instant,
}

impl RoomBucket {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            last_activity: Instant::now(),
        }
    }

    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > ttl
    }
}

type SharedBucket = Arc<Mutex<RoomBucket>>;

/// In-memory room history with retention and idle expiry
#[derive(Debug)]
pub struct RoomStore {
    rooms: DashMap<RoomKey, SharedBucket>,
    max_per_room: usize,
    room_ttl: Duration,
}

impl RoomStore {
    /// Create a store keeping at most `max_per_room` messages per room
    ///
    /// Retention below [`MIN_PER_ROOM`] is raised to it.
    pub fn new(max_per_room: usize, room_ttl: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            max_per_room: max_per_room.max(MIN_PER_ROOM),
            room_ttl,
        }
    }

    pub fn max_per_room(&self) -> usize {
        self.max_per_room
    }

    /// Up to `take` most recent messages, oldest first
    ///
    /// Materializes an empty bucket for an unknown room and counts as
    /// activity for it.
    pub fn get_last(&self, room: &str, take: usize) -> Vec<ChatMessage> {
        if room.trim().is_empty() {
            return Vec::new();
        }

        let bucket = self.bucket(room);
        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.last_activity = Instant::now();

        let skip = bucket.messages.len().saturating_sub(take);
        bucket.messages.iter().skip(skip).cloned().collect()
    }

    /// Append a message, dropping the oldest beyond retention
    pub fn add(&self, room: &str, message: ChatMessage) {
        if room.trim().is_empty() {
            return;
        }

        let bucket = self.bucket(room);
        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.last_activity = Instant::now();

        bucket.messages.push_back(message);
        while bucket.messages.len() > self.max_per_room {
            bucket.messages.pop_front();
        }
    }

    /// Whether the room currently has a bucket
    ///
    /// Never creates one.
    pub fn room_exists(&self, room: &str) -> bool {
        if room.trim().is_empty() {
            return false;
        }
        self.rooms.contains_key(&RoomKey::new(room))
    }

    /// Drop every room idle for longer than the TTL as of `now`
    ///
    /// Returns the number of rooms removed. Rooms created or touched while
    /// the sweep runs are left alone.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let candidates: Vec<RoomKey> = self
            .rooms
            .iter()
            .filter(|entry| lock_bucket(entry.value()).is_idle(now, self.room_ttl))
            .map(|entry| entry.key().clone())
            .collect();

        candidates
            .into_iter()
            .filter(|key| {
                self.rooms
                    .remove_if(key, |_, bucket| {
                        lock_bucket(bucket).is_idle(now, self.room_ttl)
                    })
                    .is_some()
            })
            .count()
    }

    /// Number of rooms currently held
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn bucket(&self, room: &str) -> SharedBucket {
        // Clone the handle so the map shard is released before locking.
        Arc::clone(
            self.rooms
                .entry(RoomKey::new(room))
                .or_insert_with(|| Arc::new(Mutex::new(RoomBucket::new())))
                .value(),
        )
    }
}

fn lock_bucket(bucket: &SharedBucket) -> std::sync::MutexGuard<'_, RoomBucket> {
    bucket.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn store() -> RoomStore {
        RoomStore::new(20, TTL)
    }

    fn bodies(messages: &[ChatMessage]) -> Vec<String> {
        messages.iter().map(|m| m.body.clone()).collect()
    }

    #[test]
    fn test_get_last_unknown_room_is_empty() {
        let store = store();
        assert!(store.get_last("general", 50).is_empty());
    }

    #[test]
    fn test_get_last_returns_min_of_take_and_stored() {
        let store = store();
        for i in 0..5 {
            store.add("general", ChatMessage::text("Alice", format!("m{}", i)));
        }

        assert_eq!(bodies(&store.get_last("general", 3)), ["m2", "m3", "m4"]);
        assert_eq!(store.get_last("general", 5).len(), 5);
        assert_eq!(
            bodies(&store.get_last("general", 50)),
            ["m0", "m1", "m2", "m3", "m4"]
        );
        assert!(store.get_last("general", 0).is_empty());
    }

    #[test]
    fn test_retention_keeps_most_recent_in_order() {
        let store = store();
        for i in 0..35 {
            store.add("general", ChatMessage::text("Alice", format!("m{}", i)));
        }

        let kept = store.get_last("general", 20);
        let expected: Vec<String> = (15..35).map(|i| format!("m{}", i)).collect();
        assert_eq!(bodies(&kept), expected);
        assert_eq!(store.get_last("general", 100).len(), 20);
    }

    #[test]
    fn test_retention_floor() {
        let store = RoomStore::new(2, TTL);
        assert_eq!(store.max_per_room(), MIN_PER_ROOM);
    }

    #[test]
    fn test_room_names_case_insensitive() {
        let store = store();
        store.add("Lobby", ChatMessage::text("Alice", "hi"));

        assert!(store.room_exists("lobby"));
        assert!(store.room_exists("LOBBY"));
        assert_eq!(bodies(&store.get_last("lobby", 10)), ["hi"]);
        assert_eq!(store.room_count(), 1);
    }

    #[test]
    fn test_room_exists_has_no_side_effect() {
        let store = store();
        assert!(!store.room_exists("general"));
        assert_eq!(store.room_count(), 0);

        // Reading history does materialize the bucket.
        store.get_last("general", 50);
        assert!(store.room_exists("general"));
    }

    #[test]
    fn test_blank_room_is_ignored() {
        let store = store();
        store.add("  ", ChatMessage::text("Alice", "hi"));
        assert!(store.get_last("", 50).is_empty());
        assert!(!store.room_exists(" "));
        assert_eq!(store.room_count(), 0);
    }

    #[test]
    fn test_sweep_removes_only_idle_rooms() {
        let store = store();
        store.add("general", ChatMessage::text("Alice", "hi"));

        assert_eq!(store.sweep_expired(Instant::now()), 0);
        assert_eq!(store.sweep_expired(Instant::now() + TTL / 2), 0);
        assert!(store.room_exists("general"));

        assert_eq!(store.sweep_expired(Instant::now() + TTL + Duration::from_secs(1)), 1);
        assert!(!store.room_exists("general"));
    }

    #[test]
    fn test_recreated_room_after_sweep_is_empty() {
        let store = store();
        store.add("general", ChatMessage::text("Alice", "before"));
        store.sweep_expired(Instant::now() + TTL * 2);

        store.add("General", ChatMessage::text("Bob", "after"));
        assert_eq!(bodies(&store.get_last("general", 50)), ["after"]);
    }

    #[test]
    fn test_concurrent_appends_to_one_room() {
        let store = Arc::new(RoomStore::new(1_000, TTL));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.add("general", ChatMessage::text(format!("t{}", t), format!("{}", i)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let all = store.get_last("general", 1_000);
        assert_eq!(all.len(), 200);
        // Per-writer order is preserved.
        for t in 0..4 {
            let author = format!("t{}", t);
            let seq: Vec<usize> = all
                .iter()
                .filter(|m| m.author == author)
                .map(|m| m.body.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..50).collect::<Vec<_>>());
        }
    }
}
