//! Abuse guard
//!
//! Fixed-window counters keyed by identity and action class. Each counter
//! sits behind its own mutex inside a `DashMap`, so two identities never
//! contend with each other. Windows and blocks expire lazily on the next
//! access; nothing sweeps the counters.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::types::IdentityKey;

/// Kinds of throttled actions
///
/// Each class has its own key namespace, so exhausting one never
/// affects another for the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    /// Sending a buzz alert
    Buzz,
    /// Joining a room that has no traffic yet
    RoomCreation,
}

impl std::fmt::Display for ActionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionClass::Buzz => write!(f, "buzz"),
            ActionClass::RoomCreation => write!(f, "room-creation"),
        }
    }
}

/// Window parameters for one action class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Length of a counting window
    pub window: Duration,
    /// Actions allowed per window
    pub max_in_window: u32,
    /// How long an identity is blocked after exceeding the window
    pub block_duration: Duration,
}

impl RateLimitPolicy {
    pub const fn new(window: Duration, max_in_window: u32, block_duration: Duration) -> Self {
        Self {
            window,
            max_in_window,
            block_duration,
        }
    }
}

/// Result of a consumption attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The action fits in the current window
    Allowed,
    /// A previous refusal is still in force; nothing was consumed
    Blocked { remaining: Duration },
    /// This attempt exceeded the window and started a new block
    Refused { blocked_for: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

#[derive(Debug)]
struct RateCounter {
    window_start: Instant,
    count: u32,
    blocked_until: Option<Instant>,
}

impl RateCounter {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            blocked_until: None,
        }
    }

    /// Remaining block time, clearing a block that has already run out
    fn active_block(&mut self, now: Instant) -> Option<Duration> {
        let until = self.blocked_until?;
        if until > now {
            return Some(until - now);
        }
        // Served its block: the next action opens a fresh window.
        self.blocked_until = None;
        self.window_start = now;
        self.count = 0;
        None
    }

    fn consume(&mut self, now: Instant, policy: &RateLimitPolicy) -> Admission {
        if let Some(remaining) = self.active_block(now) {
            return Admission::Blocked { remaining };
        }

        if now.saturating_duration_since(self.window_start) >= policy.window {
            self.window_start = now;
            self.count = 0;
        }

        self.count = self.count.saturating_add(1);

        if self.count > policy.max_in_window {
            self.blocked_until = Some(now + policy.block_duration);
            return Admission::Refused {
                blocked_for: policy.block_duration,
            };
        }

        Admission::Allowed
    }
}

type CounterKey = (IdentityKey, ActionClass);

/// Per-identity sliding-window rate limiter
#[derive(Debug, Default)]
pub struct RateLimiter {
    counters: DashMap<CounterKey, Arc<Mutex<RateCounter>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining block time for `key`, or `None` if it may act
    pub fn is_blocked(&self, key: &IdentityKey, class: ActionClass) -> Option<Duration> {
        self.is_blocked_at(key, class, Instant::now())
    }

    /// Same as [`is_blocked`](Self::is_blocked) against an explicit clock
    pub fn is_blocked_at(
        &self,
        key: &IdentityKey,
        class: ActionClass,
        now: Instant,
    ) -> Option<Duration> {
        // Clone the handle so the map shard is released before locking.
        let counter = self
            .counters
            .get(&(key.clone(), class))
            .map(|entry| Arc::clone(entry.value()))?;

        let mut counter = counter.lock().unwrap_or_else(PoisonError::into_inner);
        counter.active_block(now)
    }

    /// Record one action for `key` under `policy`
    pub fn try_consume(
        &self,
        key: &IdentityKey,
        class: ActionClass,
        policy: &RateLimitPolicy,
    ) -> Admission {
        self.try_consume_at(key, class, policy, Instant::now())
    }

    /// Same as [`try_consume`](Self::try_consume) against an explicit clock
    pub fn try_consume_at(
        &self,
        key: &IdentityKey,
        class: ActionClass,
        policy: &RateLimitPolicy,
        now: Instant,
    ) -> Admission {
        let counter = Arc::clone(
            self.counters
                .entry((key.clone(), class))
                .or_insert_with(|| Arc::new(Mutex::new(RateCounter::new(now))))
                .value(),
        );

        let admission = counter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .consume(now, policy);

        if !admission.is_allowed() {
            debug!("Rate limit {} for {}: {:?}", class, key, admission);
        }
        admission
    }

    /// Number of counters ever created
    pub fn tracked_keys(&self) -> usize {
        self.counters.len()
    }
}
