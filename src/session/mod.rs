//! Short-lived conversational state keyed by sender.
//!
//! Each key owns its own async mutex, so a read-modify-write on one sender's
//! session is serialised while unrelated senders proceed in parallel. Expiry
//! is lazy: a session past its TTL is dropped by whichever access finds it,
//! and idle slots are swept when a new sender shows up.
//! The TTL runs from the session's creation and is not refreshed by updates.
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub mod cart;
pub mod pending;

pub use cart::{CartItem, CartSession, CartStep, PendingProduct, QuantityOutcome};
pub use pending::{parse_price_reply, PendingLine, PendingPriceSession};

/// Default session lifetime.
pub const DEFAULT_TTL_SECS: i64 = 15 * 60;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and replays.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Anything stored in a [`SessionStore`] reports when it was created.
pub trait Timestamped {
    fn created_at(&self) -> DateTime<Utc>;
}

type Slot<T> = Arc<AsyncMutex<Option<T>>>;

pub struct SessionStore<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<T> SessionStore<T>
where
    T: Timestamped + Clone + Send + 'static,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn slot(&self, key: &str) -> Slot<T> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get(key) {
            return slot.clone();
        }
        self.prune(&mut slots);
        let slot: Slot<T> = Arc::new(AsyncMutex::new(None));
        slots.insert(key.to_string(), slot.clone());
        slot
    }

    /// Drop slots that are empty or expired and held by nobody else. Runs
    /// when a new key arrives. Clones happen only under the map lock, so a
    /// slot with a single owner cannot gain a waiter while this runs.
    fn prune(&self, slots: &mut HashMap<String, Slot<T>>) {
        let now = self.clock.now();
        let ttl = self.ttl;
        slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(session) => session
                    .as_ref()
                    .is_some_and(|s| now - s.created_at() <= ttl),
                Err(_) => true,
            }
        });
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Exclusive access to one key until the guard is dropped.
    pub async fn lock(&self, key: &str) -> SessionGuard<T> {
        let guard = self.slot(key).lock_owned().await;
        SessionGuard {
            guard,
            ttl: self.ttl,
            now: self.clock.now(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.lock(key).await.get().cloned()
    }

    pub async fn set(&self, key: &str, value: T) {
        self.lock(key).await.set(value);
    }

    pub async fn delete(&self, key: &str) -> Option<T> {
        self.lock(key).await.delete()
    }
}

pub struct SessionGuard<T> {
    guard: OwnedMutexGuard<Option<T>>,
    ttl: Duration,
    now: DateTime<Utc>,
}

impl<T: Timestamped> SessionGuard<T> {
    fn evict_expired(&mut self) {
        let expired = self
            .guard
            .as_ref()
            .map(|s| self.now - s.created_at() > self.ttl)
            .unwrap_or(false);
        if expired {
            *self.guard = None;
        }
    }

    pub fn get(&mut self) -> Option<&T> {
        self.evict_expired();
        self.guard.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.evict_expired();
        self.guard.as_mut()
    }

    pub fn set(&mut self, value: T) {
        *self.guard = Some(value);
    }

    /// Remove and return the live session, if any.
    pub fn delete(&mut self) -> Option<T> {
        self.evict_expired();
        self.guard.take()
    }

    /// Time the guard was taken; use it as "now" for anything created under it.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    #[cfg(test)]
    fn raw(&self) -> Option<&T> {
        self.guard.as_ref()
    }
}
