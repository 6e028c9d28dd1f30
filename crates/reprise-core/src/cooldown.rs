//! Playback cooldown manager (two-tier circuit breaker)
//!
//! Keeps repeated failures from hammering an origin that is already
//! rejecting this client:
//! - Per-item cooldown: an item that failed is not requested again until its
//!   window elapses
//! - Global cooldown: after several consecutive failures across items, every
//!   request is held back for a shorter window
//!
//! One instance is shared (`Arc<CooldownManager>`) by every player in the
//! process. All bookkeeping happens under a single mutex.

use crate::clock::{elapsed_between, Clock, SystemClock};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cooldown thresholds and windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// How long a failed item stays blocked (seconds)
    pub item_cooldown_secs: u64,
    /// Consecutive failures that open the global breaker
    pub global_failure_threshold: u32,
    /// How long the global breaker stays open (seconds)
    pub global_cooldown_secs: u64,
    /// Failure records kept before the least recently used is evicted
    pub max_tracked_items: usize,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            item_cooldown_secs: 30 * 60,
            global_failure_threshold: 3,
            global_cooldown_secs: 5 * 60,
            max_tracked_items: 50,
        }
    }
}

impl CooldownConfig {
    pub fn item_cooldown(&self) -> Duration {
        Duration::from_secs(self.item_cooldown_secs)
    }

    pub fn global_cooldown(&self) -> Duration {
        Duration::from_secs(self.global_cooldown_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.global_failure_threshold == 0 {
            return Err(Error::InvalidConfig(
                "global_failure_threshold must be at least 1".into(),
            ));
        }
        if self.max_tracked_items == 0 {
            return Err(Error::InvalidConfig("max_tracked_items must be at least 1".into()));
        }
        if self.item_cooldown_secs == 0 || self.global_cooldown_secs == 0 {
            return Err(Error::InvalidConfig("cooldown windows must be non-zero".into()));
        }
        Ok(())
    }
}

/// Admission decision for an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CooldownStatus {
    /// Requests may proceed
    Ready,
    /// This item failed recently
    VideoCooldown { remaining: Duration, item_key: String },
    /// Too many consecutive failures across items
    GlobalCooldown { remaining: Duration },
}

impl CooldownStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, CooldownStatus::Ready)
    }

    /// Time until requests are admitted again
    pub fn remaining(&self) -> Duration {
        match self {
            CooldownStatus::Ready => Duration::ZERO,
            CooldownStatus::VideoCooldown { remaining, .. }
            | CooldownStatus::GlobalCooldown { remaining } => *remaining,
        }
    }

    /// Whole minutes left, for countdown rendering
    pub fn remaining_minutes(&self) -> u64 {
        self.remaining().as_secs() / 60
    }

    /// Seconds left within the current minute
    pub fn remaining_seconds(&self) -> u64 {
        self.remaining().as_secs() % 60
    }
}

impl std::fmt::Display for CooldownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CooldownStatus::Ready => write!(f, "ready"),
            CooldownStatus::VideoCooldown { item_key, .. } => write!(
                f,
                "item {} cooling down for {}m{}s",
                item_key,
                self.remaining_minutes(),
                self.remaining_seconds()
            ),
            CooldownStatus::GlobalCooldown { .. } => write!(
                f,
                "global cooldown for {}m{}s",
                self.remaining_minutes(),
                self.remaining_seconds()
            ),
        }
    }
}

/// One failed item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub item_key: String,
    pub failed_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Default)]
struct CooldownState {
    /// Insertion order is recency order: front is least recently used
    failures: IndexMap<String, FailureRecord>,
    consecutive_failures: u32,
    global_cooldown_start: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
}

impl CooldownState {
    /// Close the global breaker if its window has lapsed
    fn expire_global(&mut self, now: DateTime<Utc>, window: Duration) {
        if let Some(start) = self.global_cooldown_start {
            if elapsed_between(start, now) >= window {
                self.global_cooldown_start = None;
                self.consecutive_failures = 0;
                info!("Global cooldown ended");
            }
        }
    }

    /// Drop expired records, then evict from the LRU end down to capacity
    fn sweep(&mut self, now: DateTime<Utc>, window: Duration, capacity: usize) {
        let before = self.failures.len();
        self.failures
            .retain(|_, record| elapsed_between(record.failed_at, now) < window);

        while self.failures.len() > capacity {
            if let Some((key, _)) = self.failures.shift_remove_index(0) {
                debug!(item = %key, "Evicted least recently used failure record");
            }
        }

        let removed = before - self.failures.len();
        if removed > 0 {
            debug!(removed, remaining = self.failures.len(), "Failure records swept");
        }
    }
}

/// Two-tier circuit breaker over per-item and global failure history
pub struct CooldownManager {
    config: CooldownConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<CooldownState>,
}

impl CooldownManager {
    /// Create a manager on the system clock
    pub fn new(config: CooldownConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a manager on a custom clock
    pub fn with_clock(config: CooldownConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(CooldownState::default()),
        }
    }

    pub fn config(&self) -> &CooldownConfig {
        &self.config
    }

    /// Record that loading `item_key` failed
    pub fn record_failure(&self, item_key: &str, reason: &str) {
        let now = self.clock.now();
        let mut state = self.state.lock();

        state.expire_global(now, self.config.global_cooldown());

        // Re-inserting moves the key to the most recently used end
        state.failures.shift_remove(item_key);
        state.failures.insert(
            item_key.to_string(),
            FailureRecord {
                item_key: item_key.to_string(),
                failed_at: now,
                reason: reason.to_string(),
            },
        );
        state.sweep(now, self.config.item_cooldown(), self.config.max_tracked_items);

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        warn!(
            item = %item_key,
            reason = %reason,
            consecutive = state.consecutive_failures,
            "Playback failure recorded"
        );

        if state.consecutive_failures >= self.config.global_failure_threshold
            && state.global_cooldown_start.is_none()
        {
            state.global_cooldown_start = Some(now);
            warn!(
                consecutive = state.consecutive_failures,
                cooldown_secs = self.config.global_cooldown_secs,
                "Global cooldown started"
            );
        }
    }

    /// Record a successful load. Resets the streak and closes the global breaker.
    pub fn record_success(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.consecutive_failures > 0 || state.global_cooldown_start.is_some() {
            debug!(previous = state.consecutive_failures, "Load succeeded, failure streak reset");
        }

        state.consecutive_failures = 0;
        state.global_cooldown_start = None;
        state.last_success = Some(now);
    }

    /// Decide whether `item_key` may be requested now
    pub fn cooldown_status(&self, item_key: &str) -> CooldownStatus {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let global_window = self.config.global_cooldown();
        state.expire_global(now, global_window);
        if let Some(start) = state.global_cooldown_start {
            let remaining = global_window.saturating_sub(elapsed_between(start, now));
            debug!(remaining_secs = remaining.as_secs(), "Global cooldown active");
            return CooldownStatus::GlobalCooldown { remaining };
        }

        let item_window = self.config.item_cooldown();
        if let Some(index) = state.failures.get_index_of(item_key) {
            let failed_at = state.failures[index].failed_at;
            let elapsed = elapsed_between(failed_at, now);
            if elapsed < item_window {
                let last = state.failures.len() - 1;
                state.failures.move_index(index, last);
                let remaining = item_window - elapsed;
                debug!(
                    item = %item_key,
                    remaining_secs = remaining.as_secs(),
                    "Item cooldown active"
                );
                return CooldownStatus::VideoCooldown {
                    remaining,
                    item_key: item_key.to_string(),
                };
            }
            state.failures.shift_remove_index(index);
            debug!(item = %item_key, "Item cooldown ended");
        }

        CooldownStatus::Ready
    }

    /// Shorthand for `!cooldown_status(item_key).is_ready()`
    pub fn is_cooling_down(&self, item_key: &str) -> bool {
        !self.cooldown_status(item_key).is_ready()
    }

    /// Admission check returning an error when blocked
    pub fn admit(&self, item_key: &str) -> Result<()> {
        match self.cooldown_status(item_key) {
            CooldownStatus::Ready => Ok(()),
            status => Err(Error::CoolingDown(status)),
        }
    }

    /// Drop every record and close the global breaker
    pub fn clear_all(&self) {
        let mut state = self.state.lock();
        state.failures.clear();
        state.consecutive_failures = 0;
        state.global_cooldown_start = None;
        info!("All cooldowns cleared");
    }

    /// Drop the record for one item (manual retry)
    pub fn clear_for_item(&self, item_key: &str) {
        let mut state = self.state.lock();
        if state.failures.shift_remove(item_key).is_some() {
            info!(item = %item_key, "Item cooldown cleared");
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Number of failure records currently held
    pub fn tracked_items(&self) -> usize {
        self.state.lock().failures.len()
    }

    /// Time of the last recorded success
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_success
    }
}

impl Default for CooldownManager {
    fn default() -> Self {
        Self::new(CooldownConfig::default())
    }
}
