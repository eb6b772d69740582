//! Change coalescing.
//!
//! Absorbs bursts of raw change notifications into a single flush once the
//! stream goes quiet for one debounce window. Every new notification pushes
//! the deadline out again (sliding window), so a continuous stream of edits
//! is flushed only when it pauses.
//!
//! The coalescer is a plain state machine: it owns the pending set and the
//! deadline, and whoever drives it (the session's event loop) sleeps until
//! [`ChangeCoalescer::deadline`]. Because a single owner mutates both, adding
//! a key and re-arming the deadline is one atomic step with respect to a
//! flush.

use std::collections::BTreeSet;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::keys::DependencyKey;

/// A raw change notification received from the outside world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub key: DependencyKey,
    pub received_at: OffsetDateTime,
}

impl ChangeNotification {
    pub fn new(key: impl Into<DependencyKey>) -> Self {
        Self {
            key: key.into(),
            received_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Distinct set of changed keys emitted once per quiet period.
#[derive(Debug, Clone)]
pub struct FlushBatch {
    /// Unique identifier for log correlation.
    pub id: Uuid,
    /// Monotonic flush number within this coalescer.
    pub sequence: u64,
    /// Changed keys, deduplicated.
    pub keys: BTreeSet<DependencyKey>,
    /// Raw notifications absorbed into this batch (duplicates included).
    pub notifications: usize,
}

impl FlushBatch {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Observable coalescer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalescerState {
    /// No pending changes, no deadline armed.
    Idle,
    /// One or more keys pending, flush due at `deadline`.
    Accumulating { pending: usize, deadline: Instant },
}

/// Debouncing accumulator for changed dependency keys.
#[derive(Debug)]
pub struct ChangeCoalescer {
    window: Duration,
    pending: BTreeSet<DependencyKey>,
    notifications: usize,
    deadline: Option<Instant>,
    next_sequence: u64,
}

impl ChangeCoalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeSet::new(),
            notifications: 0,
            deadline: None,
            next_sequence: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Absorb a notification received now.
    pub fn notify(&mut self, key: DependencyKey) {
        self.notify_at(key, Instant::now());
    }

    /// Absorb a notification received at `now`: add the key and re-arm the
    /// deadline to `now + window`.
    pub fn notify_at(&mut self, key: DependencyKey, now: Instant) {
        let was_idle = self.deadline.is_none();
        let inserted = self.pending.insert(key);
        self.notifications += 1;
        self.deadline = Some(now + self.window);

        debug!(
            pending = self.pending.len(),
            duplicate = !inserted,
            rearmed = !was_idle,
            "Change notification absorbed"
        );
    }

    /// When the pending batch is due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn state(&self) -> CoalescerState {
        match self.deadline {
            Some(deadline) => CoalescerState::Accumulating {
                pending: self.pending.len(),
                deadline,
            },
            None => CoalescerState::Idle,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.deadline.is_none()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Flush if the deadline has passed at `now`.
    pub fn poll_expired(&mut self, now: Instant) -> Option<FlushBatch> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.fire(),
            _ => None,
        }
    }

    /// Snapshot and clear the pending set, disarming the deadline.
    ///
    /// Returns `None` when nothing is pending; an empty flush is never emitted.
    pub fn fire(&mut self) -> Option<FlushBatch> {
        self.deadline = None;
        let notifications = std::mem::take(&mut self.notifications);
        if self.pending.is_empty() {
            return None;
        }

        let keys = std::mem::take(&mut self.pending);
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let batch = FlushBatch {
            id: Uuid::new_v4(),
            sequence,
            keys,
            notifications,
        };

        info!(
            flush_id = %batch.id,
            flush_sequence = batch.sequence,
            key_count = batch.keys.len(),
            notifications = batch.notifications,
            "Change batch flushed"
        );

        Some(batch)
    }
}
