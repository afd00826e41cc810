//! Process-wide holder of the latest merged inbox state.
//!
//! One instance per domain, written only by the poll pipeline and the
//! mutation gateway, read by every subscriber. All writes are whole-object
//! replacements; the one permitted in-place field mutation is the
//! optimistic `is_read` flip.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{NotificationRecord, PaginationState};

use super::merge::{self, MergeOutcome};

/// Mutable cache contents.
#[derive(Debug, Clone, Default)]
pub struct CacheState {
    pub notifications: Vec<NotificationRecord>,
    pub pagination: Option<PaginationState>,
    /// None until the first successful fetch.
    pub last_fetch_time: Option<DateTime<Utc>>,
    /// Id-set of `notifications` as of the last successful fetch; exists
    /// only to compute the newly-arrived delta on the next merge.
    pub seen_ids: HashSet<i64>,
}

/// Render-facing view of the cache.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub notifications: Vec<NotificationRecord>,
    pub pagination: Option<PaginationState>,
    pub last_fetch_time: Option<DateTime<Utc>>,
}

/// Shared cache for one notification domain.
///
/// Created empty and lives for the engine's lifetime; there is no
/// explicit teardown because subscribers come and go independently.
#[derive(Debug, Default)]
pub struct SharedCache {
    state: RwLock<CacheState>,
}

impl SharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone the render-visible parts of the cache.
    pub fn snapshot(&self) -> CacheSnapshot {
        let state = self.state.read();
        CacheSnapshot {
            notifications: state.notifications.clone(),
            pagination: state.pagination.clone(),
            last_fetch_time: state.last_fetch_time,
        }
    }

    /// Run a closure against the current state under the read lock.
    pub(crate) fn with_state<T>(&self, f: impl FnOnce(&CacheState) -> T) -> T {
        f(&self.state.read())
    }

    /// Replace the cache with a merged fetch result.
    pub(crate) fn apply_fetch(
        &self,
        notifications: Vec<NotificationRecord>,
        pagination: PaginationState,
    ) {
        let seen_ids = notifications.iter().map(|n| n.id).collect();
        *self.state.write() = CacheState {
            notifications,
            pagination: Some(pagination),
            last_fetch_time: Some(Utc::now()),
            seen_ids,
        };
    }

    /// Merge a fresh fetch into the cache and replace the contents, all
    /// under one write lock acquisition.
    ///
    /// The merge must not run outside the lock: an optimistic read flip
    /// lands either before the merge (and is carried forward by its read
    /// override) or after the replacement, never in a window where a stale
    /// merged result could overwrite it.
    pub(crate) fn apply_merged(
        &self,
        fresh: Vec<NotificationRecord>,
        pagination: PaginationState,
    ) -> MergeOutcome {
        let mut state = self.state.write();
        let outcome = merge::merge(&state, fresh);
        state.seen_ids = outcome.notifications.iter().map(|n| n.id).collect();
        state.notifications = outcome.notifications.clone();
        state.pagination = Some(pagination);
        state.last_fetch_time = Some(Utc::now());
        outcome
    }

    /// Flip a cached record to read. Returns false when the id is unknown.
    pub(crate) fn mark_read(&self, id: i64) -> bool {
        let mut state = self.state.write();
        match state.notifications.iter_mut().find(|n| n.id == id) {
            Some(record) => {
                record.is_read = true;
                true
            }
            None => false,
        }
    }

    /// Flip every cached record to read in one write, optionally scoped to
    /// a counterparty. Returns the number of records changed.
    pub(crate) fn mark_all_read(&self, counterparty: Option<&str>) -> usize {
        let mut state = self.state.write();
        let mut changed = 0;
        for record in state.notifications.iter_mut() {
            if record.is_read {
                continue;
            }
            if let Some(scope) = counterparty
                && record.counterparty.as_deref() != Some(scope)
            {
                continue;
            }
            record.is_read = true;
            changed += 1;
        }
        changed
    }

    /// Drop cached records referencing the given upstream entity, keeping
    /// `seen_ids` consistent with the remaining records.
    pub(crate) fn purge_target(&self, target_id: &str) -> usize {
        let mut state = self.state.write();
        let before = state.notifications.len();
        state
            .notifications
            .retain(|n| n.target_id.as_deref() != Some(target_id));
        state.seen_ids = state.notifications.iter().map(|n| n.id).collect();
        before - state.notifications.len()
    }

    /// Number of cached records still unread.
    pub fn unread_count(&self) -> usize {
        self.state
            .read()
            .notifications
            .iter()
            .filter(|n| !n.is_read)
            .count()
    }
}
