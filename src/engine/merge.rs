//! Pure reconciliation of a fresh fetch with locally known state.

use std::collections::HashSet;

use crate::domain::NotificationRecord;

use super::cache::CacheState;

/// Output of one merge pass.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The records that become the new cache contents.
    pub notifications: Vec<NotificationRecord>,
    /// Ids seen for the first time this cycle. Always empty on the first
    /// merge after startup so pre-existing unread items don't fire banners.
    pub newly_arrived: Vec<i64>,
}

/// Reconcile freshly fetched notifications with the previous cache state.
///
/// Local knowledge of "read" always wins over a lagging server: any record
/// the previous state had as read stays read regardless of the server
/// value. The newly-arrived delta compares fresh ids against the ids seen
/// on the last successful fetch.
pub fn merge(prev: &CacheState, fresh: Vec<NotificationRecord>) -> MergeOutcome {
    let read_override: HashSet<i64> = prev
        .notifications
        .iter()
        .filter(|n| n.is_read)
        .map(|n| n.id)
        .collect();
    let cold_start = prev.last_fetch_time.is_none();

    let mut notifications = fresh;
    let mut newly_arrived = Vec::new();
    for record in notifications.iter_mut() {
        if read_override.contains(&record.id) {
            record.is_read = true;
        }
        if !cold_start && !prev.seen_ids.contains(&record.id) {
            newly_arrived.push(record.id);
        }
    }

    MergeOutcome {
        notifications,
        newly_arrived,
    }
}
