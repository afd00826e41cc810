//! Denylist of upstream entities confirmed gone.

use dashmap::DashSet;

use crate::domain::NotificationRecord;

/// Session-lifetime set of upstream entity ids whose notifications must
/// never reappear. Entries are only ever added; there is no removal path
/// because a deleted entity does not come back within a session.
#[derive(Debug, Default)]
pub struct ExclusionSet {
    ids: DashSet<String>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity id. Returns false when it was already present.
    pub fn insert(&self, target_id: impl Into<String>) -> bool {
        self.ids.insert(target_id.into())
    }

    pub fn contains(&self, target_id: &str) -> bool {
        self.ids.contains(target_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Drop records referencing an excluded entity.
    ///
    /// Applied before merging so excluded ids never enter the seen set and
    /// cannot resurrect on a later fetch.
    pub fn filter(&self, notifications: Vec<NotificationRecord>) -> Vec<NotificationRecord> {
        if self.ids.is_empty() {
            return notifications;
        }

        notifications
            .into_iter()
            .filter(|n| match &n.target_id {
                Some(target) => !self.ids.contains(target.as_str()),
                None => true,
            })
            .collect()
    }
}
