//! Per-consumer mirror of the shared cache.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::domain::{FetchParams, NotificationRecord, PaginationState};
use crate::Result;

use super::SyncEngine;

/// Consumer-local render state, refreshed from the shared cache.
#[derive(Debug, Clone, Default)]
struct LocalState {
    notifications: Vec<NotificationRecord>,
    pagination: Option<PaginationState>,
    is_loading: bool,
    error: Option<String>,
}

/// Per-consumer adapter over one domain's engine.
///
/// Attaching ensures the domain timer is armed, then starts a fixed-tick
/// mirror loop copying the shared cache into this consumer's own state.
/// Many independent surfaces can attach to one engine; each sees the same
/// source of truth at most one tick apart. Dropping a bridge stops only
/// its own mirror tick, never the domain timer.
pub struct SubscriberBridge {
    engine: Arc<SyncEngine>,
    local: Arc<RwLock<LocalState>>,
    tick: CancellationToken,
}

impl SubscriberBridge {
    pub(crate) fn new(engine: Arc<SyncEngine>) -> Self {
        engine.ensure_started();

        let local = Arc::new(RwLock::new(LocalState::default()));

        // Seed immediately so a late joiner renders the cache without
        // waiting a full tick.
        {
            let snapshot = engine.cache().snapshot();
            let mut state = local.write();
            state.notifications = snapshot.notifications;
            state.pagination = snapshot.pagination;
        }

        let tick = CancellationToken::new();
        let token = tick.clone();
        let cache = Arc::clone(engine.cache());
        let mirror = Arc::clone(&local);
        let interval = engine.config().mirror_interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let snapshot = cache.snapshot();
                let mut state = mirror.write();
                state.notifications = snapshot.notifications;
                state.pagination = snapshot.pagination;
            }
        });

        Self {
            engine,
            local,
            tick,
        }
    }

    /// Notifications as of this consumer's last mirror tick.
    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.local.read().notifications.clone()
    }

    pub fn pagination(&self) -> Option<PaginationState> {
        self.local.read().pagination.clone()
    }

    /// Whether an on-demand fetch issued by this consumer is in flight.
    pub fn is_loading(&self) -> bool {
        self.local.read().is_loading
    }

    /// Error from this consumer's last on-demand fetch, if any.
    pub fn last_error(&self) -> Option<String> {
        self.local.read().error.clone()
    }

    /// Explicit fetch outside the timer cadence (filter changes,
    /// pagination). Writes through the same merge pipeline as the timer,
    /// so the two cannot race destructively.
    pub async fn fetch_notifications(&self, params: FetchParams) -> Result<()> {
        self.local.write().is_loading = true;

        let result = self.engine.fetch_once(&params).await;

        {
            let mut state = self.local.write();
            state.is_loading = false;
            state.error = result.as_ref().err().map(|e| e.to_string());
        }
        self.refresh_mirror();

        result
    }

    /// Mark one notification read, mirroring the optimistic cache flip
    /// into this consumer's state without waiting for the next tick.
    pub async fn mark_as_read(&self, id: i64) -> Result<()> {
        let result = self.engine.mark_read(id).await;
        self.refresh_mirror();
        result
    }

    /// Mark every notification read.
    pub async fn mark_all_as_read(&self) -> Result<()> {
        let result = self.engine.mark_all_read(None).await;
        self.refresh_mirror();
        result
    }

    /// Mark every notification from one counterparty read. Only valid for
    /// domains configured with scoped read-all.
    pub async fn mark_all_as_read_for(&self, counterparty: &str) -> Result<()> {
        let result = self.engine.mark_all_read(Some(counterparty)).await;
        self.refresh_mirror();
        result
    }

    fn refresh_mirror(&self) {
        let snapshot = self.engine.cache().snapshot();
        let mut state = self.local.write();
        state.notifications = snapshot.notifications;
        state.pagination = snapshot.pagination;
    }
}

impl Drop for SubscriberBridge {
    fn drop(&mut self) {
        // Other subscribers may still depend on the domain timer; only
        // this consumer's mirror tick stops.
        self.tick.cancel();
    }
}
