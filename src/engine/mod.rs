//! Domain-parameterized notification synchronization engine.
//!
//! One `SyncEngine` per notification domain replaces the previously
//! duplicated per-domain sync modules: the same timer, cache, merge and
//! mutation behavior, parameterized by `DomainConfig`.

pub mod cache;
mod coordinator;
pub mod events;
pub mod exclusion;
pub mod merge;
mod mutation;
mod subscriber;

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::collab::{AlertSink, SessionGuard};
use crate::domain::{DomainConfig, FetchParams, Visibility};
use crate::fetch::NotificationFetcher;
use crate::Result;

pub use cache::{CacheSnapshot, CacheState, SharedCache};
pub use events::{SyncEvent, SyncEventBroadcaster};
pub use exclusion::ExclusionSet;
pub use merge::{MergeOutcome, merge};
pub use subscriber::SubscriberBridge;

use coordinator::PollCoordinator;
use mutation::MutationGateway;

/// The synchronization engine for one notification domain.
///
/// Owns the shared cache, the exclusion set, the poll coordinator and the
/// mutation gateway. Construct once per domain and share the `Arc` with
/// every surface that needs it; subscribers attach through
/// [`SyncEngine::attach`].
pub struct SyncEngine {
    config: DomainConfig,
    cache: Arc<SharedCache>,
    exclusions: Arc<ExclusionSet>,
    broadcaster: SyncEventBroadcaster,
    coordinator: Arc<PollCoordinator>,
    mutations: MutationGateway,
    visibility_tx: watch::Sender<Visibility>,
}

impl SyncEngine {
    pub fn new(
        config: DomainConfig,
        fetcher: Arc<dyn NotificationFetcher>,
        alerts: Arc<dyn AlertSink>,
        session: Arc<dyn SessionGuard>,
    ) -> Arc<Self> {
        let cache = Arc::new(SharedCache::new());
        let exclusions = Arc::new(ExclusionSet::new());
        let broadcaster = SyncEventBroadcaster::new();
        let (visibility_tx, visibility_rx) = watch::channel(Visibility::Foreground);

        let coordinator = Arc::new(PollCoordinator::new(
            config.clone(),
            Arc::clone(&fetcher),
            Arc::clone(&cache),
            Arc::clone(&exclusions),
            broadcaster.clone(),
            Arc::clone(&alerts),
            Arc::clone(&session),
            visibility_rx,
        ));
        let mutations = MutationGateway::new(
            config.clone(),
            fetcher,
            Arc::clone(&cache),
            alerts,
            session,
        );

        Arc::new(Self {
            config,
            cache,
            exclusions,
            broadcaster,
            coordinator,
            mutations,
            visibility_tx,
        })
    }

    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<SharedCache> {
        &self.cache
    }

    /// Arm the domain timer. Idempotent; usually called implicitly by the
    /// first [`SyncEngine::attach`].
    pub fn ensure_started(&self) {
        self.coordinator.ensure_started();
    }

    /// Attach a consumer. Ensures the timer is armed and starts this
    /// consumer's mirror tick.
    pub fn attach(self: &Arc<Self>) -> SubscriberBridge {
        SubscriberBridge::new(Arc::clone(self))
    }

    /// Report a visibility change. The timer re-arms at the matching
    /// cadence; nothing in flight is cancelled.
    pub fn set_visibility(&self, visibility: Visibility) {
        if *self.visibility_tx.borrow() != visibility {
            debug!(domain = %self.config.name, ?visibility, "Visibility changed");
            let _ = self.visibility_tx.send(visibility);
        }
    }

    /// Subscribe to engine events (observer alternative to the mirror
    /// tick).
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.broadcaster.subscribe()
    }

    /// Record an upstream entity as confirmed gone. Matching notifications
    /// are dropped now and can never re-enter the cache this session.
    pub fn exclude(&self, target_id: impl Into<String>) {
        if !self.config.exclusion_enabled {
            warn!(domain = %self.config.name, "Exclusion requested on a domain without exclusion support");
            return;
        }

        let target = target_id.into();
        if self.exclusions.insert(target.clone()) {
            let purged = self.cache.purge_target(&target);
            debug!(domain = %self.config.name, target = %target, purged, "Excluded upstream entity");
        }
    }

    /// On-demand fetch through the same pipeline as the timer.
    pub async fn fetch_once(&self, params: &FetchParams) -> Result<()> {
        self.coordinator.fetch_and_apply(params).await
    }

    /// Mark one notification read (optimistic).
    pub async fn mark_read(&self, id: i64) -> Result<()> {
        self.mutations.mark_read(id).await
    }

    /// Mark all notifications read (optimistic), optionally scoped to a
    /// counterparty for domains that support it.
    pub async fn mark_all_read(&self, counterparty: Option<&str>) -> Result<()> {
        self.mutations.mark_all_read(counterparty).await
    }

    /// Number of cached records still unread.
    pub fn unread_count(&self) -> usize {
        self.cache.unread_count()
    }
}
