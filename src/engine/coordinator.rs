//! Poll scheduling for one notification domain.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collab::{AlertSink, SessionGuard};
use crate::domain::{BackoffConfig, DomainConfig, FetchParams, NotificationRecord, Visibility};
use crate::fetch::NotificationFetcher;
use crate::{Error, Result};

use super::cache::SharedCache;
use super::events::{SyncEvent, SyncEventBroadcaster};
use super::exclusion::ExclusionSet;

/// Owns the per-domain timer and runs the fetch pipeline.
///
/// There is never more than one timer task per domain: `ensure_started`
/// is guarded by an atomic flag and later calls are no-ops. The task has
/// no terminal state; it lives for the engine's lifetime so late-joining
/// subscribers are served from the cache without re-initialization.
pub(crate) struct PollCoordinator {
    config: DomainConfig,
    fetcher: Arc<dyn NotificationFetcher>,
    cache: Arc<SharedCache>,
    exclusions: Arc<ExclusionSet>,
    broadcaster: SyncEventBroadcaster,
    alerts: Arc<dyn AlertSink>,
    session: Arc<dyn SessionGuard>,
    visibility_rx: watch::Receiver<Visibility>,
    started: AtomicBool,
    /// Serializes timer fetches with on-demand fetches so merged writes
    /// land in arrival order.
    fetch_lock: Mutex<()>,
    consecutive_failures: AtomicU32,
    /// Set once per failure streak so an expired session notifies the
    /// guard a single time instead of on every scheduled poll.
    session_invalidated: AtomicBool,
    cancellation: CancellationToken,
}

impl PollCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: DomainConfig,
        fetcher: Arc<dyn NotificationFetcher>,
        cache: Arc<SharedCache>,
        exclusions: Arc<ExclusionSet>,
        broadcaster: SyncEventBroadcaster,
        alerts: Arc<dyn AlertSink>,
        session: Arc<dyn SessionGuard>,
        visibility_rx: watch::Receiver<Visibility>,
    ) -> Self {
        Self {
            config,
            fetcher,
            cache,
            exclusions,
            broadcaster,
            alerts,
            session,
            visibility_rx,
            started: AtomicBool::new(false),
            fetch_lock: Mutex::new(()),
            consecutive_failures: AtomicU32::new(0),
            session_invalidated: AtomicBool::new(false),
            cancellation: CancellationToken::new(),
        }
    }

    /// Arm the domain timer. Idempotent; only the first call spawns the
    /// timer task, so N concurrent subscriber mounts still yield exactly
    /// one timer.
    pub(crate) fn ensure_started(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(domain = %self.config.name, "Starting notification poll timer");
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.run().await;
            debug!(domain = %coordinator.config.name, "Poll timer stopped");
        });
    }

    async fn run(&self) {
        let mut visibility_rx = self.visibility_rx.clone();

        // Immediate fetch before arming the recurring timer.
        self.poll_once().await;

        loop {
            let visibility = *visibility_rx.borrow_and_update();
            let delay = self.next_delay(visibility);

            tokio::select! {
                biased;

                _ = self.cancellation.cancelled() => break,
                // A visibility flip only re-arms the timer at the new
                // cadence; it never cancels an in-flight fetch and never
                // forces an extra fetch of its own.
                changed = visibility_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            self.poll_once().await;
        }
    }

    fn next_delay(&self, visibility: Visibility) -> Duration {
        let base = self.config.poll_interval(visibility);
        let failures = self.consecutive_failures.load(Ordering::SeqCst);
        if failures == 0 {
            return base;
        }
        backoff_delay(&self.config.backoff, failures).max(base)
    }

    async fn poll_once(&self) {
        let params = FetchParams::first_page(self.config.page_size);
        if let Err(e) = self.fetch_and_apply(&params).await {
            debug!(domain = %self.config.name, "Scheduled fetch failed: {}", e);
        }
    }

    /// Fetch one page and write it through the filter/merge pipeline.
    ///
    /// Used by both the timer and on-demand subscriber fetches; the lock
    /// keeps the two strictly sequential per domain.
    pub(crate) async fn fetch_and_apply(&self, params: &FetchParams) -> Result<()> {
        let _guard = self.fetch_lock.lock().await;

        match self.fetcher.fetch_page(params).await {
            Ok(page) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                self.session_invalidated.store(false, Ordering::SeqCst);

                let fresh = if self.config.exclusion_enabled {
                    self.exclusions.filter(page.notifications)
                } else {
                    page.notifications
                };

                // Merge and replace happen under one cache lock so a
                // concurrent optimistic read flip cannot be overwritten
                // by a stale merged result.
                let outcome = self.cache.apply_merged(fresh, page.pagination);
                let arrivals: Vec<NotificationRecord> = outcome
                    .notifications
                    .iter()
                    .filter(|n| outcome.newly_arrived.contains(&n.id))
                    .cloned()
                    .collect();

                let unread = self.cache.unread_count();
                debug!(
                    domain = %self.config.name,
                    unread,
                    new = outcome.newly_arrived.len(),
                    "Applied fetch result"
                );
                self.broadcaster.publish(SyncEvent::Updated {
                    domain: self.config.name.clone(),
                    newly_arrived: outcome.newly_arrived,
                    unread,
                });

                if !arrivals.is_empty() {
                    self.alerts.new_arrivals(&self.config.name, &arrivals).await;
                }
                Ok(())
            }
            Err(Error::Unauthorized) => {
                // Auth failures count toward the backoff like any other
                // failure; the guard is notified once per streak.
                self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
                if !self.session_invalidated.swap(true, Ordering::SeqCst) {
                    warn!(domain = %self.config.name, "Fetch rejected, invalidating session");
                    self.session.on_unauthorized().await;
                }
                Err(Error::Unauthorized)
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(
                    domain = %self.config.name,
                    consecutive_failures = failures,
                    "Fetch failed, previous cache state remains visible: {}",
                    e
                );
                self.broadcaster.publish(SyncEvent::FetchFailed {
                    domain: self.config.name.clone(),
                    message: e.to_string(),
                });
                self.alerts.error(&self.config.name, &e.to_string()).await;
                Err(e)
            }
        }
    }
}

/// Exponential backoff with jitter for consecutive fetch failures.
fn backoff_delay(config: &BackoffConfig, failures: u32) -> Duration {
    let base = config.initial.as_millis() as u64;
    let max = config.max.as_millis() as u64;

    let delay_ms = base
        .saturating_mul(2u64.saturating_pow(failures.saturating_sub(1)))
        .min(max);

    // Add up to 25% jitter (offsets below the range floor clamp to zero)
    let jitter_range = delay_ms / 4;
    let jitter = if jitter_range > 0 {
        (rand::random::<u64>() % (jitter_range * 2)).saturating_sub(jitter_range)
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter))
}
