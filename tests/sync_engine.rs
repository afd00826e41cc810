//! End-to-end engine behavior with scripted fetch results.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use notify_sync::collab::{AlertSink, SessionGuard};
use notify_sync::domain::{BackoffConfig, DomainConfig, FetchParams, NotificationRecord, Visibility};
use notify_sync::engine::{SyncEngine, SyncEvent};
use notify_sync::fetch::{FetchedPage, NotificationFetcher};
use notify_sync::{Error, Result};

fn record(id: i64, is_read: bool) -> NotificationRecord {
    NotificationRecord {
        id,
        created_at: Utc::now(),
        is_read,
        kind: None,
        target_id: None,
        counterparty: None,
        amount_sats: None,
        extra: serde_json::Map::new(),
    }
}

fn record_for(id: i64, target_id: &str) -> NotificationRecord {
    NotificationRecord {
        target_id: Some(target_id.to_string()),
        ..record(id, false)
    }
}

fn page(notifications: Vec<NotificationRecord>) -> FetchedPage {
    FetchedPage {
        notifications,
        pagination: notify_sync::domain::PaginationState::empty(20),
    }
}

/// Fetcher that pops scripted results; once the script runs out it keeps
/// returning an empty page.
#[derive(Default)]
struct ScriptedFetcher {
    pages: Mutex<VecDeque<Result<FetchedPage>>>,
    fetch_calls: AtomicU32,
    fail_writes: AtomicBool,
    writes_unauthorized: AtomicBool,
    read_calls: Mutex<Vec<i64>>,
    read_all_calls: Mutex<Vec<Option<String>>>,
}

impl ScriptedFetcher {
    fn with_pages(pages: Vec<Result<FetchedPage>>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into_iter().collect()),
            ..Default::default()
        })
    }

    fn write_error(&self) -> Option<Error> {
        if self.writes_unauthorized.load(Ordering::SeqCst) {
            Some(Error::Unauthorized)
        } else if self.fail_writes.load(Ordering::SeqCst) {
            Some(Error::Other("write refused".to_string()))
        } else {
            None
        }
    }
}

#[async_trait]
impl NotificationFetcher for ScriptedFetcher {
    async fn fetch_page(&self, _params: &FetchParams) -> Result<FetchedPage> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match self.pages.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(page(Vec::new())),
        }
    }

    async fn mark_read(&self, id: i64) -> Result<()> {
        self.read_calls.lock().unwrap().push(id);
        match self.write_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn mark_all_read(&self, counterparty: Option<&str>) -> Result<()> {
        self.read_all_calls
            .lock()
            .unwrap()
            .push(counterparty.map(str::to_string));
        match self.write_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct RecordingAlerts {
    arrivals: Mutex<Vec<Vec<i64>>>,
    errors: Mutex<Vec<String>>,
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn new_arrivals(&self, _domain: &str, records: &[NotificationRecord]) {
        self.arrivals
            .lock()
            .unwrap()
            .push(records.iter().map(|n| n.id).collect());
    }

    async fn error(&self, _domain: &str, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

#[derive(Default)]
struct RecordingSession {
    invalidations: AtomicU32,
}

#[async_trait]
impl SessionGuard for RecordingSession {
    async fn on_unauthorized(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    engine: Arc<SyncEngine>,
    fetcher: Arc<ScriptedFetcher>,
    alerts: Arc<RecordingAlerts>,
    session: Arc<RecordingSession>,
}

fn harness(config: DomainConfig, pages: Vec<Result<FetchedPage>>) -> Harness {
    let fetcher = ScriptedFetcher::with_pages(pages);
    let alerts = Arc::new(RecordingAlerts::default());
    let session = Arc::new(RecordingSession::default());
    let engine = SyncEngine::new(
        config,
        Arc::clone(&fetcher) as Arc<dyn NotificationFetcher>,
        Arc::clone(&alerts) as Arc<dyn AlertSink>,
        Arc::clone(&session) as Arc<dyn SessionGuard>,
    );
    Harness {
        engine,
        fetcher,
        alerts,
        session,
    }
}

fn fast_config() -> DomainConfig {
    DomainConfig {
        mirror_interval: Duration::from_millis(20),
        ..DomainConfig::payment()
    }
}

#[tokio::test]
async fn cold_start_yields_no_arrivals_even_for_unread_items() {
    let h = harness(
        fast_config(),
        vec![Ok(page(vec![record(1, false), record(2, false)]))],
    );
    let mut events = h.engine.subscribe();

    h.engine
        .fetch_once(&FetchParams::first_page(20))
        .await
        .unwrap();

    match events.try_recv().unwrap() {
        SyncEvent::Updated {
            newly_arrived,
            unread,
            ..
        } => {
            assert!(newly_arrived.is_empty());
            assert_eq!(unread, 2);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(h.alerts.arrivals.lock().unwrap().is_empty());
}

#[tokio::test]
async fn read_state_survives_a_lagging_server_and_arrivals_fire_once() {
    let h = harness(
        fast_config(),
        vec![
            Ok(page(vec![record(1, false), record(2, false)])),
            // Server lag: id 1 still reported unread after the local read.
            Ok(page(vec![record(1, false), record(2, false)])),
            Ok(page(vec![record(1, false), record(2, false), record(3, false)])),
        ],
    );
    let params = FetchParams::first_page(20);

    h.engine.fetch_once(&params).await.unwrap();
    h.engine.mark_read(1).await.unwrap();
    assert_eq!(h.engine.unread_count(), 1);

    h.engine.fetch_once(&params).await.unwrap();
    let snapshot = h.engine.cache().snapshot();
    let first = snapshot.notifications.iter().find(|n| n.id == 1).unwrap();
    assert!(first.is_read, "local read must win over the lagging server");
    assert!(h.alerts.arrivals.lock().unwrap().is_empty());

    h.engine.fetch_once(&params).await.unwrap();
    let arrivals = h.alerts.arrivals.lock().unwrap();
    assert_eq!(arrivals.as_slice(), &[vec![3]]);
}

#[tokio::test]
async fn excluded_entities_never_resurrect() {
    let config = DomainConfig {
        mirror_interval: Duration::from_millis(20),
        ..DomainConfig::moderation()
    };
    let h = harness(
        config,
        vec![
            Ok(page(vec![record_for(1, "evt-9"), record_for(2, "evt-5")])),
            // The deleted entity keeps showing up in server responses.
            Ok(page(vec![record_for(1, "evt-9"), record_for(2, "evt-5")])),
            Ok(page(vec![record_for(1, "evt-9")])),
        ],
    );
    let params = FetchParams::first_page(20);

    h.engine.fetch_once(&params).await.unwrap();
    assert_eq!(h.engine.cache().snapshot().notifications.len(), 2);

    h.engine.exclude("evt-9");
    assert_eq!(h.engine.cache().snapshot().notifications.len(), 1);

    h.engine.fetch_once(&params).await.unwrap();
    let ids: Vec<i64> = h
        .engine
        .cache()
        .snapshot()
        .notifications
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(ids, vec![2]);

    h.engine.fetch_once(&params).await.unwrap();
    assert!(h.engine.cache().snapshot().notifications.is_empty());
    // The filtered record never counted as newly arrived either.
    assert!(h.alerts.arrivals.lock().unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_attaches_share_one_timer() {
    let config = DomainConfig {
        foreground_interval: Duration::from_secs(3600),
        mirror_interval: Duration::from_millis(10),
        ..DomainConfig::payment()
    };
    let h = harness(config, vec![Ok(page(vec![record(1, false)]))]);

    let bridges: Vec<_> = (0..5).map(|_| h.engine.attach()).collect();
    tokio::time::sleep(Duration::from_millis(150)).await;

    // One immediate fetch from the single timer, nothing per-subscriber.
    assert_eq!(h.fetcher.fetch_calls.load(Ordering::SeqCst), 1);

    // Every bridge mirrors the same cache contents.
    for bridge in &bridges {
        assert_eq!(bridge.notifications().len(), 1);
    }

    // Dropping subscribers leaves the timer (and cache) alive.
    drop(bridges);
    let late_joiner = h.engine.attach();
    assert_eq!(late_joiner.notifications().len(), 1);
    assert_eq!(h.fetcher.fetch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn timer_keeps_polling_at_foreground_cadence() {
    let config = DomainConfig {
        foreground_interval: Duration::from_millis(20),
        mirror_interval: Duration::from_millis(10),
        ..DomainConfig::payment()
    };
    let h = harness(config, Vec::new());

    let _bridge = h.engine.attach();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(h.fetcher.fetch_calls.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn visibility_flip_rearms_without_extra_fetch() {
    let config = DomainConfig {
        foreground_interval: Duration::from_secs(3600),
        background_interval: Duration::from_secs(7200),
        mirror_interval: Duration::from_millis(10),
        ..DomainConfig::payment()
    };
    let h = harness(config, Vec::new());

    let _bridge = h.engine.attach();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.fetcher.fetch_calls.load(Ordering::SeqCst), 1);

    h.engine.set_visibility(Visibility::Background);
    h.engine.set_visibility(Visibility::Foreground);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Re-arming the timer must not produce fetches of its own.
    assert_eq!(h.fetcher.fetch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transport_failure_keeps_previous_cache_and_surfaces_error() {
    let h = harness(
        fast_config(),
        vec![
            Ok(page(vec![record(1, false), record(2, false)])),
            Err(Error::Other("connection reset".to_string())),
        ],
    );
    let params = FetchParams::first_page(20);

    h.engine.fetch_once(&params).await.unwrap();
    let err = h.engine.fetch_once(&params).await.unwrap_err();
    assert!(matches!(err, Error::Other(_)));

    // Stale-but-good state remains visible.
    assert_eq!(h.engine.cache().snapshot().notifications.len(), 2);
    assert_eq!(
        h.alerts.errors.lock().unwrap().as_slice(),
        &["connection reset".to_string()]
    );
    assert_eq!(h.session.invalidations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unauthorized_fetch_invalidates_session() {
    let h = harness(fast_config(), vec![Err(Error::Unauthorized)]);

    let err = h
        .engine
        .fetch_once(&FetchParams::first_page(20))
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(h.session.invalidations.load(Ordering::SeqCst), 1);
    // Auth failures go to the session guard, not the toast sink.
    assert!(h.alerts.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_mark_read_keeps_the_optimistic_flip() {
    let h = harness(fast_config(), vec![Ok(page(vec![record(1, false)]))]);
    h.engine
        .fetch_once(&FetchParams::first_page(20))
        .await
        .unwrap();

    h.fetcher.fail_writes.store(true, Ordering::SeqCst);
    let err = h.engine.mark_read(1).await.unwrap_err();
    assert!(matches!(err, Error::Other(_)));

    // No rollback; the next poll's merge reconciles.
    let snapshot = h.engine.cache().snapshot();
    assert!(snapshot.notifications[0].is_read);
    assert_eq!(h.alerts.errors.lock().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn optimistic_read_flip_survives_a_concurrent_merge_apply() {
    // Race a read flip against a merge of a lagging page. The flip must
    // land either before the merge (carried by its read override) or
    // after the replacement; it must never be overwritten by a stale
    // merged result.
    for _ in 0..50 {
        let records: Vec<NotificationRecord> = (1..=200).map(|id| record(id, false)).collect();
        let h = harness(
            fast_config(),
            vec![Ok(page(records.clone())), Ok(page(records))],
        );
        let params = FetchParams::first_page(20);
        h.engine.fetch_once(&params).await.unwrap();

        let engine = Arc::clone(&h.engine);
        let racing_fetch = tokio::spawn(async move {
            engine.fetch_once(&FetchParams::first_page(20)).await.unwrap();
        });
        h.engine.mark_read(100).await.unwrap();
        racing_fetch.await.unwrap();

        let snapshot = h.engine.cache().snapshot();
        let target = snapshot.notifications.iter().find(|n| n.id == 100).unwrap();
        assert!(
            target.is_read,
            "read flip lost: record 100 reverted to unread after a concurrent merge apply"
        );
    }
}

#[tokio::test]
async fn repeated_unauthorized_polls_back_off_and_notify_once() {
    let config = DomainConfig {
        foreground_interval: Duration::from_millis(10),
        mirror_interval: Duration::from_millis(10),
        backoff: BackoffConfig {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(400),
        },
        ..DomainConfig::payment()
    };
    let h = harness(config, (0..20).map(|_| Err(Error::Unauthorized)).collect());

    let _bridge = h.engine.attach();
    tokio::time::sleep(Duration::from_millis(350)).await;

    // An expired session invalidates once per streak, not once per poll.
    assert_eq!(h.session.invalidations.load(Ordering::SeqCst), 1);

    let calls = h.fetcher.fetch_calls.load(Ordering::SeqCst);
    assert!(calls >= 2, "timer should keep retrying after backoff");
    assert!(calls <= 6, "repeated 401 polls must back off, got {calls} fetches");
}

#[tokio::test]
async fn unauthorized_write_invalidates_session() {
    let h = harness(fast_config(), vec![Ok(page(vec![record(1, false)]))]);
    h.engine
        .fetch_once(&FetchParams::first_page(20))
        .await
        .unwrap();

    h.fetcher.writes_unauthorized.store(true, Ordering::SeqCst);
    let err = h.engine.mark_all_read(None).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(h.session.invalidations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mark_all_read_is_idempotent_and_scoped_per_capability() {
    let h = harness(
        fast_config(),
        vec![Ok(page(vec![
            NotificationRecord {
                counterparty: Some("alice".to_string()),
                ..record(1, false)
            },
            NotificationRecord {
                counterparty: Some("bob".to_string()),
                ..record(2, false)
            },
        ]))],
    );
    h.engine
        .fetch_once(&FetchParams::first_page(20))
        .await
        .unwrap();

    // Payment supports counterparty scope.
    h.engine.mark_all_read(Some("alice")).await.unwrap();
    assert_eq!(h.engine.unread_count(), 1);

    h.engine.mark_all_read(None).await.unwrap();
    let first = h.engine.cache().snapshot();
    h.engine.mark_all_read(None).await.unwrap();
    let second = h.engine.cache().snapshot();
    let reads = |s: &notify_sync::engine::CacheSnapshot| {
        s.notifications
            .iter()
            .map(|n| (n.id, n.is_read))
            .collect::<Vec<_>>()
    };
    assert_eq!(reads(&first), reads(&second));
    assert_eq!(
        h.fetcher.read_all_calls.lock().unwrap().as_slice(),
        &[Some("alice".to_string()), None, None]
    );
}

#[tokio::test]
async fn scoped_read_all_is_rejected_without_the_capability() {
    // Moderation has no counterparty scope.
    let config = DomainConfig {
        mirror_interval: Duration::from_millis(20),
        ..DomainConfig::moderation()
    };
    let h = harness(config, Vec::new());

    let err = h.engine.mark_all_read(Some("alice")).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(h.fetcher.read_all_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn on_demand_fetch_reports_loading_and_errors_per_consumer() {
    let config = DomainConfig {
        foreground_interval: Duration::from_secs(3600),
        mirror_interval: Duration::from_millis(10),
        ..DomainConfig::payment()
    };
    let h = harness(
        config,
        vec![
            Ok(page(Vec::new())), // immediate timer fetch
            Err(Error::Other("relay down".to_string())),
            Ok(page(vec![record(7, false)])),
        ],
    );

    let bridge = h.engine.attach();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = bridge
        .fetch_notifications(FetchParams::first_page(20))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Other(_)));
    assert!(!bridge.is_loading());
    assert_eq!(bridge.last_error(), Some("relay down".to_string()));

    bridge
        .fetch_notifications(FetchParams {
            page: 2,
            limit: 20,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(bridge.last_error().is_none());
    assert_eq!(bridge.notifications().len(), 1);
    assert_eq!(bridge.notifications()[0].id, 7);
}
