//! Optimistic write operations against the inbox.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::collab::{AlertSink, SessionGuard};
use crate::domain::DomainConfig;
use crate::fetch::NotificationFetcher;
use crate::{Error, Result};

use super::cache::SharedCache;

/// Wraps the two write operations. The cache flip is applied before the
/// request completes so the UI never waits on the round trip; a failed
/// write is never rolled back because the next poll's merge reconciles
/// read-state anyway.
pub(crate) struct MutationGateway {
    config: DomainConfig,
    fetcher: Arc<dyn NotificationFetcher>,
    cache: Arc<SharedCache>,
    alerts: Arc<dyn AlertSink>,
    session: Arc<dyn SessionGuard>,
}

impl MutationGateway {
    pub(crate) fn new(
        config: DomainConfig,
        fetcher: Arc<dyn NotificationFetcher>,
        cache: Arc<SharedCache>,
        alerts: Arc<dyn AlertSink>,
        session: Arc<dyn SessionGuard>,
    ) -> Self {
        Self {
            config,
            fetcher,
            cache,
            alerts,
            session,
        }
    }

    /// Mark one notification read.
    pub(crate) async fn mark_read(&self, id: i64) -> Result<()> {
        if !self.cache.mark_read(id) {
            debug!(domain = %self.config.name, id, "mark_read for id not in cache");
        }

        match self.fetcher.mark_read(id).await {
            Ok(()) => Ok(()),
            Err(Error::Unauthorized) => {
                self.session.on_unauthorized().await;
                Err(Error::Unauthorized)
            }
            Err(e) => {
                // The optimistic flip stays; only the server write failed.
                warn!(domain = %self.config.name, id, "mark_read write failed: {}", e);
                self.alerts.error(&self.config.name, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Mark every cached notification read, optionally scoped to a
    /// counterparty when the domain supports it. The cache update is one
    /// atomic write across all records, never a partial application.
    pub(crate) async fn mark_all_read(&self, counterparty: Option<&str>) -> Result<()> {
        if counterparty.is_some() && !self.config.scoped_read_all {
            return Err(Error::config(format!(
                "Domain {} does not support scoped read-all",
                self.config.name
            )));
        }

        let changed = self.cache.mark_all_read(counterparty);
        debug!(domain = %self.config.name, changed, "Applied optimistic read-all");

        match self.fetcher.mark_all_read(counterparty).await {
            Ok(()) => Ok(()),
            Err(Error::Unauthorized) => {
                self.session.on_unauthorized().await;
                Err(Error::Unauthorized)
            }
            Err(e) => {
                warn!(domain = %self.config.name, "mark_all_read write failed: {}", e);
                self.alerts.error(&self.config.name, &e.to_string()).await;
                Err(e)
            }
        }
    }
}
