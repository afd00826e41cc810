//! Domain model shared across notification domains.
//!
//! A "domain" is one notification category (moderation, payment, report)
//! with its own endpoints and cache but the same engine behavior.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single notification as served by the inbox endpoint.
///
/// Identity is `id`; merge and dedupe never compare payload fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    /// Content type for moderation notifications (e.g. "post", "profile").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Identifier of the upstream entity this notification refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Reporter or payer key, depending on the domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    /// Payment amount, for payment notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_sats: Option<i64>,
    /// Remaining domain-specific payload, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PartialEq for NotificationRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NotificationRecord {}

/// Pagination descriptor for the last fetched page.
///
/// Never partially updated; each fetch replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationState {
    pub current_page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PaginationState {
    /// The page-1 zero-item state used for no-content responses.
    pub fn empty(page_size: u32) -> Self {
        Self {
            current_page: 1,
            page_size,
            total_items: 0,
            total_pages: 0,
            has_next: false,
            has_previous: false,
        }
    }
}

/// Parameters for one list fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchParams {
    pub page: u32,
    pub limit: u32,
    pub filter: Option<String>,
    pub counterparty: Option<String>,
}

impl FetchParams {
    /// Page-1 fetch at the given page size, no filter.
    pub fn first_page(limit: u32) -> Self {
        Self {
            page: 1,
            limit,
            ..Default::default()
        }
    }
}

/// Page visibility as reported by the hosting surface.
///
/// A backgrounded surface keeps polling, only slower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Foreground,
    Background,
}

/// Backoff bounds applied after consecutive fetch failures.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(120),
        }
    }
}

/// Per-domain engine configuration.
#[derive(Debug, Clone)]
pub struct DomainConfig {
    /// Domain name, used in logs, events and alerts.
    pub name: String,
    /// List endpoint path, relative to the API base URL.
    pub list_path: String,
    /// Mark-one-read endpoint path.
    pub read_path: String,
    /// Mark-all-read endpoint path.
    pub read_all_path: String,
    /// Poll cadence while the surface is visible.
    pub foreground_interval: Duration,
    /// Poll cadence while the surface is backgrounded.
    pub background_interval: Duration,
    /// Cadence at which subscribers mirror the shared cache.
    pub mirror_interval: Duration,
    /// Default page size for scheduled fetches.
    pub page_size: u32,
    /// Whether fetched pages pass through the exclusion filter.
    pub exclusion_enabled: bool,
    /// Whether mark-all-read accepts a counterparty scope.
    pub scoped_read_all: bool,
    /// Backoff bounds for consecutive fetch failures.
    pub backoff: BackoffConfig,
}

impl DomainConfig {
    fn base(name: &str, list_path: &str, read_path: &str, read_all_path: &str) -> Self {
        Self {
            name: name.to_string(),
            list_path: list_path.to_string(),
            read_path: read_path.to_string(),
            read_all_path: read_all_path.to_string(),
            foreground_interval: Duration::from_secs(15),
            background_interval: Duration::from_secs(60),
            mirror_interval: Duration::from_secs(1),
            page_size: 20,
            exclusion_enabled: false,
            scoped_read_all: false,
            backoff: BackoffConfig::default(),
        }
    }

    /// Moderation alerts: exclusion-aware, unscoped read-all.
    pub fn moderation() -> Self {
        Self {
            exclusion_enabled: true,
            ..Self::base(
                "moderation",
                "/moderation/notifications",
                "/moderation/notifications/read",
                "/moderation/notifications/read-all",
            )
        }
    }

    /// Payment alerts: read-all may be scoped to a counterparty.
    pub fn payment() -> Self {
        Self {
            scoped_read_all: true,
            ..Self::base(
                "payment",
                "/payment/notifications",
                "/payment/notifications/read",
                "/payment/notifications/read-all",
            )
        }
    }

    /// Poll cadence for the given visibility.
    pub fn poll_interval(&self, visibility: Visibility) -> Duration {
        match visibility {
            Visibility::Foreground => self.foreground_interval,
            Visibility::Background => self.background_interval,
        }
    }
}
