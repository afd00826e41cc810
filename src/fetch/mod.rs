//! Inbox fetch layer.
//!
//! One network round trip per call. No-content responses normalize to an
//! empty page-1 result rather than an error; a 401-equivalent status is a
//! distinguished failure so callers can invalidate the session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::collab::TokenStore;
use crate::domain::{DomainConfig, FetchParams, NotificationRecord, PaginationState};
use crate::{Error, Result};

/// Request timeout for inbox round trips.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one successful list fetch.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub notifications: Vec<NotificationRecord>,
    pub pagination: PaginationState,
}

impl FetchedPage {
    /// The valid zero-item state returned for no-content responses.
    pub fn empty(page_size: u32) -> Self {
        Self {
            notifications: Vec::new(),
            pagination: PaginationState::empty(page_size),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    notifications: Vec<NotificationRecord>,
    pagination: Option<PaginationState>,
}

/// One round trip against a domain's inbox endpoints.
#[async_trait]
pub trait NotificationFetcher: Send + Sync {
    /// Fetch one page of the notification list.
    async fn fetch_page(&self, params: &FetchParams) -> Result<FetchedPage>;

    /// Mark a single notification read server-side.
    async fn mark_read(&self, id: i64) -> Result<()>;

    /// Mark every notification read server-side, optionally scoped to a
    /// counterparty.
    async fn mark_all_read(&self, counterparty: Option<&str>) -> Result<()>;
}

/// HTTP implementation backed by reqwest.
pub struct HttpNotificationFetcher {
    client: Client,
    base_url: String,
    config: DomainConfig,
    tokens: Arc<dyn TokenStore>,
}

impl HttpNotificationFetcher {
    pub fn new(base_url: &str, config: DomainConfig, tokens: Arc<dyn TokenStore>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self::with_client(client, base_url, config, tokens)
    }

    /// Create a fetcher with a caller-supplied client (shared pools, proxies).
    pub fn with_client(
        client: Client,
        base_url: &str,
        config: DomainConfig,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.bearer_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl NotificationFetcher for HttpNotificationFetcher {
    async fn fetch_page(&self, params: &FetchParams) -> Result<FetchedPage> {
        let mut query: Vec<(&str, String)> = vec![
            ("page", params.page.to_string()),
            ("limit", params.limit.to_string()),
        ];
        if let Some(filter) = &params.filter {
            query.push(("filter", filter.clone()));
        }
        if let Some(counterparty) = &params.counterparty {
            query.push(("pubkey", counterparty.clone()));
        }

        let request = self.client.get(self.url(&self.config.list_path)).query(&query);
        let response = self.authorize(request).await.send().await?;
        let status = response.status();
        let body = response.text().await?;

        debug!(
            domain = %self.config.name,
            page = params.page,
            %status,
            "Fetched notification page"
        );

        decode_list_body(status, &body, self.config.page_size)
    }

    async fn mark_read(&self, id: i64) -> Result<()> {
        let request = self
            .client
            .post(self.url(&self.config.read_path))
            .json(&json!({ "id": id }));
        let response = self.authorize(request).await.send().await?;
        check_write_status(response.status())
    }

    async fn mark_all_read(&self, counterparty: Option<&str>) -> Result<()> {
        let mut request = self.client.post(self.url(&self.config.read_all_path));
        if let Some(counterparty) = counterparty {
            request = request.json(&json!({ "pubkey": counterparty }));
        }
        let response = self.authorize(request).await.send().await?;
        check_write_status(response.status())
    }
}

/// Decode a list response. Pure so status and body handling are testable
/// without a live endpoint.
fn decode_list_body(status: StatusCode, body: &str, page_size: u32) -> Result<FetchedPage> {
    if status == StatusCode::NO_CONTENT {
        return Ok(FetchedPage::empty(page_size));
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::Unauthorized);
    }
    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
        });
    }

    let parsed: ListResponse = serde_json::from_str(body)?;
    Ok(FetchedPage {
        notifications: parsed.notifications,
        pagination: parsed
            .pagination
            .unwrap_or_else(|| PaginationState::empty(page_size)),
    })
}

fn check_write_status(status: StatusCode) -> Result<()> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::Unauthorized);
    }
    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
        });
    }
    Ok(())
}
