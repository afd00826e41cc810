//! Collaborator interfaces supplied by the hosting application.
//!
//! The engine calls these but owns none of the behavior behind them: no
//! credential storage, no redirects, no rendering.

use async_trait::async_trait;

use crate::domain::NotificationRecord;

/// Supplies the bearer credential for inbox requests.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current bearer token, or None when no session exists.
    async fn bearer_token(&self) -> Option<String>;
}

/// Invoked on any 401-equivalent response.
///
/// Expected to clear credentials and route the user back to
/// authentication; the engine never performs that redirect itself.
#[async_trait]
pub trait SessionGuard: Send + Sync {
    async fn on_unauthorized(&self);
}

/// Surfaces newly-arrived banners and operational errors to the user.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Called once per poll cycle that produced new notifications.
    async fn new_arrivals(&self, domain: &str, records: &[NotificationRecord]);

    /// Called for non-auth fetch and mutation failures.
    async fn error(&self, domain: &str, message: &str);
}
