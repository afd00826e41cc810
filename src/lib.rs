//! Notification synchronization engine for the relay admin panel.
//!
//! Keeps several independent UI surfaces (moderation, payment and report
//! alerts) consistent with a remote notification inbox. One poll timer per
//! domain feeds a shared merged cache; subscribers mirror that cache on a
//! fixed tick, and read-state writes are applied optimistically ahead of
//! server confirmation. Best-effort by design: no durability, no fan-out,
//! no exactly-once delivery.

pub mod collab;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod logging;

pub use engine::{SubscriberBridge, SyncEngine, SyncEvent};
pub use error::{Error, Result};
