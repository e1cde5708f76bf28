//! Notification delivery.
//!
//! This module provides the [`NotificationDispatcher`] trait through which
//! monitoring notifies the user, and a webhook implementation that posts
//! JSON payloads to a configured URL.
//!
//! # Modules
//!
//! - `webhook` - Dispatcher posting notifications to an HTTP webhook

mod webhook;

use async_trait::async_trait;
use mockall::automock;

use crate::alerts::{ArrivalAlert, ProximityAlert};

pub use crate::notify::webhook::WebhookDispatcher;

/// Trait for delivering alert notifications.
///
/// Delivery is best-effort. Implementations log failures instead of
/// returning them, because by the time a notification is dispatched the
/// alert has already been consumed and there is nothing left to retry
/// against.
#[automock]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Notifies that watched services are due at the alert's stop.
    ///
    /// `qualifying_services` holds the watched services whose earliest
    /// departure is within the alert's trigger window.
    async fn dispatch_time_alert(&self, alert: &ArrivalAlert, qualifying_services: &[String]);

    /// Notifies that the user entered the watched area of `alert`.
    async fn dispatch_proximity_alert(&self, alert: &ProximityAlert);

    /// Notifies that proximity monitoring stopped and `removed` alerts were
    /// cancelled.
    async fn dispatch_monitoring_unavailable(&self, removed: &[ProximityAlert]);
}
