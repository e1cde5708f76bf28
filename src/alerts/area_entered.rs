//! Handling of geofence entered events.
//!
//! This module provides the [`AreaEnteredHandler`] which consumes the
//! area-entered events emitted by the geofence gateway and turns them into
//! proximity notifications.

use std::sync::Arc;

use log::{debug, error, info};

use crate::alerts::AlertId;
use crate::alerts::store::AlertStore;
use crate::geofence::GeofenceGateway;
use crate::notify::NotificationDispatcher;

/// Reacts to a location report entering the watched area of an alert.
///
/// Entered events arrive out-of-band from the gateway, so the handler must
/// cope with events for alerts that were removed, expired or already
/// notified in the meantime. It notifies first, then disarms the geofence,
/// then deletes the alert; since the last two steps accept unknown ids, a
/// duplicate or late event falls through as a complete no-op.
pub struct AreaEnteredHandler<S: AlertStore, D: NotificationDispatcher, G: GeofenceGateway> {
    /// Store the entered alert is looked up in and removed from
    store: Arc<S>,
    /// Dispatcher receiving the proximity notification
    dispatcher: Arc<D>,
    /// Gateway whose region fired the event
    gateway: Arc<G>,
}

impl<S, D, G> AreaEnteredHandler<S, D, G>
where
    S: AlertStore,
    D: NotificationDispatcher,
    G: GeofenceGateway,
{
    /// Create a new [AreaEnteredHandler].
    pub fn new(store: Arc<S>, dispatcher: Arc<D>, gateway: Arc<G>) -> Self {
        AreaEnteredHandler {
            store,
            dispatcher,
            gateway,
        }
    }

    /// Handles the user entering the watched area of alert `id`.
    ///
    /// Looks up the alert and, when it is still active, dispatches the
    /// proximity notification. The geofence is disarmed and the alert
    /// deleted unconditionally afterwards, whether the lookup succeeded
    /// or not.
    pub async fn handle_area_entered(&self, id: AlertId) {
        match self.store.proximity_alert(id).await {
            Some(alert) => {
                info!(
                    "user entered the watched area of alert {} at stop {}",
                    id, alert.stop_code
                );
                self.dispatcher.dispatch_proximity_alert(&alert).await;
            }
            None => debug!("area entered for unknown or already removed alert {}", id),
        }

        if let Err(e) = self.gateway.disarm(id).await {
            error!("failed to disarm geofence of alert {}: {}", id, e);
        }
        self.store.remove_proximity_alert(id).await;
    }
}
