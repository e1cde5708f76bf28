//! Public facade over the alert lifecycle.
//!
//! This module provides the [`AlertsCoordinator`] which owns the add and
//! remove operations for both alert kinds and makes sure the matching
//! monitor runs whenever alerts exist. Everything else in the alert layer
//! is driven by the store; the coordinator is the only place that starts
//! tasks.

use std::sync::Arc;

use log::{info, warn};

use crate::alerts::alert::{ArrivalAlert, ProximityAlert};
use crate::alerts::arrival_monitor::ArrivalAlertMonitor;
use crate::alerts::proximity_reconciler::ProximityAlertReconciler;
use crate::alerts::store::AlertStore;
use crate::alerts::AlertId;
use crate::geofence::GeofenceGateway;
use crate::livetimes::LiveTimesClient;
use crate::notify::NotificationDispatcher;
use crate::stops::StopLocationResolver;

/// Facade for creating, removing and monitoring alerts.
///
/// Adding an alert persists it in the store and starts the monitor for its
/// kind when none is running. The monitors stop themselves once their last
/// alert is consumed, so the coordinator only ever has to start them; a
/// handle of a finished task counts as stopped and may be started again.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # use buswatch::alerts::{
/// #     AlertsCoordinator, ArrivalAlertMonitor, MemoryAlertStore, ProximityAlertReconciler,
/// # };
/// # use buswatch::livetimes::BusTimesClient;
/// # use buswatch::notify::WebhookDispatcher;
/// # use buswatch::stops::StopCatalogue;
/// # use buswatch::geofence::SoftwareGeofenceGateway;
/// # async fn example(
/// #     monitor: Arc<ArrivalAlertMonitor<MemoryAlertStore, BusTimesClient, WebhookDispatcher>>,
/// #     reconciler: Arc<ProximityAlertReconciler<MemoryAlertStore, StopCatalogue, SoftwareGeofenceGateway>>,
/// #     store: Arc<MemoryAlertStore>,
/// #     dispatcher: Arc<WebhookDispatcher>,
/// # ) {
/// let coordinator = AlertsCoordinator::new(store, dispatcher, monitor, reconciler);
///
/// coordinator.add_arrival_alert("6100231", ["25"], 5).await;
/// coordinator.add_proximity_alert("6100231", 250.0).await;
/// # }
/// ```
pub struct AlertsCoordinator<S, L, D, R, G>
where
    S: AlertStore,
    L: LiveTimesClient,
    D: NotificationDispatcher,
    R: StopLocationResolver,
    G: GeofenceGateway,
{
    /// Store every operation goes through
    store: Arc<S>,
    /// Dispatcher for notifications the coordinator sends itself
    dispatcher: Arc<D>,
    /// Monitor evaluating arrival alerts
    arrival_monitor: Arc<ArrivalAlertMonitor<S, L, D>>,
    /// Reconciler mirroring proximity alerts into geofences
    proximity_reconciler: Arc<ProximityAlertReconciler<S, R, G>>,
}

impl<S, L, D, R, G> AlertsCoordinator<S, L, D, R, G>
where
    S: AlertStore + 'static,
    L: LiveTimesClient + 'static,
    D: NotificationDispatcher + 'static,
    R: StopLocationResolver + 'static,
    G: GeofenceGateway + 'static,
{
    /// Create a new [AlertsCoordinator]. No monitoring runs until an alert
    /// is added or [`Self::ensure_monitoring_if_alerts_exist`] is called.
    pub fn new(
        store: Arc<S>,
        dispatcher: Arc<D>,
        arrival_monitor: Arc<ArrivalAlertMonitor<S, L, D>>,
        proximity_reconciler: Arc<ProximityAlertReconciler<S, R, G>>,
    ) -> Self {
        AlertsCoordinator {
            store,
            dispatcher,
            arrival_monitor,
            proximity_reconciler,
        }
    }

    /// Creates an arrival alert for `stop_code` and starts monitoring.
    ///
    /// A stop carries at most one arrival alert. An existing alert for the
    /// same stop is removed first, so the new alert supersedes it.
    ///
    /// # Returns
    ///
    /// The created alert, whose id can be used to remove it later.
    pub async fn add_arrival_alert(
        &self,
        stop_code: &str,
        services: impl IntoIterator<Item = impl Into<String>>,
        time_trigger: u32,
    ) -> ArrivalAlert {
        let alert = ArrivalAlert::new(stop_code, services, time_trigger);

        self.store.remove_arrival_alerts_for_stop(stop_code).await;
        self.store.add_arrival_alert(alert.clone()).await;
        self.arrival_monitor.start().await;

        alert
    }

    /// Creates a proximity alert around `stop_code` and starts monitoring.
    ///
    /// # Returns
    ///
    /// The created alert, whose id can be used to remove it later.
    pub async fn add_proximity_alert(&self, stop_code: &str, radius_meters: f64) -> ProximityAlert {
        let alert = ProximityAlert::new(stop_code, radius_meters);

        self.store.add_proximity_alert(alert.clone()).await;
        self.proximity_reconciler.start().await;

        alert
    }

    /// Removes the arrival alert with `id`. Unknown ids are ignored.
    pub async fn remove_arrival_alert(&self, id: AlertId) {
        self.store.remove_arrival_alert(id).await;
    }

    /// Removes every arrival alert watching `stop_code`.
    pub async fn remove_arrival_alerts_for_stop(&self, stop_code: &str) {
        self.store.remove_arrival_alerts_for_stop(stop_code).await;
    }

    /// Removes the proximity alert with `id`. Unknown ids are ignored.
    pub async fn remove_proximity_alert(&self, id: AlertId) {
        self.store.remove_proximity_alert(id).await;
    }

    /// Removes every proximity alert watching `stop_code`.
    pub async fn remove_proximity_alerts_for_stop(&self, stop_code: &str) {
        self.store.remove_proximity_alerts_for_stop(stop_code).await;
    }

    /// Starts monitoring for whatever alerts are already in the store.
    ///
    /// Called once at process start so alerts persisted by a previous run
    /// are picked up again. Alerts that expired while the daemon was down
    /// were already dropped by the store, so this only resumes live ones.
    pub async fn ensure_monitoring_if_alerts_exist(&self) {
        let arrival = self.store.arrival_alert_count().await;
        if arrival > 0 {
            info!("resuming monitoring of {} arrival alert(s)", arrival);
            self.arrival_monitor.start().await;
        }

        let proximity = self.store.proximity_alert_count().await;
        if proximity > 0 {
            info!("resuming monitoring of {} proximity alert(s)", proximity);
            self.proximity_reconciler.start().await;
        }
    }

    /// Cancels all proximity alerts because the host cannot keep running.
    ///
    /// Proximity alerts are only honest while something watches the user's
    /// location. When the host signals it cannot guarantee that, the alerts
    /// are removed and the user is told, rather than leaving them silently
    /// unchecked. The emptied store drives the reconciler through one last
    /// pass that disarms the geofences and stops it.
    ///
    /// # Returns
    ///
    /// The cancelled alerts, already announced through the dispatcher.
    pub async fn handle_monitoring_denied(&self) -> Vec<ProximityAlert> {
        warn!("host denied continued monitoring, cancelling proximity alerts");

        let removed = self.store.remove_all_proximity_alerts().await;
        if !removed.is_empty() {
            self.dispatcher.dispatch_monitoring_unavailable(&removed).await;
        }

        removed
    }

    /// Whether the arrival monitor task is currently running.
    pub async fn is_arrival_monitor_running(&self) -> bool {
        self.arrival_monitor.is_running().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::store::MemoryAlertStore;
    use crate::geofence::MockGeofenceGateway;
    use crate::livetimes::MockLiveTimesClient;
    use crate::notify::MockNotificationDispatcher;
    use crate::stops::{MockStopLocationResolver, StopLocation};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::time::sleep;

    type TestCoordinator = AlertsCoordinator<
        MemoryAlertStore,
        MockLiveTimesClient,
        MockNotificationDispatcher,
        MockStopLocationResolver,
        MockGeofenceGateway,
    >;

    /// Coordinator over a fresh store whose collaborators absorb any call.
    fn create_test_coordinator(
        store: Arc<MemoryAlertStore>,
        dispatcher: MockNotificationDispatcher,
        gateway: MockGeofenceGateway,
    ) -> TestCoordinator {
        let mut live_times = MockLiveTimesClient::new();
        live_times
            .expect_departures()
            .returning(|_, _| Ok(HashMap::new()));

        let mut resolver = MockStopLocationResolver::new();
        resolver.expect_stop_location().returning(|_| {
            Some(StopLocation {
                latitude: -43.552,
                longitude: 172.635,
            })
        });

        let monitor = Arc::new(ArrivalAlertMonitor::new(
            Arc::clone(&store),
            Arc::new(live_times),
            Arc::new(MockNotificationDispatcher::new()),
            Duration::from_millis(50),
        ));
        let reconciler = Arc::new(ProximityAlertReconciler::new(
            Arc::clone(&store),
            Arc::new(resolver),
            Arc::new(gateway),
        ));

        AlertsCoordinator::new(store, Arc::new(dispatcher), monitor, reconciler)
    }

    fn permissive_gateway() -> MockGeofenceGateway {
        let mut gateway = MockGeofenceGateway::new();
        gateway.expect_arm().returning(|_, _, _, _| Ok(()));
        gateway.expect_disarm().returning(|_| Ok(()));
        gateway
    }

    #[tokio::test]
    async fn test_second_arrival_alert_for_stop_supersedes_first() {
        let store = Arc::new(MemoryAlertStore::new());
        let coordinator = create_test_coordinator(
            Arc::clone(&store),
            MockNotificationDispatcher::new(),
            MockGeofenceGateway::new(),
        );

        coordinator.add_arrival_alert("6100231", ["25"], 5).await;
        let second = coordinator.add_arrival_alert("6100231", ["X12"], 10).await;

        let alerts = store.arrival_alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0], second);
        assert_eq!(alerts[0].time_trigger, 10);
    }

    #[tokio::test]
    async fn test_alerts_for_different_stops_coexist() {
        let store = Arc::new(MemoryAlertStore::new());
        let coordinator = create_test_coordinator(
            Arc::clone(&store),
            MockNotificationDispatcher::new(),
            MockGeofenceGateway::new(),
        );

        coordinator.add_arrival_alert("6100231", ["25"], 5).await;
        coordinator.add_arrival_alert("6100232", ["25"], 5).await;

        assert_eq!(store.arrival_alert_count().await, 2);
    }

    #[tokio::test]
    async fn test_add_arrival_alert_starts_monitor() {
        let store = Arc::new(MemoryAlertStore::new());
        let coordinator = create_test_coordinator(
            store,
            MockNotificationDispatcher::new(),
            MockGeofenceGateway::new(),
        );

        assert!(!coordinator.is_arrival_monitor_running().await);

        coordinator.add_arrival_alert("6100231", ["25"], 5).await;
        assert!(coordinator.is_arrival_monitor_running().await);

        // A second add reuses the running task.
        coordinator.add_arrival_alert("6100232", ["3"], 5).await;
        assert!(coordinator.is_arrival_monitor_running().await);
    }

    #[tokio::test]
    async fn test_monitor_restartable_after_self_stop() {
        let store = Arc::new(MemoryAlertStore::new());
        let coordinator = create_test_coordinator(
            Arc::clone(&store),
            MockNotificationDispatcher::new(),
            MockGeofenceGateway::new(),
        );

        let alert = coordinator.add_arrival_alert("6100231", ["25"], 5).await;
        coordinator.remove_arrival_alert(alert.id).await;
        sleep(Duration::from_millis(100)).await;

        // The monitor stopped itself once the store emptied.
        assert!(!coordinator.is_arrival_monitor_running().await);

        coordinator.add_arrival_alert("6100231", ["25"], 5).await;
        assert!(coordinator.is_arrival_monitor_running().await);
    }

    #[tokio::test]
    async fn test_add_proximity_alert_starts_reconciler() {
        let store = Arc::new(MemoryAlertStore::new());
        let coordinator = create_test_coordinator(
            Arc::clone(&store),
            MockNotificationDispatcher::new(),
            permissive_gateway(),
        );

        coordinator.add_proximity_alert("6100231", 250.0).await;
        sleep(Duration::from_millis(100)).await;

        assert_eq!(store.proximity_alert_count().await, 1);
        assert!(coordinator.proximity_reconciler.is_running().await);
    }

    #[tokio::test]
    async fn test_remove_operations_delete_from_store() {
        let store = Arc::new(MemoryAlertStore::new());
        let coordinator = create_test_coordinator(
            Arc::clone(&store),
            MockNotificationDispatcher::new(),
            permissive_gateway(),
        );

        let arrival = coordinator.add_arrival_alert("6100231", ["25"], 5).await;
        let proximity = coordinator.add_proximity_alert("6100232", 250.0).await;

        coordinator.remove_arrival_alert(arrival.id).await;
        coordinator.remove_proximity_alert(proximity.id).await;

        assert_eq!(store.arrival_alert_count().await, 0);
        assert_eq!(store.proximity_alert_count().await, 0);
    }

    #[tokio::test]
    async fn test_ensure_monitoring_resumes_persisted_alerts() {
        let store = Arc::new(MemoryAlertStore::new());
        store
            .add_arrival_alert(ArrivalAlert::new("6100231", ["25"], 5))
            .await;
        store
            .add_proximity_alert(ProximityAlert::new("6100232", 250.0))
            .await;

        let coordinator = create_test_coordinator(
            store,
            MockNotificationDispatcher::new(),
            permissive_gateway(),
        );
        coordinator.ensure_monitoring_if_alerts_exist().await;
        sleep(Duration::from_millis(100)).await;

        assert!(coordinator.is_arrival_monitor_running().await);
        assert!(coordinator.proximity_reconciler.is_running().await);
    }

    #[tokio::test]
    async fn test_ensure_monitoring_with_empty_store_starts_nothing() {
        let store = Arc::new(MemoryAlertStore::new());
        let coordinator = create_test_coordinator(
            store,
            MockNotificationDispatcher::new(),
            MockGeofenceGateway::new(),
        );

        coordinator.ensure_monitoring_if_alerts_exist().await;

        assert!(!coordinator.is_arrival_monitor_running().await);
        assert!(!coordinator.proximity_reconciler.is_running().await);
    }

    #[tokio::test]
    async fn test_monitoring_denied_cancels_and_announces() {
        let store = Arc::new(MemoryAlertStore::new());

        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher
            .expect_dispatch_monitoring_unavailable()
            .withf(|removed: &[ProximityAlert]| removed.len() == 2)
            .times(1)
            .returning(|_| ());

        let coordinator =
            create_test_coordinator(Arc::clone(&store), dispatcher, permissive_gateway());

        coordinator.add_proximity_alert("6100231", 250.0).await;
        coordinator.add_proximity_alert("6100232", 400.0).await;
        sleep(Duration::from_millis(100)).await;

        let removed = coordinator.handle_monitoring_denied().await;
        assert_eq!(removed.len(), 2);
        assert_eq!(store.proximity_alert_count().await, 0);

        // The emptied store lets the reconciler stop itself.
        sleep(Duration::from_millis(100)).await;
        assert!(!coordinator.proximity_reconciler.is_running().await);
    }

    #[tokio::test]
    async fn test_monitoring_denied_without_alerts_stays_silent() {
        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher.expect_dispatch_monitoring_unavailable().never();

        let coordinator = create_test_coordinator(
            Arc::new(MemoryAlertStore::new()),
            dispatcher,
            MockGeofenceGateway::new(),
        );

        let removed = coordinator.handle_monitoring_denied().await;
        assert!(removed.is_empty());
    }
}
