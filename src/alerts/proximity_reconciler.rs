//! Proximity alert reconciliation against the geofence gateway.
//!
//! This module provides the [`ProximityAlertReconciler`] which keeps the set
//! of armed geofences aligned with the proximity alerts in the store. It
//! runs as a single task, re-reads the store whenever the proximity set
//! changes, and arms or disarms only the difference.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::alerts::alert::ProximityAlert;
use crate::alerts::store::AlertStore;
use crate::alerts::AlertId;
use crate::geofence::GeofenceGateway;
use crate::stops::StopLocationResolver;

/// Keeps armed geofences in sync with the stored proximity alerts.
///
/// Each reconciliation pass reads the full proximity set, compares it to
/// the set tracked by previous passes, arms the missing regions and disarms
/// the stale ones. Passes are driven by the store's change stream. Bursts of
/// changes coalesce into a single pass over the latest state.
///
/// The tracked set always mirrors the store as read at the start of a pass,
/// including alerts whose geofence could not be armed. A later pass only
/// touches an alert again once the store itself changed it.
pub struct ProximityAlertReconciler<S: AlertStore, R: StopLocationResolver, G: GeofenceGateway> {
    /// Store holding the alerts to mirror
    store: Arc<S>,
    /// Resolver turning stop codes into coordinates
    stop_resolver: Arc<R>,
    /// Gateway owning the armed regions
    gateway: Arc<G>,
    /// Alert ids covered by previous passes
    tracked: Mutex<HashSet<AlertId>>,
    /// Handle of the running reconciliation task, if any
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S, R, G> ProximityAlertReconciler<S, R, G>
where
    S: AlertStore + 'static,
    R: StopLocationResolver + 'static,
    G: GeofenceGateway + 'static,
{
    /// Create a new [ProximityAlertReconciler]. Nothing runs until
    /// [`Self::start`] is called.
    pub fn new(store: Arc<S>, stop_resolver: Arc<R>, gateway: Arc<G>) -> Self {
        ProximityAlertReconciler {
            store,
            stop_resolver,
            gateway,
            tracked: Mutex::new(HashSet::new()),
            task: Mutex::new(None),
        }
    }

    /// Starts the reconciliation task if it is not already running.
    ///
    /// A handle of a task that stopped on its own counts as not running,
    /// so calling this again later restarts reconciliation.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("proximity reconciler already running");
            return;
        }

        let reconciler = Arc::clone(self);
        *task = Some(tokio::spawn(async move { reconciler.run().await }));
    }

    /// Stops the reconciliation task. Calling this when nothing runs is a
    /// no-op. Armed geofences are left in place; they expire on their own.
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            info!("stopped proximity alert reconciler");
        }
    }

    /// Whether the reconciliation task is currently running.
    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Runs reconciliation passes until no proximity alerts remain.
    async fn run(&self) {
        let mut changes = self.store.proximity_alert_changes();
        info!("proximity alert reconciler started");

        loop {
            self.reconcile_once().await;

            if self.tracked.lock().await.is_empty() {
                if self.try_finish(&mut changes).await {
                    return;
                }
                // A change arrived while stopping, reconcile again.
                continue;
            }

            if changes.changed().await.is_err() {
                debug!("proximity change stream closed, stopping reconciler");
                return;
            }
        }
    }

    /// Decides under the task guard whether the reconciler may stop.
    ///
    /// An alert can be added between a pass leaving the tracked set empty
    /// and the task actually returning, with [`Self::start`] still seeing
    /// an unfinished handle and not spawning a replacement. Checking for
    /// unseen change signals while holding the guard closes that window:
    /// either the late change is visible here and another pass runs, or
    /// it is published afterwards and finds the handle already cleared.
    async fn try_finish(&self, changes: &mut watch::Receiver<u64>) -> bool {
        let mut task = self.task.lock().await;

        if changes.has_changed().unwrap_or(false) {
            changes.borrow_and_update();
            debug!("proximity alerts changed while stopping, reconciling again");
            return false;
        }

        info!("no proximity alerts left to track, stopping reconciler");
        *task = None;
        true
    }

    /// Runs a single reconciliation pass.
    async fn reconcile_once(&self) {
        let fetched: HashMap<AlertId, ProximityAlert> = self
            .store
            .proximity_alerts()
            .await
            .into_iter()
            .map(|alert| (alert.id, alert))
            .collect();

        let (to_arm, to_disarm) = {
            let mut tracked = self.tracked.lock().await;

            let to_arm: Vec<ProximityAlert> = fetched
                .values()
                .filter(|alert| !tracked.contains(&alert.id))
                .cloned()
                .collect();
            let to_disarm: Vec<AlertId> = tracked
                .iter()
                .filter(|id| !fetched.contains_key(id))
                .copied()
                .collect();

            // The tracked set is replaced before any gateway call.
            *tracked = fetched.keys().copied().collect();

            (to_arm, to_disarm)
        };

        if to_arm.is_empty() && to_disarm.is_empty() {
            debug!("reconciliation pass found nothing to change");
            return;
        }

        debug!(
            "reconciliation pass: {} region(s) to arm, {} to disarm",
            to_arm.len(),
            to_disarm.len()
        );

        // Gateway calls are independent and best-effort.
        join_all(to_arm.iter().map(|alert| self.arm_alert(alert))).await;
        join_all(to_disarm.iter().map(|id| self.disarm_alert(*id))).await;
    }

    /// Arms the geofence for `alert`, skipping stops without a known
    /// location and alerts that expired since they were read.
    async fn arm_alert(&self, alert: &ProximityAlert) {
        let Some(location) = self.stop_resolver.stop_location(&alert.stop_code).await else {
            warn!(
                "no location known for stop {}, leaving alert {} unarmed",
                alert.stop_code, alert.id
            );
            return;
        };

        let Some(remaining) = alert.remaining_duration(Utc::now()) else {
            debug!("alert {} expired before arming, skipping", alert.id);
            return;
        };

        if let Err(e) = self
            .gateway
            .arm(alert.id, location, alert.radius_meters, remaining)
            .await
        {
            error!(
                "failed to arm geofence of alert {} at stop {}: {}",
                alert.id, alert.stop_code, e
            );
        }
    }

    async fn disarm_alert(&self, id: AlertId) {
        if let Err(e) = self.gateway.disarm(id).await {
            error!("failed to disarm geofence of alert {}: {}", id, e);
        }
    }
}

impl<S: AlertStore, R: StopLocationResolver, G: GeofenceGateway> Drop
    for ProximityAlertReconciler<S, R, G>
{
    fn drop(&mut self) {
        // Test runtimes drop the reconciler without calling stop().
        if let Ok(mut task) = self.task.try_lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::store::MemoryAlertStore;
    use crate::geofence::{GeofenceError, MockGeofenceGateway};
    use crate::stops::{MockStopLocationResolver, StopLocation};
    use std::time::Duration;
    use tokio::time::sleep;

    const STOP: StopLocation = StopLocation {
        latitude: -43.552,
        longitude: 172.635,
    };

    fn resolver_for(stops: &[&str]) -> MockStopLocationResolver {
        let mut resolver = MockStopLocationResolver::new();
        for stop in stops {
            let stop = stop.to_string();
            resolver
                .expect_stop_location()
                .withf(move |code: &str| code == stop)
                .times(1)
                .returning(|_| Some(STOP));
        }
        resolver
    }

    #[tokio::test]
    async fn test_first_pass_arms_every_alert() {
        let a1 = ProximityAlert::new("6100231", 250.0);
        let a2 = ProximityAlert::new("6100232", 400.0);

        let store = Arc::new(MemoryAlertStore::new());
        store.add_proximity_alert(a1.clone()).await;
        store.add_proximity_alert(a2.clone()).await;

        let resolver = resolver_for(&["6100231", "6100232"]);

        let mut gateway = MockGeofenceGateway::new();
        gateway
            .expect_arm()
            .withf(move |_, _, radius: &f64, lifetime: &Duration| {
                (*radius == 250.0 || *radius == 400.0) && *lifetime <= Duration::from_secs(60 * 60)
            })
            .times(2)
            .returning(|_, _, _, _| Ok(()));

        let reconciler = ProximityAlertReconciler::new(store, Arc::new(resolver), Arc::new(gateway));
        reconciler.reconcile_once().await;

        let tracked = reconciler.tracked.lock().await;
        assert_eq!(*tracked, HashSet::from([a1.id, a2.id]));
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let alert = ProximityAlert::new("6100231", 250.0);

        let store = Arc::new(MemoryAlertStore::new());
        store.add_proximity_alert(alert).await;

        let resolver = resolver_for(&["6100231"]);

        let mut gateway = MockGeofenceGateway::new();
        gateway.expect_arm().times(1).returning(|_, _, _, _| Ok(()));
        gateway.expect_disarm().never();

        let reconciler = ProximityAlertReconciler::new(store, Arc::new(resolver), Arc::new(gateway));

        // A second pass over an unchanged store touches nothing.
        reconciler.reconcile_once().await;
        reconciler.reconcile_once().await;
    }

    #[tokio::test]
    async fn test_reconcile_applies_diff_only() {
        let a1 = ProximityAlert::new("6100231", 250.0);
        let a2 = ProximityAlert::new("6100232", 300.0);
        let a3 = ProximityAlert::new("6100233", 400.0);
        let a1_id = a1.id;
        let a3_id = a3.id;

        let store = Arc::new(MemoryAlertStore::new());
        store.add_proximity_alert(a1.clone()).await;
        store.add_proximity_alert(a2.clone()).await;

        let resolver = resolver_for(&["6100231", "6100232", "6100233"]);

        let mut gateway = MockGeofenceGateway::new();
        gateway.expect_arm().times(3).returning(|_, _, _, _| Ok(()));
        gateway
            .expect_disarm()
            .withf(move |id: &AlertId| *id == a1_id)
            .times(1)
            .returning(|_| Ok(()));

        let reconciler =
            ProximityAlertReconciler::new(Arc::clone(&store), Arc::new(resolver), Arc::new(gateway));
        reconciler.reconcile_once().await;

        // One alert leaves, another joins.
        store.remove_proximity_alert(a1_id).await;
        store.add_proximity_alert(a3.clone()).await;
        reconciler.reconcile_once().await;

        let tracked = reconciler.tracked.lock().await;
        assert_eq!(*tracked, HashSet::from([a2.id, a3_id]));
    }

    #[tokio::test]
    async fn test_unresolvable_stop_stays_tracked_without_arming() {
        let known = ProximityAlert::new("6100231", 250.0);
        let unknown = ProximityAlert::new("9999999", 300.0);
        let known_id = known.id;

        let store = Arc::new(MemoryAlertStore::new());
        store.add_proximity_alert(known.clone()).await;
        store.add_proximity_alert(unknown.clone()).await;

        let mut resolver = MockStopLocationResolver::new();
        resolver
            .expect_stop_location()
            .withf(|code: &str| code == "6100231")
            .times(1)
            .returning(|_| Some(STOP));
        resolver
            .expect_stop_location()
            .withf(|code: &str| code == "9999999")
            .times(1)
            .returning(|_| None);

        let mut gateway = MockGeofenceGateway::new();
        gateway
            .expect_arm()
            .withf(move |id: &AlertId, _, _, _| *id == known_id)
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let reconciler = ProximityAlertReconciler::new(store, Arc::new(resolver), Arc::new(gateway));
        reconciler.reconcile_once().await;

        // Both alerts count as tracked, armed or not.
        let tracked = reconciler.tracked.lock().await;
        assert_eq!(*tracked, HashSet::from([known_id, unknown.id]));
    }

    #[tokio::test]
    async fn test_arm_failure_keeps_alert_tracked() {
        let alert = ProximityAlert::new("6100231", 250.0);
        let id = alert.id;

        let store = Arc::new(MemoryAlertStore::new());
        store.add_proximity_alert(alert).await;

        let resolver = resolver_for(&["6100231"]);

        let mut gateway = MockGeofenceGateway::new();
        gateway.expect_arm().times(1).returning(|_, _, _, _| {
            Err(GeofenceError::Rejected("region limit reached".to_string()))
        });

        let reconciler = ProximityAlertReconciler::new(store, Arc::new(resolver), Arc::new(gateway));
        reconciler.reconcile_once().await;

        let tracked = reconciler.tracked.lock().await;
        assert!(tracked.contains(&id));
    }

    #[tokio::test]
    async fn test_expired_alert_is_not_armed() {
        let mut alert = ProximityAlert::new("6100231", 250.0);
        alert.created_at = Utc::now() - chrono::Duration::minutes(61);

        let resolver = resolver_for(&["6100231"]);

        let mut gateway = MockGeofenceGateway::new();
        gateway.expect_arm().never();

        let reconciler = ProximityAlertReconciler::new(
            Arc::new(MemoryAlertStore::new()),
            Arc::new(resolver),
            Arc::new(gateway),
        );
        reconciler.arm_alert(&alert).await;
    }

    #[tokio::test]
    async fn test_run_self_stops_when_store_empties() {
        let alert = ProximityAlert::new("6100231", 250.0);
        let id = alert.id;

        let store = Arc::new(MemoryAlertStore::new());
        store.add_proximity_alert(alert).await;

        let resolver = resolver_for(&["6100231"]);

        let mut gateway = MockGeofenceGateway::new();
        gateway.expect_arm().times(1).returning(|_, _, _, _| Ok(()));
        gateway
            .expect_disarm()
            .withf(move |disarmed: &AlertId| *disarmed == id)
            .times(1)
            .returning(|_| Ok(()));

        let reconciler = Arc::new(ProximityAlertReconciler::new(
            Arc::clone(&store),
            Arc::new(resolver),
            Arc::new(gateway),
        ));
        reconciler.start().await;

        sleep(Duration::from_millis(100)).await;
        assert!(reconciler.is_running().await);

        store.remove_proximity_alert(id).await;
        sleep(Duration::from_millis(100)).await;

        assert!(!reconciler.is_running().await);
    }

    #[tokio::test]
    async fn test_start_twice_is_a_noop() {
        let alert = ProximityAlert::new("6100231", 250.0);

        let store = Arc::new(MemoryAlertStore::new());
        store.add_proximity_alert(alert).await;

        let resolver = resolver_for(&["6100231"]);

        let mut gateway = MockGeofenceGateway::new();
        gateway.expect_arm().times(1).returning(|_, _, _, _| Ok(()));

        let reconciler = Arc::new(ProximityAlertReconciler::new(
            store,
            Arc::new(resolver),
            Arc::new(gateway),
        ));
        reconciler.start().await;
        reconciler.start().await;

        sleep(Duration::from_millis(100)).await;
        assert!(reconciler.is_running().await);

        reconciler.stop().await;
    }

    #[tokio::test]
    async fn test_try_finish_detects_change_while_stopping() {
        let store = Arc::new(MemoryAlertStore::new());
        let reconciler = ProximityAlertReconciler::new(
            Arc::clone(&store),
            Arc::new(MockStopLocationResolver::new()),
            Arc::new(MockGeofenceGateway::new()),
        );
        let mut changes = store.proximity_alert_changes();

        // Nothing changed since subscribing, stopping is allowed.
        assert!(reconciler.try_finish(&mut changes).await);

        // An alert added while stopping forces another pass.
        store
            .add_proximity_alert(ProximityAlert::new("6100231", 250.0))
            .await;
        assert!(!reconciler.try_finish(&mut changes).await);
    }

    #[tokio::test]
    async fn test_alert_added_right_after_last_removal_is_still_armed() {
        let first = ProximityAlert::new("6100231", 250.0);
        let second = ProximityAlert::new("6100232", 300.0);
        let first_id = first.id;
        let second_id = second.id;

        let store = Arc::new(MemoryAlertStore::new());
        store.add_proximity_alert(first).await;

        let resolver = resolver_for(&["6100231", "6100232"]);

        let mut gateway = MockGeofenceGateway::new();
        gateway.expect_arm().times(2).returning(|_, _, _, _| Ok(()));
        gateway
            .expect_disarm()
            .withf(move |id: &AlertId| *id == first_id)
            .times(1)
            .returning(|_| Ok(()));

        let reconciler = Arc::new(ProximityAlertReconciler::new(
            Arc::clone(&store),
            Arc::new(resolver),
            Arc::new(gateway),
        ));
        reconciler.start().await;
        sleep(Duration::from_millis(100)).await;

        // The last alert disappears and a new one follows immediately,
        // while the running task may be about to stop.
        store.remove_proximity_alert(first_id).await;
        store.add_proximity_alert(second.clone()).await;
        reconciler.start().await;

        sleep(Duration::from_millis(200)).await;

        assert!(reconciler.is_running().await);
        let tracked = reconciler.tracked.lock().await;
        assert_eq!(*tracked, HashSet::from([second_id]));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let reconciler = Arc::new(ProximityAlertReconciler::new(
            Arc::new(MemoryAlertStore::new()),
            Arc::new(MockStopLocationResolver::new()),
            Arc::new(MockGeofenceGateway::new()),
        ));

        reconciler.stop().await;
        reconciler.stop().await;

        assert!(!reconciler.is_running().await);
    }
}
