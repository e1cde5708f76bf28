//! Shared alert store backing every monitoring component.
//!
//! This module provides the [`AlertStore`] trait and its in-memory
//! implementation [`MemoryAlertStore`]. The store is the single source of
//! truth for active alerts: monitors read it, user-facing operations write
//! it, and change streams derived from it drive monitor start and stop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use mockall::automock;
use tokio::sync::{RwLock, watch};
use tokio::time;

use crate::alerts::alert_loader::{AlertLoader, PersistedAlerts};
use crate::alerts::{AlertId, ArrivalAlert, ProximityAlert};

/// Interval in seconds between automatic alert persistence operations.
const SAVE_INTERVAL_SECS: u64 = 60; // 1 minute

/// Trait for storing and observing active alerts.
///
/// Every read purges expired alerts first, so callers never see an alert
/// older than the expiry window. Changes are published on watch channels:
/// the arrival side publishes the current alert count, the proximity side
/// publishes a revision counter that bumps on every change. Watch channels
/// coalesce, so a burst of changes may be observed as a single wakeup with
/// the latest state.
#[automock]
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Adds an arrival alert.
    async fn add_arrival_alert(&self, alert: ArrivalAlert);

    /// Removes the arrival alert with `id`. Unknown ids are ignored.
    async fn remove_arrival_alert(&self, id: AlertId);

    /// Removes every arrival alert watching `stop_code`.
    async fn remove_arrival_alerts_for_stop(&self, stop_code: &str);

    /// Removes every arrival alert.
    async fn remove_all_arrival_alerts(&self);

    /// Returns all active arrival alerts.
    async fn arrival_alerts(&self) -> Vec<ArrivalAlert>;

    /// Returns the distinct stop codes watched by arrival alerts.
    async fn arrival_alert_stops(&self) -> HashSet<String>;

    /// Returns the number of active arrival alerts.
    async fn arrival_alert_count(&self) -> usize;

    /// Stream of arrival alert counts, updated after every change.
    fn arrival_alert_count_changes(&self) -> watch::Receiver<usize>;

    /// Adds a proximity alert.
    async fn add_proximity_alert(&self, alert: ProximityAlert);

    /// Removes the proximity alert with `id`. Unknown ids are ignored.
    async fn remove_proximity_alert(&self, id: AlertId);

    /// Removes every proximity alert watching `stop_code`.
    async fn remove_proximity_alerts_for_stop(&self, stop_code: &str);

    /// Removes every proximity alert and returns them.
    async fn remove_all_proximity_alerts(&self) -> Vec<ProximityAlert>;

    /// Returns the proximity alert with `id`, if it is still active.
    async fn proximity_alert(&self, id: AlertId) -> Option<ProximityAlert>;

    /// Returns all active proximity alerts.
    async fn proximity_alerts(&self) -> Vec<ProximityAlert>;

    /// Returns the number of active proximity alerts.
    async fn proximity_alert_count(&self) -> usize;

    /// Stream of proximity set revisions, bumped after every change.
    fn proximity_alert_changes(&self) -> watch::Receiver<u64>;
}

/// Current alert state, kept behind one lock so a purge and the operation
/// that triggered it are atomic.
#[derive(Default)]
struct AlertState {
    arrival: HashMap<AlertId, ArrivalAlert>,
    proximity: HashMap<AlertId, ProximityAlert>,
}

/// In-memory [`AlertStore`] with optional JSON persistence.
///
/// # Examples
///
/// ```no_run
/// use buswatch::alerts::{AlertLoader, MemoryAlertStore};
///
/// # async fn example() {
/// let loader = AlertLoader::new("alerts.json".to_string());
/// let store = MemoryAlertStore::with_loader(loader).await;
/// store.start_persistence_task();
/// # }
/// ```
pub struct MemoryAlertStore {
    /// Thread-safe reference to the alert state
    state: Arc<RwLock<AlertState>>,
    /// Loader used by the periodic persistence task, if configured
    loader: Option<AlertLoader>,
    /// Publishes the arrival alert count after every change
    arrival_count_tx: watch::Sender<usize>,
    /// Publishes a revision bump after every proximity set change
    proximity_rev_tx: watch::Sender<u64>,
}

impl MemoryAlertStore {
    /// Creates an empty store without persistence.
    pub fn new() -> Self {
        let (arrival_count_tx, _) = watch::channel(0);
        let (proximity_rev_tx, _) = watch::channel(0);

        MemoryAlertStore {
            state: Arc::new(RwLock::new(AlertState::default())),
            loader: None,
            arrival_count_tx,
            proximity_rev_tx,
        }
    }

    /// Creates a store restoring persisted alerts through `loader`.
    ///
    /// Alerts that expired while the daemon was down are dropped during the
    /// restore instead of surfacing on the first read.
    pub async fn with_loader(loader: AlertLoader) -> Self {
        let persisted = loader.load().await;

        let mut state = AlertState {
            arrival: persisted
                .arrival
                .into_iter()
                .map(|alert| (alert.id, alert))
                .collect(),
            proximity: persisted
                .proximity
                .into_iter()
                .map(|alert| (alert.id, alert))
                .collect(),
        };
        purge_expired(&mut state);

        let (arrival_count_tx, _) = watch::channel(state.arrival.len());
        let (proximity_rev_tx, _) = watch::channel(0);

        MemoryAlertStore {
            state: Arc::new(RwLock::new(state)),
            loader: Some(loader),
            arrival_count_tx,
            proximity_rev_tx,
        }
    }

    /// Starts a background task that periodically persists alerts to disk.
    ///
    /// Does nothing when the store was built without a loader. The task
    /// snapshots the state every [`SAVE_INTERVAL_SECS`] seconds and runs
    /// until the program exits.
    pub fn start_persistence_task(&self) {
        let Some(loader) = self.loader.clone() else {
            debug!("no alert loader configured, skipping persistence task");
            return;
        };
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(SAVE_INTERVAL_SECS));
            loop {
                interval.tick().await;
                let snapshot = {
                    let state = state.read().await;
                    PersistedAlerts {
                        arrival: state.arrival.values().cloned().collect(),
                        proximity: state.proximity.values().cloned().collect(),
                    }
                };
                loader.persist(&snapshot).await;
            }
        });
    }

    /// Republishes the watch channels from `state`.
    ///
    /// The arrival count only publishes when the count actually changed, so
    /// pure reads do not wake the arrival monitor.
    fn publish(&self, state: &AlertState, proximity_changed: bool) {
        self.arrival_count_tx.send_if_modified(|count| {
            let current = state.arrival.len();
            if *count == current {
                false
            } else {
                *count = current;
                true
            }
        });

        if proximity_changed {
            self.proximity_rev_tx.send_modify(|revision| *revision += 1);
        }
    }
}

impl Default for MemoryAlertStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Drops expired alerts from `state`. Returns whether the proximity set
/// changed; arrival changes surface through the published count instead.
fn purge_expired(state: &mut AlertState) -> bool {
    let now = Utc::now();

    state.arrival.retain(|id, alert| {
        if alert.is_expired(now) {
            info!("arrival alert {} expired, dropping it", id);
            return false;
        }
        true
    });

    let proximity_before = state.proximity.len();
    state.proximity.retain(|id, alert| {
        if alert.is_expired(now) {
            info!("proximity alert {} expired, dropping it", id);
            return false;
        }
        true
    });

    state.proximity.len() != proximity_before
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn add_arrival_alert(&self, alert: ArrivalAlert) {
        let mut state = self.state.write().await;
        let proximity_changed = purge_expired(&mut state);

        info!(
            "registered arrival alert {} for stop {} watching {:?} within {} minutes",
            alert.id, alert.stop_code, alert.services, alert.time_trigger
        );
        state.arrival.insert(alert.id, alert);

        self.publish(&state, proximity_changed);
    }

    async fn remove_arrival_alert(&self, id: AlertId) {
        let mut state = self.state.write().await;
        let proximity_changed = purge_expired(&mut state);

        if state.arrival.remove(&id).is_some() {
            info!("removed arrival alert {}", id);
        }

        self.publish(&state, proximity_changed);
    }

    async fn remove_arrival_alerts_for_stop(&self, stop_code: &str) {
        let mut state = self.state.write().await;
        let proximity_changed = purge_expired(&mut state);

        state.arrival.retain(|id, alert| {
            if alert.stop_code == stop_code {
                info!("removed arrival alert {} for stop {}", id, stop_code);
                return false;
            }
            true
        });

        self.publish(&state, proximity_changed);
    }

    async fn remove_all_arrival_alerts(&self) {
        let mut state = self.state.write().await;
        let proximity_changed = purge_expired(&mut state);

        if !state.arrival.is_empty() {
            info!("removed all {} arrival alerts", state.arrival.len());
            state.arrival.clear();
        }

        self.publish(&state, proximity_changed);
    }

    async fn arrival_alerts(&self) -> Vec<ArrivalAlert> {
        let mut state = self.state.write().await;
        let proximity_changed = purge_expired(&mut state);
        self.publish(&state, proximity_changed);

        state.arrival.values().cloned().collect()
    }

    async fn arrival_alert_stops(&self) -> HashSet<String> {
        let mut state = self.state.write().await;
        let proximity_changed = purge_expired(&mut state);
        self.publish(&state, proximity_changed);

        state
            .arrival
            .values()
            .map(|alert| alert.stop_code.clone())
            .collect()
    }

    async fn arrival_alert_count(&self) -> usize {
        let mut state = self.state.write().await;
        let proximity_changed = purge_expired(&mut state);
        self.publish(&state, proximity_changed);

        state.arrival.len()
    }

    fn arrival_alert_count_changes(&self) -> watch::Receiver<usize> {
        self.arrival_count_tx.subscribe()
    }

    async fn add_proximity_alert(&self, alert: ProximityAlert) {
        let mut state = self.state.write().await;
        purge_expired(&mut state);

        info!(
            "registered proximity alert {} for stop {} with radius {}m",
            alert.id, alert.stop_code, alert.radius_meters
        );
        state.proximity.insert(alert.id, alert);

        self.publish(&state, true);
    }

    async fn remove_proximity_alert(&self, id: AlertId) {
        let mut state = self.state.write().await;
        let mut proximity_changed = purge_expired(&mut state);

        if state.proximity.remove(&id).is_some() {
            info!("removed proximity alert {}", id);
            proximity_changed = true;
        }

        self.publish(&state, proximity_changed);
    }

    async fn remove_proximity_alerts_for_stop(&self, stop_code: &str) {
        let mut state = self.state.write().await;
        let mut proximity_changed = purge_expired(&mut state);

        let before = state.proximity.len();
        state.proximity.retain(|id, alert| {
            if alert.stop_code == stop_code {
                info!("removed proximity alert {} for stop {}", id, stop_code);
                return false;
            }
            true
        });
        proximity_changed |= state.proximity.len() != before;

        self.publish(&state, proximity_changed);
    }

    async fn remove_all_proximity_alerts(&self) -> Vec<ProximityAlert> {
        let mut state = self.state.write().await;
        purge_expired(&mut state);

        let removed: Vec<ProximityAlert> = state.proximity.drain().map(|(_, alert)| alert).collect();
        if !removed.is_empty() {
            info!("removed all {} proximity alerts", removed.len());
        }

        self.publish(&state, true);
        removed
    }

    async fn proximity_alert(&self, id: AlertId) -> Option<ProximityAlert> {
        let mut state = self.state.write().await;
        let proximity_changed = purge_expired(&mut state);
        self.publish(&state, proximity_changed);

        state.proximity.get(&id).cloned()
    }

    async fn proximity_alerts(&self) -> Vec<ProximityAlert> {
        let mut state = self.state.write().await;
        let proximity_changed = purge_expired(&mut state);
        self.publish(&state, proximity_changed);

        state.proximity.values().cloned().collect()
    }

    async fn proximity_alert_count(&self) -> usize {
        let mut state = self.state.write().await;
        let proximity_changed = purge_expired(&mut state);
        self.publish(&state, proximity_changed);

        state.proximity.len()
    }

    fn proximity_alert_changes(&self) -> watch::Receiver<u64> {
        self.proximity_rev_tx.subscribe()
    }
}
