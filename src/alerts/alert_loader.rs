//! Alert persistence layer for loading and saving alerts to disk.
//!
//! This module provides the [`AlertLoader`] for persisting alerts between
//! daemon restarts. Alerts are serialized to JSON and stored in a file.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::alerts::alert::{ArrivalAlert, ProximityAlert};

/// Snapshot of all active alerts, as written to and read from disk.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersistedAlerts {
    /// Active arrival alerts.
    pub arrival: Vec<ArrivalAlert>,
    /// Active proximity alerts.
    pub proximity: Vec<ProximityAlert>,
}

/// Handles loading and persisting alerts to disk.
///
/// The `AlertLoader` manages serialization and deserialization of the alert
/// snapshot, providing fault-tolerant file I/O. If loading fails (file
/// missing or corrupted), it gracefully returns an empty snapshot rather
/// than panicking.
///
/// # Examples
///
/// ```no_run
/// use buswatch::alerts::AlertLoader;
///
/// # async fn example() {
/// let loader = AlertLoader::new("alerts.json".to_string());
///
/// // Load existing alerts or get an empty snapshot
/// let alerts = loader.load().await;
///
/// // Later, persist the alerts
/// loader.persist(&alerts).await;
/// # }
/// ```
#[derive(Clone)]
pub struct AlertLoader {
    /// Path to the JSON file where alerts are stored.
    path: String,
}

impl AlertLoader {
    /// Creates a new `AlertLoader` for the specified file path.
    pub fn new(path: String) -> Self {
        AlertLoader { path }
    }

    /// Loads the alert snapshot from disk.
    ///
    /// # Error Handling
    ///
    /// - If the file doesn't exist: logs a warning and returns an empty snapshot
    /// - If deserialization fails: logs an error and returns an empty snapshot
    ///
    /// This ensures the daemon can always start, even with corrupted or
    /// missing alert data.
    pub async fn load(&self) -> PersistedAlerts {
        let Ok(serialized) = fs::read_to_string(&self.path).await else {
            warn!("no persisted alerts found, starting with an empty store");
            return PersistedAlerts::default();
        };

        let Ok(alerts) = serde_json::from_str::<PersistedAlerts>(&serialized) else {
            error!("failed to deserialize persisted alerts, starting with an empty store");
            return PersistedAlerts::default();
        };

        info!(
            "loaded {} arrival and {} proximity persisted alerts",
            alerts.arrival.len(),
            alerts.proximity.len()
        );

        alerts
    }

    /// Persists the alert snapshot to disk.
    ///
    /// # Error Handling
    ///
    /// - If serialization fails: logs an error and returns without writing
    /// - If the file write fails: logs an error with details
    ///
    /// Errors are logged but not propagated, allowing the daemon to continue
    /// operating even if persistence fails.
    pub async fn persist(&self, alerts: &PersistedAlerts) {
        let serialized = match serde_json::to_string(alerts) {
            Ok(serialized) => serialized,
            Err(e) => {
                error!("failed to serialize alerts: {}", e);
                return;
            }
        };

        if let Err(e) = fs::write(&self.path, &serialized).await {
            error!("failed to persist alerts: {}", e);
            return;
        }

        info!("persisted alerts");
    }
}
