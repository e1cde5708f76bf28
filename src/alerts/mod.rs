//! Alert tracking for transit stops.
//!
//! This module provides the alert subsystem of the daemon: users register
//! alerts for a stop, background monitors evaluate them, and each satisfied
//! alert produces exactly one notification before it is deleted. Two alert
//! kinds exist:
//!
//! - [`ArrivalAlert`]: fires when a watched service is due at the stop
//!   within a number of minutes, evaluated by polling live departures
//! - [`ProximityAlert`]: fires when the user enters a radius around the
//!   stop, evaluated through geofences armed with a gateway
//!
//! # Architecture
//!
//! The [`AlertStore`] is the single source of truth. The
//! [`AlertsCoordinator`] writes alerts into it and makes sure a monitor
//! runs whenever alerts of its kind exist. The [`ArrivalAlertMonitor`]
//! polls departure boards for arrival alerts; the
//! [`ProximityAlertReconciler`] mirrors proximity alerts into armed
//! geofences and the [`AreaEnteredHandler`] consumes the entered events
//! the gateway sends back. Both monitors watch the store's change streams
//! and stop themselves when nothing is left for them to do. Alerts older
//! than an hour expire inside the store, which the monitors observe like
//! any other removal.
//!
//! # Example Usage
//!
//! ```no_run
//! use buswatch::alerts::{AlertLoader, MemoryAlertStore};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! // Restore alerts persisted by a previous run
//! let loader = AlertLoader::new("alerts.json".to_string());
//! let store = Arc::new(MemoryAlertStore::with_loader(loader).await);
//!
//! // Keep persisting them periodically
//! store.start_persistence_task();
//! # }
//! ```

mod alert;
mod alert_loader;
mod area_entered;
mod arrival_monitor;
mod coordinator;
mod proximity_reconciler;
mod store;

pub use crate::alerts::alert::{ALERT_EXPIRY_MINUTES, AlertId, ArrivalAlert, ProximityAlert};
pub use crate::alerts::alert_loader::{AlertLoader, PersistedAlerts};
pub use crate::alerts::area_entered::AreaEnteredHandler;
pub use crate::alerts::arrival_monitor::ArrivalAlertMonitor;
pub use crate::alerts::coordinator::AlertsCoordinator;
pub use crate::alerts::proximity_reconciler::ProximityAlertReconciler;
pub use crate::alerts::store::{AlertStore, MemoryAlertStore, MockAlertStore};
