//! Geofence registration for proximity alerts.
//!
//! This module defines the [`GeofenceGateway`] trait through which proximity
//! monitoring arms and disarms circular regions, and a software backend that
//! evaluates location reports in-process. The gateway only owns region
//! registration. Deciding what an entered region means is left to the alert
//! layer, which reacts to the [`AlertId`] carried by each event.
//!
//! # Modules
//!
//! - `software` - In-process backend matching location reports against regions

mod software;

use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

use crate::alerts::AlertId;
use crate::stops::StopLocation;

pub use crate::geofence::software::SoftwareGeofenceGateway;

/// Errors that can occur while talking to a geofencing backend.
#[derive(Debug, Error)]
pub enum GeofenceError {
    /// The backend is not usable right now.
    #[error("geofencing backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the registration.
    #[error("geofence registration rejected: {0}")]
    Rejected(String),
}

/// Trait for arming and disarming geofences.
///
/// This trait abstracts the backend so the alert layer never depends on how
/// regions are actually watched. The software backend in this crate matches
/// location reports itself; a platform backend would delegate to an OS
/// geofencing service instead.
#[automock]
#[async_trait]
pub trait GeofenceGateway: Send + Sync {
    /// Arms a circular region around `location` tagged with `id`.
    ///
    /// Arming an id that is already armed replaces the existing region.
    /// The region expires on its own after `lifetime`.
    async fn arm(
        &self,
        id: AlertId,
        location: StopLocation,
        radius_meters: f64,
        lifetime: Duration,
    ) -> Result<(), GeofenceError>;

    /// Disarms the region tagged with `id`.
    ///
    /// Disarming an unknown id is a no-op, so callers can always disarm
    /// without checking whether a region is still registered.
    async fn disarm(&self, id: AlertId) -> Result<(), GeofenceError>;
}
