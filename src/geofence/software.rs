//! In-process geofencing backend.
//!
//! This module provides the [`SoftwareGeofenceGateway`], a backend that keeps
//! armed regions in memory and matches location reports against them. It is
//! the default backend on hosts without an OS geofencing service.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::{Mutex, mpsc};

use crate::alerts::AlertId;
use crate::geofence::{GeofenceError, GeofenceGateway};
use crate::stops::StopLocation;

/// Mean Earth radius in meters, used by the haversine distance.
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// An armed circular region.
struct ArmedRegion {
    center: StopLocation,
    radius_meters: f64,
    expires_at: Instant,
}

/// Geofencing backend that evaluates location reports in-process.
///
/// Locations are fed in through [`SoftwareGeofenceGateway::report_location`].
/// When a report falls inside an armed region, the region is removed and its
/// [`AlertId`] is sent on the channel handed to the constructor. A region
/// therefore fires at most once.
pub struct SoftwareGeofenceGateway {
    regions: Mutex<HashMap<AlertId, ArmedRegion>>,
    entered_tx: mpsc::Sender<AlertId>,
}

impl SoftwareGeofenceGateway {
    /// Creates a gateway that reports entered regions on `entered_tx`.
    pub fn new(entered_tx: mpsc::Sender<AlertId>) -> Self {
        SoftwareGeofenceGateway {
            regions: Mutex::new(HashMap::new()),
            entered_tx,
        }
    }

    /// Matches a location report against the armed regions.
    ///
    /// Every region containing the reported position is removed and its id
    /// is published as an entered event. Expired regions are dropped without
    /// firing.
    pub async fn report_location(&self, latitude: f64, longitude: f64) {
        let entered: Vec<AlertId> = {
            let mut regions = self.regions.lock().await;
            let now = Instant::now();

            regions.retain(|id, region| {
                if region.expires_at <= now {
                    debug!("geofence for alert {} expired, dropping it", id);
                    return false;
                }
                true
            });

            let entered: Vec<AlertId> = regions
                .iter()
                .filter(|(_, region)| {
                    haversine_distance(
                        latitude,
                        longitude,
                        region.center.latitude,
                        region.center.longitude,
                    ) <= region.radius_meters
                })
                .map(|(id, _)| *id)
                .collect();

            for id in &entered {
                regions.remove(id);
            }

            entered
        };

        for id in entered {
            info!("location report entered geofence of alert {}", id);
            if self.entered_tx.send(id).await.is_err() {
                warn!("entered events channel closed, dropping event for alert {}", id);
            }
        }
    }

    /// Number of currently armed regions.
    pub async fn armed_count(&self) -> usize {
        self.regions.lock().await.len()
    }
}

#[async_trait]
impl GeofenceGateway for SoftwareGeofenceGateway {
    async fn arm(
        &self,
        id: AlertId,
        location: StopLocation,
        radius_meters: f64,
        lifetime: Duration,
    ) -> Result<(), GeofenceError> {
        let region = ArmedRegion {
            center: location,
            radius_meters,
            expires_at: Instant::now() + lifetime,
        };

        let replaced = self.regions.lock().await.insert(id, region).is_some();
        if replaced {
            debug!("replaced armed geofence for alert {}", id);
        } else {
            info!(
                "armed geofence for alert {} with radius {}m",
                id, radius_meters
            );
        }

        Ok(())
    }

    async fn disarm(&self, id: AlertId) -> Result<(), GeofenceError> {
        if self.regions.lock().await.remove(&id).is_some() {
            info!("disarmed geofence for alert {}", id);
        } else {
            debug!("no geofence armed for alert {}, nothing to disarm", id);
        }

        Ok(())
    }
}

/// Great-circle distance in meters between two coordinates.
fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);

    EARTH_RADIUS_METERS * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}
