//! Alert types for transit stop monitoring.
//!
//! This module provides the two alert kinds the daemon tracks: [`ArrivalAlert`]
//! for "tell me when my bus is close in time" and [`ProximityAlert`] for
//! "tell me when I am close in space". Both carry an [`AlertId`] used as the
//! handle for storage, geofence registration and notification dispatch.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How long an alert stays active before it is considered stale.
///
/// Live departure boards only make sense on the scale of a single trip, so
/// alerts that were never satisfied are dropped after this window instead of
/// polling forever.
pub const ALERT_EXPIRY_MINUTES: i64 = 60;

/// Unique identifier shared by both alert kinds.
///
/// The identifier follows an alert across every subsystem: the store keys on
/// it, geofence registrations are tagged with it, and area-entered events
/// report it back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(Uuid);

impl AlertId {
    /// Generates a new random identifier.
    pub fn new() -> Self {
        AlertId(Uuid::new_v4())
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An alert that fires when one of the watched services is due to depart
/// from a stop within the configured number of minutes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalAlert {
    /// Identifier assigned when the alert was created.
    pub id: AlertId,
    /// Code of the stop whose departure board is watched.
    pub stop_code: String,
    /// Service names the alert watches, e.g. `"25"` or `"X12"`.
    ///
    /// Must contain at least one service. An empty set can never be
    /// satisfied and the alert would sit in the store until it expires.
    pub services: HashSet<String>,
    /// The alert fires once a watched service departs in at most this many
    /// minutes.
    pub time_trigger: u32,
    /// Creation time, used to expire the alert.
    pub created_at: DateTime<Utc>,
}

impl ArrivalAlert {
    /// Creates an arrival alert for `stop_code` watching the given services.
    pub fn new(
        stop_code: &str,
        services: impl IntoIterator<Item = impl Into<String>>,
        time_trigger: u32,
    ) -> Self {
        ArrivalAlert {
            id: AlertId::new(),
            stop_code: stop_code.to_string(),
            services: services.into_iter().map(Into::into).collect(),
            time_trigger,
            created_at: Utc::now(),
        }
    }

    /// Whether the alert has outlived [`ALERT_EXPIRY_MINUTES`] at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= expires_at(self.created_at)
    }
}

/// An alert that fires when the user enters a circle around a stop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProximityAlert {
    /// Identifier assigned when the alert was created.
    pub id: AlertId,
    /// Code of the stop at the centre of the watched circle.
    pub stop_code: String,
    /// Radius of the watched circle in meters.
    pub radius_meters: f64,
    /// Creation time, used to expire the alert.
    pub created_at: DateTime<Utc>,
}

impl ProximityAlert {
    /// Creates a proximity alert around `stop_code` with the given radius.
    pub fn new(stop_code: &str, radius_meters: f64) -> Self {
        ProximityAlert {
            id: AlertId::new(),
            stop_code: stop_code.to_string(),
            radius_meters,
            created_at: Utc::now(),
        }
    }

    /// Whether the alert has outlived [`ALERT_EXPIRY_MINUTES`] at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= expires_at(self.created_at)
    }

    /// Time left until the alert expires, or `None` if it already has.
    ///
    /// Geofences are registered with this as their lifetime so a fence never
    /// outlives the alert it belongs to.
    pub fn remaining_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        (expires_at(self.created_at) - now)
            .to_std()
            .ok()
            .filter(|remaining| !remaining.is_zero())
    }
}

fn expires_at(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + chrono::Duration::minutes(ALERT_EXPIRY_MINUTES)
}
