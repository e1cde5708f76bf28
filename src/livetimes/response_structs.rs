//! Response structures for the live departures API.
//!
//! This module contains structures for deserializing JSON responses from
//! the bus times server.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::livetimes::structs::LiveDeparture;

/// Response from `/api/v1/departures?stops={codes}&max={n}`.
///
/// The server groups departures by stop code. Stops it does not know, or
/// that have no upcoming departures, are simply absent from the map.
#[derive(Deserialize, Debug)]
pub struct DeparturesResponse {
    /// Upcoming departures keyed by stop code.
    pub stops: HashMap<String, Vec<DepartureRecord>>,
}

/// A single departure entry as returned by the server.
#[derive(Deserialize, Debug)]
pub struct DepartureRecord {
    /// Name of the service.
    pub service: String,
    /// Destination shown on the vehicle.
    pub destination: String,
    /// Minutes until departure.
    pub minutes: u32,
}

impl fmt::Display for DepartureRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "service={}, destination={}, minutes={}",
            self.service, self.destination, self.minutes
        )
    }
}

impl From<DepartureRecord> for LiveDeparture {
    fn from(record: DepartureRecord) -> Self {
        LiveDeparture {
            service: record.service,
            destination: record.destination,
            minutes: record.minutes,
        }
    }
}
