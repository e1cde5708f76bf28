//! Data structures representing live departure board entries.
//!
//! This module defines the core structure used internally to represent a
//! single upcoming departure from a stop.

use std::fmt;

/// An upcoming departure of a service from a stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveDeparture {
    /// Name of the service, e.g. `"25"` or `"X12"`
    pub service: String,
    /// Destination shown on the vehicle
    pub destination: String,
    /// Minutes until the vehicle departs
    ///
    /// A value of 0 means the vehicle is due now
    pub minutes: u32,
}

impl fmt::Display for LiveDeparture {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "service={}, destination={}, minutes={}",
            self.service, self.destination, self.minutes
        )
    }
}
