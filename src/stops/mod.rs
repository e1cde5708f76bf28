//! Stop metadata and location lookup.
//!
//! This module provides the stop catalogue loaded at startup and the
//! [`StopLocationResolver`] trait used by proximity monitoring to turn a
//! stop code into coordinates.
//!
//! # Modules
//!
//! - `catalogue` - File backed stop catalogue and location resolution

mod catalogue;

use async_trait::async_trait;
use mockall::automock;

pub use crate::stops::catalogue::{StopCatalogue, StopRecord};

/// Geographic position of a stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopLocation {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

/// Trait for resolving a stop code to its location.
///
/// This trait abstracts the catalogue lookup for easier testing with mocks.
#[automock]
#[async_trait]
pub trait StopLocationResolver: Send + Sync {
    /// Returns the location of `stop_code`, or `None` if the stop is unknown.
    async fn stop_location(&self, stop_code: &str) -> Option<StopLocation>;
}
