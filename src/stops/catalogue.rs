//! File backed stop catalogue.
//!
//! This module provides the [`StopCatalogue`] struct holding the stops the
//! daemon knows about, loaded once at startup from a JSON file.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use log::info;
use serde::Deserialize;
use tokio::fs;

use crate::stops::{StopLocation, StopLocationResolver};

/// A stop as described in the catalogue file.
#[derive(Debug, Clone, Deserialize)]
pub struct StopRecord {
    /// Code identifying the stop, as used by the live departures API.
    pub code: String,
    /// Human readable stop name.
    pub name: String,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

/// In-memory catalogue of stops, keyed by stop code.
///
/// The catalogue file is a JSON array of stop records:
/// ```text
/// [
///   { "code": "6100231", "name": "Bridge Street", "latitude": -43.552, "longitude": 172.635 }
/// ]
/// ```
pub struct StopCatalogue {
    stops: HashMap<String, StopRecord>,
}

impl StopCatalogue {
    /// Loads the catalogue from `path`.
    ///
    /// Unlike alert persistence, a missing or unreadable catalogue is a
    /// startup error: without stop locations no proximity alert can ever
    /// be armed.
    pub async fn load(path: &str) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read stop catalogue {path}"))?;

        let records: Vec<StopRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse stop catalogue {path}"))?;

        info!("loaded {} stops from {}", records.len(), path);

        let stops = records
            .into_iter()
            .map(|record| (record.code.clone(), record))
            .collect();

        Ok(StopCatalogue { stops })
    }

    /// Returns the record for `code`, if the catalogue knows the stop.
    pub fn stop(&self, code: &str) -> Option<&StopRecord> {
        self.stops.get(code)
    }

    /// Number of stops in the catalogue.
    pub fn len(&self) -> usize {
        self.stops.len()
    }

    /// Whether the catalogue contains no stops.
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

#[async_trait]
impl StopLocationResolver for StopCatalogue {
    async fn stop_location(&self, stop_code: &str) -> Option<StopLocation> {
        self.stops.get(stop_code).map(|record| StopLocation {
            latitude: record.latitude,
            longitude: record.longitude,
        })
    }
}
