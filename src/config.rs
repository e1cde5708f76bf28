//! Configuration file structures for the buswatch daemon.
//!
//! This module defines the YAML configuration file format and its loading
//! through figment, which layers environment variable overrides on top of
//! the file.
//!
//! # Configuration File Format
//!
//! ```yaml
//! live_times:
//!   # Base URL of the bus times server
//!   url: "https://bustimes.example.com"
//!
//!   # API key issued by the server operator
//!   api_key: "secret"
//!
//!   # Seconds between two departure polls (optional, defaults to 60)
//!   poll_interval: 60
//!
//! notifications:
//!   # Webhook URL notifications are posted to
//!   webhook_url: "https://ntfy.example.com/buswatch"
//!
//! stops:
//!   # Path to the stop catalogue JSON file
//!   catalogue: "stops.json"
//!
//! # Alerts created at startup (optional)
//! alerts:
//!   arrival:
//!     - stop: "6100231"
//!       services: ["25", "X12"]
//!       minutes: 5
//!   proximity:
//!     - stop: "6100231"
//!       radius_meters: 250
//! ```
//!
//! # Environment Variable Overrides
//!
//! Every value can be overridden with a `BUSWATCH_` prefixed environment
//! variable, using `__` as the section separator:
//!
//! ```bash
//! export BUSWATCH_LIVE_TIMES__API_KEY="secret-from-env"
//! export BUSWATCH_NOTIFICATIONS__WEBHOOK_URL="https://ntfy.example.com/buswatch"
//! ```

use anyhow::Context;
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::Deserialize;

/// Default number of seconds between two departure polls.
fn default_poll_interval() -> u64 {
    60
}

/// Root configuration structure for the buswatch daemon.
#[derive(Deserialize)]
pub struct Config {
    /// Live departures API configuration
    pub live_times: LiveTimes,
    /// Notification delivery configuration
    pub notifications: Notifications,
    /// Stop catalogue configuration
    pub stops: Stops,
    /// Alerts created at startup
    #[serde(default)]
    pub alerts: StartupAlerts,
}

impl Config {
    /// Loads the configuration from the YAML file at `path`, applying
    /// `BUSWATCH_` environment variable overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or a required value
    /// is missing or of the wrong type.
    pub fn load(path: &str) -> anyhow::Result<Config> {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("BUSWATCH_").split("__"))
            .extract()
            .with_context(|| format!("failed to load configuration from {path}"))
    }
}

/// Live departures API configuration.
///
/// # YAML Section
///
/// ```yaml
/// live_times:
///   url: "https://bustimes.example.com"
///   api_key: "secret"
///   poll_interval: 60
/// ```
#[derive(Deserialize)]
pub struct LiveTimes {
    /// Base URL of the bus times server.
    ///
    /// Should include the protocol (http/https); a trailing slash is
    /// stripped at startup.
    pub url: String,

    /// API key sent with every departures request.
    pub api_key: String,

    /// Seconds between two departure polls while arrival alerts exist.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

/// Notification delivery configuration.
#[derive(Deserialize)]
pub struct Notifications {
    /// URL the notification payloads are posted to.
    pub webhook_url: String,
}

/// Stop catalogue configuration.
#[derive(Deserialize)]
pub struct Stops {
    /// Path to the stop catalogue JSON file.
    pub catalogue: String,
}

/// Alerts the daemon creates right after startup.
///
/// Useful for a fixed daily commute. The alerts go through the same
/// lifecycle as alerts added at runtime, including the expiry window.
#[derive(Deserialize, Default)]
pub struct StartupAlerts {
    /// Arrival alerts to create.
    #[serde(default)]
    pub arrival: Vec<ArrivalAlertEntry>,
    /// Proximity alerts to create.
    #[serde(default)]
    pub proximity: Vec<ProximityAlertEntry>,
}

/// An arrival alert as declared in the configuration file.
#[derive(Deserialize)]
pub struct ArrivalAlertEntry {
    /// Code of the stop to watch.
    pub stop: String,
    /// Service names the alert watches.
    pub services: Vec<String>,
    /// The alert fires once a watched service departs in at most this
    /// many minutes.
    pub minutes: u32,
}

/// A proximity alert as declared in the configuration file.
#[derive(Deserialize)]
pub struct ProximityAlertEntry {
    /// Code of the stop at the centre of the watched circle.
    pub stop: String,
    /// Radius of the watched circle in meters.
    pub radius_meters: f64,
}
