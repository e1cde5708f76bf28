//! buswatch - a self-hosted transit stop alert daemon.
//!
//! buswatch tracks two kinds of user alerts for transit stops and delivers
//! each one exactly once:
//!
//! - **Arrival alerts**: notify when a watched service is due at a stop
//!   within a number of minutes, evaluated by polling a live departures API
//! - **Proximity alerts**: notify when the user enters a radius around a
//!   stop, evaluated through geofences and their entered events
//!
//! Alerts live in a store that is the single source of truth; background
//! monitors start when alerts exist, evaluate them, and stop themselves
//! once nothing is left. Satisfied alerts are deleted after their
//! notification, unsatisfied ones expire after an hour.
//!
//! # Modules
//!
//! - [`alerts`] - Alert types, store, monitors and the lifecycle coordinator
//! - [`config`] - YAML configuration with environment variable overrides
//! - [`geofence`] - Geofence gateway abstraction and the software backend
//! - [`livetimes`] - Live departures API client
//! - [`notify`] - Notification dispatch, including the webhook dispatcher
//! - [`stops`] - Stop catalogue and location resolution

pub mod alerts;
pub mod config;
pub mod geofence;
pub mod livetimes;
pub mod notify;
pub mod stops;
