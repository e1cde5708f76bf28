//! Live departure board integration.
//!
//! This module provides the client side of the bus times server API,
//! handling departure board requests and response decoding.
//!
//! # Modules
//!
//! - `client` - HTTP client for making API requests to the bus times server
//! - `error` - Error types for failed departure requests
//! - `response_structs` - Internal data structures for API responses
//! - `structs` - Public data structures representing departures

mod client;
mod error;
mod response_structs;
mod structs;

pub use crate::livetimes::client::{BusTimesClient, LiveTimesClient, MockLiveTimesClient};
pub use crate::livetimes::error::LiveTimesError;
pub use crate::livetimes::structs::LiveDeparture;
