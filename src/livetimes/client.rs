//! HTTP client for the live departures API.
//!
//! This module provides the [`BusTimesClient`] struct for requesting live
//! departure boards from the bus times server.

use std::collections::HashMap;

use async_trait::async_trait;
use log::{debug, info};
use mockall::automock;
use reqwest::Client;

use crate::livetimes::LiveTimesError;
use crate::livetimes::response_structs::DeparturesResponse;
use crate::livetimes::structs::LiveDeparture;

/// HTTP client for requesting live departures from the bus times server.
///
/// # Examples
///
/// ```no_run
/// # use buswatch::livetimes::{BusTimesClient, LiveTimesClient};
/// # async fn example() {
/// let client = BusTimesClient::new("http://bus.times.server", "api_key");
/// let stops = vec!["6100231".to_string()];
/// let departures = client.departures(&stops, 4).await.unwrap();
/// println!("Departures: {:?}", departures);
/// # }
/// ```
pub struct BusTimesClient {
    /// Bus times server url
    url: String,
    /// API key sent with every request
    ///
    /// The key is issued by the bus times server operator
    api_key: String,
    /// HTTP client
    client: Client,
}

/// Trait for fetching live departure boards.
///
/// This trait abstracts the HTTP operations for easier testing with mocks.
#[automock]
#[async_trait]
pub trait LiveTimesClient: Send + Sync {
    /// Fetches upcoming departures for every stop in `stop_codes`.
    ///
    /// The result maps stop codes to their departures. All stops are
    /// requested in a single call so one poll cycle costs one request no
    /// matter how many alerts are active.
    async fn departures(
        &self,
        stop_codes: &[String],
        departures_per_service: u8,
    ) -> Result<HashMap<String, Vec<LiveDeparture>>, LiveTimesError>;
}

impl BusTimesClient {
    /// Create a new [BusTimesClient].
    ///
    /// # Arguments
    ///
    /// * `url` - The base URL of the bus times server.
    /// * `api_key` - The API key used to authenticate requests.
    pub fn new(url: &str, api_key: &str) -> Self {
        let client = reqwest::Client::new();
        BusTimesClient {
            url: url.to_string(),
            api_key: api_key.to_string(),
            client,
        }
    }
}

#[async_trait]
impl LiveTimesClient for BusTimesClient {
    /// Request `/api/v1/departures` to get the departure boards of several stops.
    ///
    /// This api call returns a json object grouping departures by stop code:
    /// ```text
    /// {
    ///   stops: {
    ///     "6100231": [
    ///       { service: "25", destination: "Riccarton", minutes: 3 },
    ///       { service: "25", destination: "Riccarton", minutes: 18 }
    ///     ]
    ///   }
    /// }
    /// ```
    /// This method transforms this json into a map of [`LiveDeparture`] vectors.
    /// Stops unknown to the server are absent from the result.
    async fn departures(
        &self,
        stop_codes: &[String],
        departures_per_service: u8,
    ) -> Result<HashMap<String, Vec<LiveDeparture>>, LiveTimesError> {
        let url = format!("{}/api/v1/departures", &self.url);
        let stops = stop_codes.join(",");
        let max = departures_per_service.to_string();
        info!("request departures for stops {}", &stops);
        debug!("request {}?stops={}&max={}", &url, &stops, &max);

        let response = self
            .client
            .get(&url)
            .query(&[("stops", stops.as_str()), ("max", max.as_str())])
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LiveTimesError::Server {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let departures_response: DeparturesResponse = serde_json::from_str(&body)?;

        debug!("response from {} -> {:?}", &url, &departures_response.stops);

        Ok(departures_response
            .stops
            .into_iter()
            .map(|(code, records)| {
                (
                    code,
                    records.into_iter().map(LiveDeparture::from).collect(),
                )
            })
            .collect())
    }
}
