//! Error types for the live departures client.

use thiserror::Error;

/// Errors that can occur while fetching live departures.
#[derive(Debug, Error)]
pub enum LiveTimesError {
    /// The request never produced a usable response.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("server returned status {status}")]
    Server {
        /// HTTP status code of the response.
        status: u16,
    },

    /// The response body was not the expected JSON shape.
    #[error("failed to parse departures response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let error = LiveTimesError::Server { status: 503 };
        assert_eq!(format!("{}", error), "server returned status 503");
    }

    #[test]
    fn test_parse_error_from_serde() {
        let parse_error = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let error = LiveTimesError::from(parse_error);

        assert!(matches!(error, LiveTimesError::Parse(_)));
        assert!(format!("{}", error).starts_with("failed to parse departures response"));
    }
}
