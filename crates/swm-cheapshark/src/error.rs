use swm_core::ApiFailure;
use thiserror::Error;

/// Errors returned by the `CheapShark` API client.
#[derive(Debug, Error)]
pub enum CheapsharkError {
    /// Network, TLS or timeout failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-2xx status.
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl CheapsharkError {
    /// Converts the error into the transient failure recorded against an app.
    ///
    /// Only [`CheapsharkError::UnexpectedStatus`] carries an HTTP status;
    /// everything else is a transport-level failure.
    #[must_use]
    pub fn to_failure(&self) -> ApiFailure {
        match self {
            CheapsharkError::UnexpectedStatus { status, .. } => {
                ApiFailure::http(*status, "unexpected response from CheapShark")
            }
            CheapsharkError::Http(e) if e.is_timeout() => {
                ApiFailure::transport(format!("request timed out: {e}"))
            }
            other => ApiFailure::transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_keep_the_http_status() {
        let err = CheapsharkError::UnexpectedStatus {
            status: 429,
            url: "https://www.cheapshark.com/api/1.0/games".to_string(),
        };
        let failure = err.to_failure();
        assert_eq!(failure.http_status, Some(429));
        assert!(failure.to_string().starts_with("HTTP 429"));
    }

    #[test]
    fn decode_errors_are_transport_failures() {
        let source = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
        let err = CheapsharkError::Deserialize {
            context: "games".to_string(),
            source,
        };
        let failure = err.to_failure();
        assert!(failure.http_status.is_none());
        assert!(failure.message.contains("games"));
    }
}
