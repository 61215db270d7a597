//! Classification of failed HTTP exchanges.

use reqwest::StatusCode;

/// Why a request did not produce a usable response.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpError {
    /// The server answered, but not with a 2xx status.
    Status(u16),
    /// The request did not complete within its timeout.
    Timeout,
    /// No response: DNS failure, refused connection, broken stream.
    Transport(String),
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::Status(code) => {
                let reason = StatusCode::from_u16(*code)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown status");
                write!(f, "Server responded with HTTP {} ({})", code, reason)
            }
            HttpError::Timeout => write!(f, "Request timed out"),
            HttpError::Transport(msg) => write!(f, "Network error: {}", msg),
        }
    }
}

impl std::error::Error for HttpError {}

/// Maps a reqwest failure onto [`HttpError`].
pub fn classify(error: &reqwest::Error) -> HttpError {
    if let Some(status) = error.status() {
        return HttpError::Status(status.as_u16());
    }
    if error.is_timeout() {
        return HttpError::Timeout;
    }
    HttpError::Transport(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        let err = HttpError::Status(404);
        assert!(err.to_string().contains("HTTP 404"));
        assert!(err.to_string().contains("Not Found"));
    }

    #[test]
    fn test_unknown_status_display() {
        let err = HttpError::Status(599);
        assert!(err.to_string().contains("HTTP 599"));
    }

    #[test]
    fn test_transport_display() {
        let err = HttpError::Transport("connection refused".to_string());
        assert_eq!(err.to_string(), "Network error: connection refused");
        assert_eq!(HttpError::Timeout.to_string(), "Request timed out");
    }

    #[tokio::test]
    async fn test_classify_status_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(503)
            .create_async()
            .await;

        let response = reqwest::Client::new()
            .get(server.url())
            .send()
            .await
            .unwrap();
        let err = response.error_for_status().unwrap_err();

        assert_eq!(classify(&err), HttpError::Status(503));
    }

    #[tokio::test]
    async fn test_classify_connection_error() {
        // Port 9 (discard) on localhost is not expected to accept HTTP
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:9/")
            .send()
            .await
            .unwrap_err();

        assert!(matches!(classify(&err), HttpError::Transport(_)));
    }
}
