use thiserror::Error;

/// Type alias for Result with SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error types for the mailbox-to-sheet synchronization
#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote API returned an error not covered by a more specific variant
    #[error("API error: {0}")]
    ApiError(String),

    /// Authentication failed (401, missing token, broken credentials)
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Provider returned data we could not interpret
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Processed-state errors
    #[error("State error: {0}")]
    StateError(String),

    /// Generic catch-all error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// How a failure should be treated by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Rate limiting or a server-side hiccup; worth retrying
    Transient,
    /// Retrying cannot help (authorization, malformed request, missing resource)
    Permanent,
    /// Not classified; surfaced without retry
    Unknown,
}

impl SyncError {
    /// Classify the error for the retry policy
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            SyncError::RateLimitExceeded(_)
            | SyncError::ServerError { .. }
            | SyncError::NetworkError(_) => FailureKind::Transient,
            SyncError::AuthError(_)
            | SyncError::Forbidden(_)
            | SyncError::BadRequest(_)
            | SyncError::NotFound(_)
            | SyncError::InvalidMessageFormat(_)
            | SyncError::ConfigError(_) => FailureKind::Permanent,
            SyncError::ApiError(_)
            | SyncError::IoError(_)
            | SyncError::SerializationError(_)
            | SyncError::StateError(_)
            | SyncError::Unknown(_) => FailureKind::Unknown,
        }
    }

    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        self.failure_kind() == FailureKind::Transient
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        self.failure_kind() == FailureKind::Permanent
    }

    /// Map an HTTP status code to an error variant
    pub fn from_status(status_code: u16, message: String) -> Self {
        match status_code {
            // Rate limiting - transient
            429 => SyncError::RateLimitExceeded(message),
            400 => SyncError::BadRequest(message),
            401 => SyncError::AuthError(message),
            403 => SyncError::Forbidden(message),
            404 => SyncError::NotFound(message),
            // Server errors - transient
            500..=599 => SyncError::ServerError {
                status: status_code,
                message,
            },
            _ => SyncError::ApiError(message),
        }
    }
}

impl SyncError {
    /// Classify a Google JSON error body (`{"error": {"code", "message", "errors"}}`)
    ///
    /// A 403 whose reason is a rate limit is treated like a 429. Bodies without a
    /// numeric code stay `BadRequest`.
    pub fn from_error_body(body: &serde_json::Value) -> Self {
        let error = &body["error"];
        let Some(code) = error["code"].as_u64().and_then(|c| u16::try_from(c).ok()) else {
            return SyncError::BadRequest(body.to_string());
        };

        let message = match error["message"].as_str() {
            Some(text) => format!("HTTP {}: {}", code, text),
            None => format!("HTTP {}: {}", code, body),
        };

        let rate_limited = error["errors"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|e| e["reason"].as_str())
            .any(|reason| reason == "rateLimitExceeded" || reason == "userRateLimitExceeded");
        if code == 403 && rate_limited {
            return SyncError::RateLimitExceeded(message);
        }

        SyncError::from_status(code, message)
    }
}

// google-sheets4 re-exports the same google-apis-common error type, so this
// conversion serves both hubs.
impl From<google_gmail1::Error> for SyncError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // HTTP response with status code (non-success responses)
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let message = format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                );
                SyncError::from_status(status.as_u16(), message)
            }
            // Non-success responses with a JSON body; Google always sends one
            google_gmail1::Error::BadRequest(ref body) => SyncError::from_error_body(body),
            google_gmail1::Error::MissingToken(ref err) => {
                SyncError::AuthError(format!("Missing token: {}", err))
            }
            google_gmail1::Error::JsonDecodeError(ref body, ref err) => {
                SyncError::InvalidMessageFormat(format!("{} (body: {})", err, body))
            }
            // Network/connection errors - transient
            google_gmail1::Error::HttpError(ref err) => {
                SyncError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => SyncError::NetworkError(err.to_string()),
            _ => SyncError::ApiError(error.to_string()),
        }
    }
}
