use thiserror::Error;

/// Main error type for garmin-ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authentication required. Stored tokens are missing or were rejected.")]
    NotAuthenticated,

    #[error("MFA required")]
    MfaRequired,

    #[error("Rate limited. Please wait before retrying.")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Ledger format error: {0}")]
    LedgerFormat(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    /// Create an authentication error from a message
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a configuration error from a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid response error from a message
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LedgerError::Authentication("Invalid credentials".to_string());
        assert_eq!(err.to_string(), "Authentication error: Invalid credentials");
    }

    #[test]
    fn test_not_authenticated_error() {
        let err = LedgerError::NotAuthenticated;
        assert!(err.to_string().contains("tokens"));
    }

    #[test]
    fn test_rate_limited_error() {
        let err = LedgerError::RateLimited;
        assert!(err.to_string().contains("Rate limited"));
    }

    #[test]
    fn test_api_error_display() {
        let err = LedgerError::Api {
            status: 503,
            message: "service unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "API error 503: service unavailable");
    }

    #[test]
    fn test_error_constructors() {
        let auth_err = LedgerError::auth("test auth");
        assert!(matches!(auth_err, LedgerError::Authentication(_)));

        let config_err = LedgerError::config("test config");
        assert!(matches!(config_err, LedgerError::Config(_)));

        let response_err = LedgerError::invalid_response("bad response");
        assert!(matches!(response_err, LedgerError::InvalidResponse(_)));
    }
}
