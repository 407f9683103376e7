//! Error types for provider calls and routing

use thiserror::Error;

/// Classes that drive the router's retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Quota exhausted for this key; rotate to another key
    SoftRateLimit,

    /// Credential rejected; evict the key for the life of the process
    PermanentAuth,

    /// Provider temporarily overloaded; back off and retry the same call
    TransientUnavailable,

    /// Anything else; abandon the current model
    Other,
}

impl ErrorClass {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorClass::SoftRateLimit => "rate_limited",
            ErrorClass::PermanentAuth => "auth_failed",
            ErrorClass::TransientUnavailable => "unavailable",
            ErrorClass::Other => "other",
        }
    }
}

/// Error raised by a single provider invocation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::RateLimited(_) => ErrorClass::SoftRateLimit,
            ProviderError::AuthFailed(_) => ErrorClass::PermanentAuth,
            ProviderError::Unavailable(_) => ErrorClass::TransientUnavailable,
            ProviderError::Other(_) => ErrorClass::Other,
        }
    }

    /// Map an HTTP status and body to an error class.
    ///
    /// Google reports revoked keys as `400 API_KEY_INVALID`, so the body is
    /// inspected as well as the status.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("{status}: {}", truncate(body, 300));
        match status {
            429 => ProviderError::RateLimited(message),
            401 | 403 => ProviderError::AuthFailed(message),
            400 if body.contains("API_KEY_INVALID") || body.contains("API key not valid") => {
                ProviderError::AuthFailed(message)
            }
            500 | 502 | 503 | 504 => ProviderError::Unavailable(message),
            _ => ProviderError::Other(message),
        }
    }

    /// Map a transport-level failure.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ProviderError::Unavailable(err.to_string())
        } else {
            ProviderError::Other(err.to_string())
        }
    }

    /// A 429 still proves the credential authenticates.
    pub fn proves_key_alive(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }
}

/// Error raised by the router for one logical generate call
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("all providers exhausted{}", describe_last(.last_error))]
    AllProvidersExhausted { last_error: Option<ProviderError> },

    #[error("no providers configured")]
    NoProviders,
}

impl RouterError {
    pub fn exhausted(last_error: Option<ProviderError>) -> Self {
        RouterError::AllProvidersExhausted { last_error }
    }
}

fn describe_last(last_error: &Option<ProviderError>) -> String {
    last_error
        .as_ref()
        .map(|err| format!(": {err}"))
        .unwrap_or_default()
}

fn truncate(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(
            ProviderError::from_status(429, "quota").class(),
            ErrorClass::SoftRateLimit
        );
        assert_eq!(
            ProviderError::from_status(403, "denied").class(),
            ErrorClass::PermanentAuth
        );
        assert_eq!(
            ProviderError::from_status(400, "{\"reason\":\"API_KEY_INVALID\"}").class(),
            ErrorClass::PermanentAuth
        );
        assert_eq!(
            ProviderError::from_status(400, "bad request").class(),
            ErrorClass::Other
        );
        assert_eq!(
            ProviderError::from_status(503, "overloaded").class(),
            ErrorClass::TransientUnavailable
        );
    }

    #[test]
    fn exhausted_message_includes_last_error() {
        let err = RouterError::exhausted(Some(ProviderError::Other("boom".into())));
        assert_eq!(
            err.to_string(),
            "all providers exhausted: provider error: boom"
        );
        assert_eq!(
            RouterError::exhausted(None).to_string(),
            "all providers exhausted"
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
