//! Error types for the locator system

use llm_gateway::RouterError;
use thiserror::Error;

/// Failure reported by the document collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("document timeout: {0}")]
    Timeout(String),
}

/// Knowledge store persistence failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("locator store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("locator store encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Locator error enumeration
#[derive(Debug, Error)]
pub enum LocatorError {
    /// Cached locator no longer resolves
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Document collaborator failed
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Knowledge store could not be persisted
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Snapshot could not be captured or written
    #[error("Snapshot failed: {0}")]
    Snapshot(String),

    /// AI response was not a usable locator map
    #[error("Heal response unparseable: {0}")]
    HealParse(String),

    /// Current document is not the declared context
    #[error("Context mismatch: {0}")]
    ContextMismatch(String),

    /// Every provider failed
    #[error("Provider error: {0}")]
    Provider(#[from] RouterError),

    /// Context profile file invalid
    #[error("Invalid context profiles: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LocatorError::Document(DocumentError::Timeout(_)) | LocatorError::Provider(_)
        )
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::Internal(_) | LocatorError::Config(_) => 3,
            LocatorError::Store(_) | LocatorError::Provider(_) => 2,
            LocatorError::ElementNotFound(_)
            | LocatorError::HealParse(_)
            | LocatorError::Snapshot(_)
            | LocatorError::Document(_) => 1,
            LocatorError::ContextMismatch(_) => 0,
        }
    }
}
