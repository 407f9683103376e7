use std::time::Duration;

use tracing::debug;

use crate::document::Document;

/// Default wait for a locator to become visible
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(3);

// Grace given to the document on top of its own wait before we give up on it.
const OUTER_MARGIN: Duration = Duration::from_millis(500);

/// Checks that a locator currently resolves to a visible element.
///
/// Never errors: empty locators, document failures and timeouts all count
/// as "not valid".
#[derive(Debug, Clone, Copy)]
pub struct LocatorValidator {
    timeout: Duration,
}

impl Default for LocatorValidator {
    fn default() -> Self {
        Self::new(DEFAULT_VALIDATION_TIMEOUT)
    }
}

impl LocatorValidator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn is_valid(&self, document: &dyn Document, locator: &str) -> bool {
        if locator.trim().is_empty() {
            return false;
        }
        let wait = document.is_visible(locator, self.timeout);
        match tokio::time::timeout(self.timeout + OUTER_MARGIN, wait).await {
            Ok(Ok(visible)) => visible,
            Ok(Err(err)) => {
                debug!(locator, %err, "locator validation errored");
                false
            }
            Err(_) => {
                debug!(
                    locator,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "locator validation timed out"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use crate::errors::DocumentError;
    use async_trait::async_trait;

    struct StalledDocument;

    #[async_trait]
    impl Document for StalledDocument {
        async fn navigate(&self, _url: &str) -> Result<(), DocumentError> {
            Ok(())
        }
        async fn capture_markup(&self) -> Result<String, DocumentError> {
            Ok(String::new())
        }
        async fn capture_screenshot(&self) -> Result<Vec<u8>, DocumentError> {
            Ok(Vec::new())
        }
        async fn count(&self, _locator: &str) -> Result<usize, DocumentError> {
            Ok(0)
        }
        async fn is_visible(
            &self,
            _locator: &str,
            _timeout: Duration,
        ) -> Result<bool, DocumentError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(true)
        }
        async fn current_location(&self) -> Result<String, DocumentError> {
            Ok(String::new())
        }
        async fn current_title(&self) -> Result<String, DocumentError> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn visible_element_is_valid() {
        let doc = MemoryDocument::new("https://shop.test", "Shop").with_element("#buy", 1);
        let validator = LocatorValidator::default();
        assert!(validator.is_valid(&doc, "#buy").await);
        assert!(!validator.is_valid(&doc, ".gone").await);
    }

    #[tokio::test]
    async fn empty_locator_is_invalid_without_querying() {
        let doc = MemoryDocument::new("https://shop.test", "Shop");
        assert!(!LocatorValidator::default().is_valid(&doc, "  ").await);
        assert_eq!(doc.query_count(), 0);
    }

    #[tokio::test]
    async fn document_errors_are_invalid() {
        let doc = MemoryDocument::new("https://shop.test", "Shop").with_element("#buy", 1);
        doc.set_failing(true);
        assert!(!LocatorValidator::default().is_valid(&doc, "#buy").await);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_document_times_out() {
        let validator = LocatorValidator::new(Duration::from_millis(100));
        assert!(!validator.is_valid(&StalledDocument, "#buy").await);
    }
}
