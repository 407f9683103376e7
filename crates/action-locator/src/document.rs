//! Document capability consumed by the locator system
//!
//! The locator layer never queries the DOM itself; a browser session exposes
//! these operations and each worker owns its own instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::errors::DocumentError;

#[async_trait]
pub trait Document: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DocumentError>;

    /// Serialized markup of the current page
    async fn capture_markup(&self) -> Result<String, DocumentError>;

    /// Full-page screenshot (PNG)
    async fn capture_screenshot(&self) -> Result<Vec<u8>, DocumentError>;

    /// Number of elements matching `locator`
    async fn count(&self, locator: &str) -> Result<usize, DocumentError>;

    /// Wait up to `timeout` for `locator` to match a visible element
    async fn is_visible(&self, locator: &str, timeout: Duration) -> Result<bool, DocumentError>;

    async fn current_location(&self) -> Result<String, DocumentError>;

    async fn current_title(&self) -> Result<String, DocumentError>;
}

#[derive(Debug, Clone, Copy)]
struct ElementState {
    count: usize,
    visible: bool,
}

#[derive(Debug, Default)]
struct PageState {
    location: String,
    title: String,
    markup: String,
    screenshot: Vec<u8>,
    elements: HashMap<String, ElementState>,
    failing: bool,
}

/// In-memory document: locators are matched literally against a registry
/// of known elements. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    page: RwLock<PageState>,
    queries: AtomicUsize,
}

impl MemoryDocument {
    pub fn new(location: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            page: RwLock::new(PageState {
                location: location.into(),
                title: title.into(),
                ..PageState::default()
            }),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn with_markup(self, markup: impl Into<String>) -> Self {
        self.page.write().markup = markup.into();
        self
    }

    pub fn with_screenshot(self, screenshot: Vec<u8>) -> Self {
        self.page.write().screenshot = screenshot;
        self
    }

    /// Register `count` visible elements matching `locator`
    pub fn with_element(self, locator: impl Into<String>, count: usize) -> Self {
        self.set_element(locator, count, true);
        self
    }

    pub fn set_element(&self, locator: impl Into<String>, count: usize, visible: bool) {
        self.page
            .write()
            .elements
            .insert(locator.into(), ElementState { count, visible });
    }

    pub fn remove_element(&self, locator: &str) {
        self.page.write().elements.remove(locator);
    }

    pub fn set_markup(&self, markup: impl Into<String>) {
        self.page.write().markup = markup.into();
    }

    /// Make every query fail, simulating a crashed session
    pub fn set_failing(&self, failing: bool) {
        self.page.write().failing = failing;
    }

    /// Number of element queries served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), DocumentError> {
        if self.page.read().failing {
            return Err(DocumentError::Query("session unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Document for MemoryDocument {
    async fn navigate(&self, url: &str) -> Result<(), DocumentError> {
        self.check()
            .map_err(|err| DocumentError::Navigation(err.to_string()))?;
        self.page.write().location = url.to_string();
        Ok(())
    }

    async fn capture_markup(&self) -> Result<String, DocumentError> {
        self.check()?;
        Ok(self.page.read().markup.clone())
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, DocumentError> {
        self.check()?;
        Ok(self.page.read().screenshot.clone())
    }

    async fn count(&self, locator: &str) -> Result<usize, DocumentError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.check()?;
        Ok(self
            .page
            .read()
            .elements
            .get(locator)
            .map(|state| state.count)
            .unwrap_or(0))
    }

    async fn is_visible(&self, locator: &str, _timeout: Duration) -> Result<bool, DocumentError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.check()?;
        Ok(self
            .page
            .read()
            .elements
            .get(locator)
            .map(|state| state.count > 0 && state.visible)
            .unwrap_or(false))
    }

    async fn current_location(&self) -> Result<String, DocumentError> {
        self.check()?;
        Ok(self.page.read().location.clone())
    }

    async fn current_title(&self) -> Result<String, DocumentError> {
        self.check()?;
        Ok(self.page.read().title.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hidden_elements_count_but_are_not_visible() {
        let doc = MemoryDocument::new("https://example.test", "Example").with_element("#a", 2);
        doc.set_element(".ad", 1, false);

        assert_eq!(doc.count("#a").await.unwrap(), 2);
        assert!(doc.is_visible("#a", Duration::ZERO).await.unwrap());
        assert_eq!(doc.count(".ad").await.unwrap(), 1);
        assert!(!doc.is_visible(".ad", Duration::ZERO).await.unwrap());
        assert!(!doc.is_visible("#missing", Duration::ZERO).await.unwrap());
        assert_eq!(doc.query_count(), 5);
    }

    #[tokio::test]
    async fn failing_session_errors() {
        let doc = MemoryDocument::new("https://example.test", "Example");
        doc.set_failing(true);
        assert!(doc.count("#a").await.is_err());
        assert!(matches!(
            doc.navigate("https://other.test").await,
            Err(DocumentError::Navigation(_))
        ));
    }
}
