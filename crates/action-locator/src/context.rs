//! Declared page contexts and the guard that checks the live document
//! actually is one before any heal is attempted.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::errors::{DocumentError, LocatorError};
use crate::schema::{overlay_schema, KeySchema};

/// How to recognise one context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextProfile {
    pub description: Option<String>,

    /// Case-insensitive substrings of the page URL
    pub url_patterns: Vec<String>,

    /// Case-insensitive substrings of the page title
    pub title_patterns: Vec<String>,

    /// Locators that must all be visible; overrides the patterns when set
    pub required_locators: Vec<String>,

    /// Extra element keys expected in this context
    pub schema: KeySchema,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    contexts: BTreeMap<String, ContextProfile>,
}

/// Every declared context
#[derive(Debug, Clone, Default)]
pub struct ContextRegistry {
    profiles: BTreeMap<String, ContextProfile>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, name: impl Into<String>, profile: ContextProfile) -> Self {
        self.profiles.insert(name.into(), profile);
        self
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, LocatorError> {
        let file: ProfileFile =
            serde_yaml::from_str(text).map_err(|err| LocatorError::Config(err.to_string()))?;
        Ok(Self {
            profiles: file.contexts,
        })
    }

    pub fn load(path: &Path) -> Result<Self, LocatorError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| LocatorError::Config(format!("{}: {err}", path.display())))?;
        let registry = Self::from_yaml_str(&text)?;
        info!(
            path = %path.display(),
            contexts = registry.profiles.len(),
            "context profiles loaded"
        );
        Ok(registry)
    }

    pub fn profile(&self, context: &str) -> Option<&ContextProfile> {
        self.profiles.get(context)
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Base schema overlaid with the context's own keys
    pub fn expected_schema(&self, context: &str) -> KeySchema {
        match self.profiles.get(context) {
            Some(profile) => overlay_schema(&profile.schema),
            None => overlay_schema(&KeySchema::new()),
        }
    }

    /// Does the live document look like `context`?
    ///
    /// Undeclared contexts and document errors pass.
    pub async fn verify(&self, document: &dyn Document, context: &str, timeout: Duration) -> bool {
        let Some(profile) = self.profiles.get(context) else {
            debug!(context, "context not declared; skipping verification");
            return true;
        };
        match check_profile(profile, document, timeout).await {
            Ok(matched) => {
                if !matched {
                    info!(context, "document does not match declared context");
                }
                matched
            }
            Err(err) => {
                warn!(context, %err, "context verification failed; assuming match");
                true
            }
        }
    }
}

async fn check_profile(
    profile: &ContextProfile,
    document: &dyn Document,
    timeout: Duration,
) -> Result<bool, DocumentError> {
    if !profile.required_locators.is_empty() {
        for locator in &profile.required_locators {
            if !document.is_visible(locator, timeout).await? {
                debug!(locator = %locator, "required locator not visible");
                return Ok(false);
            }
        }
        return Ok(true);
    }

    if profile.url_patterns.is_empty() && profile.title_patterns.is_empty() {
        return Ok(true);
    }

    let location = document.current_location().await?.to_lowercase();
    if contains_any(&location, &profile.url_patterns) {
        return Ok(true);
    }
    let title = document.current_title().await?.to_lowercase();
    Ok(contains_any(&title, &profile.title_patterns))
}

fn contains_any(haystack: &str, patterns: &[String]) -> bool {
    patterns
        .iter()
        .map(|pattern| pattern.trim().to_lowercase())
        .any(|pattern| !pattern.is_empty() && haystack.contains(&pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;

    const PROFILES: &str = r##"
contexts:
  login:
    url_patterns: ["/login", "/signin"]
    title_patterns: ["Sign in"]
  checkout:
    required_locators: ["#cart", "#pay"]
    url_patterns: ["/checkout"]
    schema:
      pay_button: "Button confirming payment"
"##;

    fn registry() -> ContextRegistry {
        ContextRegistry::from_yaml_str(PROFILES).unwrap()
    }

    #[tokio::test]
    async fn url_or_title_match_passes() {
        let registry = registry();
        let by_url = MemoryDocument::new("https://shop.test/LOGIN?next=/", "Shop");
        let by_title = MemoryDocument::new("https://shop.test/auth", "Please sign in");
        let neither = MemoryDocument::new("https://shop.test/", "Home");

        assert!(registry.verify(&by_url, "login", Duration::ZERO).await);
        assert!(registry.verify(&by_title, "login", Duration::ZERO).await);
        assert!(!registry.verify(&neither, "login", Duration::ZERO).await);
    }

    #[tokio::test]
    async fn required_locators_are_authoritative() {
        let registry = registry();
        let doc = MemoryDocument::new("https://shop.test/checkout", "Checkout").with_element("#cart", 1);
        assert!(!registry.verify(&doc, "checkout", Duration::ZERO).await);

        doc.set_element("#pay", 1, true);
        assert!(registry.verify(&doc, "checkout", Duration::ZERO).await);

        let elsewhere = MemoryDocument::new("https://shop.test/", "Home")
            .with_element("#cart", 1)
            .with_element("#pay", 1);
        assert!(registry.verify(&elsewhere, "checkout", Duration::ZERO).await);
    }

    #[tokio::test]
    async fn undeclared_context_and_errors_pass() {
        let registry = registry();
        let doc = MemoryDocument::new("https://shop.test/", "Home");
        assert!(registry.verify(&doc, "unknown", Duration::ZERO).await);

        doc.set_failing(true);
        assert!(registry.verify(&doc, "login", Duration::ZERO).await);
    }

    #[test]
    fn schema_overlay_per_context() {
        let registry = registry();
        assert!(registry.expected_schema("checkout").contains_key("pay_button"));
        assert!(!registry.expected_schema("login").contains_key("pay_button"));
        assert!(registry.expected_schema("unknown").contains_key("footer"));
    }

    #[test]
    fn invalid_yaml_is_a_config_error() {
        let err = ContextRegistry::from_yaml_str("contexts: [1, 2").unwrap_err();
        assert!(matches!(err, LocatorError::Config(_)));
    }
}
