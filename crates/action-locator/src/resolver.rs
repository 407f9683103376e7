//! Locator resolution with validation and on-demand healing
//!
//! None of the resolution calls fail: a heal that cannot run is logged and the
//! caller gets whatever the store holds afterwards (possibly empty).

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::ContextRegistry;
use crate::document::Document;
use crate::healer::SelfHealer;
use crate::metrics;
use crate::store::KnowledgeStore;
use crate::types::{HealOptions, LocatorUsage};
use crate::validator::LocatorValidator;

/// Outcome of one resolve; `validated` is false when a heal ran
struct Resolution {
    locator: String,
    validated: bool,
}

pub struct LocatorResolver {
    store: Arc<KnowledgeStore>,
    contexts: Arc<ContextRegistry>,
    healer: Arc<dyn SelfHealer>,
    validator: LocatorValidator,
}

impl LocatorResolver {
    pub fn new(
        store: Arc<KnowledgeStore>,
        contexts: Arc<ContextRegistry>,
        healer: Arc<dyn SelfHealer>,
    ) -> Self {
        Self {
            store,
            contexts,
            healer,
            validator: LocatorValidator::default(),
        }
    }

    pub fn with_validator(mut self, validator: LocatorValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// Cached locator without touching the document
    pub fn lookup(&self, context: &str, element_key: &str) -> String {
        self.store.get(context, element_key)
    }

    /// Cached locator if it is visible, otherwise heal the context and re-read
    pub async fn resolve(
        &self,
        document: &dyn Document,
        context: &str,
        element_key: &str,
    ) -> String {
        self.resolve_checked(document, context, element_key)
            .await
            .locator
    }

    /// [`resolve`](Self::resolve) plus a probe that the locator serves `usage`.
    ///
    /// A failed probe on a locator that passed validation goes through
    /// [`heal_on_failure`](Self::heal_on_failure). When this call already
    /// healed, the result is returned as is.
    pub async fn resolve_with_fallback(
        &self,
        document: &dyn Document,
        context: &str,
        element_key: &str,
        usage: &LocatorUsage,
    ) -> String {
        let Resolution { locator, validated } =
            self.resolve_checked(document, context, element_key).await;
        let count = if locator.is_empty() {
            0
        } else {
            match document.count(&locator).await {
                Ok(count) => count,
                Err(err) => {
                    debug!(context, element_key, %err, "usage probe failed");
                    0
                }
            }
        };
        if usage.is_satisfied_by(count) {
            return locator;
        }
        if !validated {
            debug!(context, element_key, count, "usage unmet after heal; not healing again");
            return locator;
        }

        let reason =
            format!("locator `{locator}` matched {count} element(s), not enough to {usage}");
        self.heal_on_failure(document, context, element_key, &reason)
            .await
    }

    /// Heal after the caller saw `element_key` fail, unless the document is
    /// not `context` at all. Returns an empty string on context mismatch.
    pub async fn heal_on_failure(
        &self,
        document: &dyn Document,
        context: &str,
        element_key: &str,
        reason: &str,
    ) -> String {
        if !self
            .contexts
            .verify(document, context, self.validator.timeout())
            .await
        {
            info!(context, element_key, "not on the expected page; heal skipped");
            metrics::record_resolution("context_mismatch");
            return String::new();
        }
        let previous = self.lookup(context, element_key);
        self.heal_and_reread(document, context, element_key, reason.to_string(), &previous)
            .await
    }

    /// Run `operation` with the resolved locator. If it fails, heal with the
    /// error as reason and retry once when the heal produced a new locator.
    pub async fn with_auto_heal<T, E, F, Fut>(
        &self,
        document: &dyn Document,
        context: &str,
        element_key: &str,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let locator = self.resolve(document, context, element_key).await;
        let err = match operation(locator.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        warn!(context, element_key, %err, "operation failed; healing locator");
        let healed = self
            .heal_on_failure(document, context, element_key, &err.to_string())
            .await;
        if healed.is_empty() || healed == locator {
            return Err(err);
        }
        operation(healed).await
    }

    async fn resolve_checked(
        &self,
        document: &dyn Document,
        context: &str,
        element_key: &str,
    ) -> Resolution {
        let cached = self.lookup(context, element_key);
        if self.validator.is_valid(document, &cached).await {
            metrics::record_resolution("cached");
            return Resolution {
                locator: cached,
                validated: true,
            };
        }

        let reason = if cached.is_empty() {
            "no cached locator".to_string()
        } else {
            format!("cached locator `{cached}` is not visible")
        };
        debug!(context, element_key, %reason, "cached locator unusable");
        let locator = self
            .heal_and_reread(document, context, element_key, reason, &cached)
            .await;
        Resolution {
            locator,
            validated: false,
        }
    }

    async fn heal_and_reread(
        &self,
        document: &dyn Document,
        context: &str,
        element_key: &str,
        reason: String,
        previous: &str,
    ) -> String {
        let options = HealOptions::forced(element_key).with_reason(reason);
        if let Err(err) = self.healer.heal(document, context, options).await {
            warn!(context, element_key, %err, "heal failed; keeping stored locator");
        }

        let current = self.lookup(context, element_key);
        let path = if current.is_empty() {
            "unresolved"
        } else if current != previous {
            "healed"
        } else {
            "cached"
        };
        metrics::record_resolution(path);
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use crate::errors::LocatorError;
    use crate::types::{ContextLocators, HealOutcome, LocatorBook};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Healer that writes a fixed map and records its invocations
    struct FixedHealer {
        store: Arc<KnowledgeStore>,
        result: ContextLocators,
        calls: Mutex<Vec<HealOptions>>,
        fail: bool,
    }

    impl FixedHealer {
        fn new(store: &Arc<KnowledgeStore>, entries: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                store: store.clone(),
                result: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing(store: &Arc<KnowledgeStore>) -> Arc<Self> {
            Arc::new(Self {
                store: store.clone(),
                result: ContextLocators::new(),
                calls: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl SelfHealer for FixedHealer {
        async fn heal(
            &self,
            _document: &dyn Document,
            context: &str,
            options: HealOptions,
        ) -> Result<HealOutcome, LocatorError> {
            self.calls.lock().push(options);
            if self.fail {
                return Err(LocatorError::Internal("providers down".into()));
            }
            self.store.set_many(context, self.result.clone()).await?;
            Ok(HealOutcome::Healed {
                updated: self.result.clone(),
                simplified: 0,
            })
        }
    }

    fn store(entries: &[(&str, &str, &str)]) -> Arc<KnowledgeStore> {
        let mut book = LocatorBook::new();
        for (context, key, locator) in entries {
            book.entry(context.to_string())
                .or_default()
                .insert(key.to_string(), locator.to_string());
        }
        Arc::new(KnowledgeStore::in_memory(book))
    }

    fn resolver(store: &Arc<KnowledgeStore>, healer: Arc<FixedHealer>) -> LocatorResolver {
        let contexts = ContextRegistry::from_yaml_str(
            "contexts:\n  cart:\n    url_patterns: [\"/cart\"]\n",
        )
        .unwrap();
        LocatorResolver::new(store.clone(), Arc::new(contexts), healer)
    }

    fn cart_page() -> MemoryDocument {
        MemoryDocument::new("https://shop.test/cart", "Cart")
    }

    #[tokio::test]
    async fn lookup_reads_store_only() {
        let store = store(&[("cart", "pay", "#pay")]);
        let healer = FixedHealer::new(&store, &[]);
        let resolver = resolver(&store, healer.clone());
        assert_eq!(resolver.lookup("cart", "pay"), "#pay");
        assert_eq!(resolver.lookup("cart", "missing"), "");
        assert_eq!(healer.call_count(), 0);
    }

    #[tokio::test]
    async fn valid_cached_locator_skips_heal() {
        let store = store(&[("cart", "pay", "#pay")]);
        let healer = FixedHealer::new(&store, &[("pay", "#new-pay")]);
        let resolver = resolver(&store, healer.clone());
        let doc = cart_page().with_element("#pay", 1);

        assert_eq!(resolver.resolve(&doc, "cart", "pay").await, "#pay");
        assert_eq!(healer.call_count(), 0);
    }

    #[tokio::test]
    async fn invalid_locator_triggers_forced_heal() {
        let store = store(&[("cart", "pay", ".old")]);
        let healer = FixedHealer::new(&store, &[("pay", "#pay")]);
        let resolver = resolver(&store, healer.clone());
        let doc = cart_page().with_element("#pay", 1);

        assert_eq!(resolver.resolve(&doc, "cart", "pay").await, "#pay");
        let calls = healer.calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].force);
        assert_eq!(calls[0].element_key.as_deref(), Some("pay"));
    }

    #[tokio::test]
    async fn heal_errors_return_stored_value() {
        let store = store(&[("cart", "pay", ".old")]);
        let resolver = resolver(&store, FixedHealer::failing(&store));
        assert_eq!(resolver.resolve(&cart_page(), "cart", "pay").await, ".old");
    }

    #[tokio::test]
    async fn context_mismatch_returns_empty_without_heal() {
        let store = store(&[("cart", "pay", "#pay")]);
        let healer = FixedHealer::new(&store, &[("pay", "#other")]);
        let resolver = resolver(&store, healer.clone());
        let elsewhere = MemoryDocument::new("https://shop.test/login", "Sign in");

        let result = resolver
            .heal_on_failure(&elsewhere, "cart", "pay", "click intercepted")
            .await;
        assert_eq!(result, "");
        assert_eq!(healer.call_count(), 0);
        assert_eq!(store.get("cart", "pay"), "#pay");
    }

    #[tokio::test]
    async fn usage_probe_failure_heals_with_reason() {
        let store = store(&[("cart", "rows", ".row")]);
        let healer = FixedHealer::new(&store, &[("rows", "tr.item")]);
        let resolver = resolver(&store, healer.clone());
        let doc = cart_page().with_element(".row", 1).with_element("tr.item", 5);

        let locator = resolver
            .resolve_with_fallback(&doc, "cart", "rows", &LocatorUsage::Collect { min: 3 })
            .await;
        assert_eq!(locator, "tr.item");
        let calls = healer.calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0]
            .reason
            .as_deref()
            .unwrap()
            .contains("matched 1 element(s)"));
    }

    #[tokio::test]
    async fn fallback_does_not_heal_twice_after_failed_heal() {
        let store = store(&[("cart", "pay", ".old")]);
        let healer = FixedHealer::failing(&store);
        let resolver = resolver(&store, healer.clone());

        let locator = resolver
            .resolve_with_fallback(&cart_page(), "cart", "pay", &LocatorUsage::Click)
            .await;
        assert_eq!(locator, ".old");
        assert_eq!(healer.call_count(), 1);
    }

    #[tokio::test]
    async fn fallback_keeps_fresh_heal_even_if_usage_unmet() {
        let store = store(&[("cart", "rows", ".old")]);
        let healer = FixedHealer::new(&store, &[("rows", "tr.item")]);
        let resolver = resolver(&store, healer.clone());
        let doc = cart_page().with_element("tr.item", 1);

        let locator = resolver
            .resolve_with_fallback(&doc, "cart", "rows", &LocatorUsage::Collect { min: 3 })
            .await;
        assert_eq!(locator, "tr.item");
        assert_eq!(healer.call_count(), 1);
    }

    #[tokio::test]
    async fn auto_heal_retries_once_with_new_locator() {
        let store = store(&[("cart", "pay", "#pay")]);
        let healer = FixedHealer::new(&store, &[("pay", "#pay-v2")]);
        let resolver = resolver(&store, healer.clone());
        let doc = cart_page().with_element("#pay", 1);

        let attempts = Mutex::new(Vec::new());
        let result: Result<String, String> = resolver
            .with_auto_heal(&doc, "cart", "pay", |locator| {
                attempts.lock().push(locator.clone());
                async move {
                    if locator == "#pay" {
                        Err("element detached".to_string())
                    } else {
                        Ok(format!("clicked {locator}"))
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "clicked #pay-v2");
        assert_eq!(*attempts.lock(), vec!["#pay", "#pay-v2"]);
        assert_eq!(healer.calls.lock()[0].reason.as_deref(), Some("element detached"));
    }

    #[tokio::test]
    async fn auto_heal_gives_up_when_heal_changes_nothing() {
        let store = store(&[("cart", "pay", "#pay")]);
        let healer = FixedHealer::new(&store, &[("pay", "#pay")]);
        let resolver = resolver(&store, healer);
        let doc = cart_page().with_element("#pay", 1);

        let mut attempts = 0;
        let result: Result<(), String> = resolver
            .with_auto_heal(&doc, "cart", "pay", |_| {
                attempts += 1;
                async { Err("still broken".to_string()) }
            })
            .await;
        assert_eq!(result.unwrap_err(), "still broken");
        assert_eq!(attempts, 1);
    }
}
