//! AI-driven locator re-discovery for one context

use std::sync::Arc;

use async_trait::async_trait;
use llm_gateway::{ContentPart, GenerationConfig, ProviderRouter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::ContextRegistry;
use crate::document::Document;
use crate::errors::LocatorError;
use crate::metrics;
use crate::prompt::PromptBuilder;
use crate::response::parse_locator_map;
use crate::simplify::LocatorSimplifier;
use crate::snapshot::SnapshotStore;
use crate::store::KnowledgeStore;
use crate::types::{ContextLocators, HealOptions, HealOutcome, HealRequest};

/// Self-healer trait
#[async_trait]
pub trait SelfHealer: Send + Sync {
    /// Re-discover the locators of `context` from the live document
    async fn heal(
        &self,
        document: &dyn Document,
        context: &str,
        options: HealOptions,
    ) -> Result<HealOutcome, LocatorError>;
}

/// Usage-contexts and sampling for the two heal passes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealerSettings {
    pub inventory_usage: String,
    pub locator_usage: String,
    pub inventory_temperature: Option<f32>,
    pub locator_temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl Default for HealerSettings {
    fn default() -> Self {
        Self {
            inventory_usage: "vision".to_string(),
            locator_usage: "locator".to_string(),
            inventory_temperature: Some(0.2),
            locator_temperature: Some(0.0),
            max_output_tokens: None,
        }
    }
}

impl HealerSettings {
    fn generation_config(&self, temperature: Option<f32>) -> GenerationConfig {
        let mut config = GenerationConfig::default();
        if let Some(temperature) = temperature {
            config = config.with_temperature(temperature);
        }
        if let Some(max) = self.max_output_tokens {
            config = config.with_max_output_tokens(max);
        }
        config
    }
}

/// Snapshot, two-pass prompt, parse, simplify, merge.
pub struct HealingOrchestrator {
    store: Arc<KnowledgeStore>,
    router: Arc<ProviderRouter>,
    contexts: Arc<ContextRegistry>,
    snapshots: SnapshotStore,
    prompts: PromptBuilder,
    simplifier: LocatorSimplifier,
    settings: HealerSettings,
}

impl HealingOrchestrator {
    pub fn new(
        store: Arc<KnowledgeStore>,
        router: Arc<ProviderRouter>,
        contexts: Arc<ContextRegistry>,
        snapshots: SnapshotStore,
    ) -> Self {
        Self {
            store,
            router,
            contexts,
            snapshots,
            prompts: PromptBuilder::default(),
            simplifier: LocatorSimplifier::default(),
            settings: HealerSettings::default(),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_simplifier(mut self, simplifier: LocatorSimplifier) -> Self {
        self.simplifier = simplifier;
        self
    }

    pub fn with_settings(mut self, settings: HealerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    pub fn contexts(&self) -> &Arc<ContextRegistry> {
        &self.contexts
    }

    async fn run(
        &self,
        document: &dyn Document,
        context: &str,
        options: HealOptions,
    ) -> Result<HealOutcome, LocatorError> {
        if !options.force && self.store.has_context(context) {
            debug!(context, "locators cached; heal skipped");
            return Ok(HealOutcome::Skipped {
                reason: format!("context `{context}` already has cached locators"),
            });
        }

        info!(
            context,
            element = options.element_key.as_deref().unwrap_or("-"),
            reason = options.reason.as_deref().unwrap_or("-"),
            "healing locators"
        );
        let snapshot = self.snapshots.capture(document, context).await?;
        let request = HealRequest {
            context: context.to_string(),
            element_key: options.element_key,
            failure_reason: options.reason,
            markup_snapshot: snapshot.markup,
            screenshot_snapshot: snapshot.screenshot,
        };

        let mut inventory_content = vec![ContentPart::text(self.prompts.inventory_prompt(&request))];
        if !request.screenshot_snapshot.is_empty() {
            inventory_content.push(ContentPart::png(request.screenshot_snapshot.clone()));
        }
        let inventory = self
            .router
            .unified_generate(
                &inventory_content,
                &self.settings.generation_config(self.settings.inventory_temperature),
                &self.settings.inventory_usage,
            )
            .await?;
        debug!(context, chars = inventory.text.len(), "visual inventory received");

        let schema = self.contexts.expected_schema(context);
        let locator_prompt = self
            .prompts
            .locator_prompt(&request, &inventory.text, &schema);
        let reply = self
            .router
            .unified_generate(
                &[ContentPart::text(locator_prompt)],
                &self
                    .settings
                    .generation_config(self.settings.locator_temperature)
                    .structured(),
                &self.settings.locator_usage,
            )
            .await?;

        let mut locators: ContextLocators = match parse_locator_map(&reply.text) {
            Ok(map) => map
                .into_iter()
                .filter(|(_, locator)| !locator.is_empty())
                .collect(),
            Err(err) => {
                warn!(context, %err, "heal response unusable; store unchanged");
                return Ok(HealOutcome::Aborted {
                    reason: err.to_string(),
                });
            }
        };
        if locators.is_empty() {
            warn!(context, "heal response mapped no elements; store unchanged");
            return Ok(HealOutcome::Aborted {
                reason: "response mapped no elements".to_string(),
            });
        }

        let simplified = self
            .simplifier
            .simplify_all(&mut locators, &request.markup_snapshot);
        self.store.set_many(context, locators.clone()).await?;
        info!(
            context,
            keys = locators.len(),
            simplified,
            "locators healed"
        );
        Ok(HealOutcome::Healed {
            updated: locators,
            simplified,
        })
    }
}

#[async_trait]
impl SelfHealer for HealingOrchestrator {
    async fn heal(
        &self,
        document: &dyn Document,
        context: &str,
        options: HealOptions,
    ) -> Result<HealOutcome, LocatorError> {
        let result = self.run(document, context, options).await;
        match &result {
            Ok(outcome) => metrics::record_heal(context, outcome.label()),
            Err(_) => metrics::record_heal(context, "error"),
        }
        result
    }
}
