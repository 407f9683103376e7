//! Unified generate call with provider, model and key failover
//!
//! Providers are tried in health order. Multi-key providers walk the model
//! chain of the requested usage-context from best to cheapest, rotating
//! through the shared key pool for each model:
//! - soft rate limit: evict the key from the active pool (for every model),
//!   back off briefly and try the next key
//! - permanent auth failure: evict the key from the active and master pools
//! - transient unavailability: back off and retry the same key and model
//! - anything else: give up on the model and downgrade to the next one
//!
//! Single-key providers get one attempt each.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{ErrorClass, ProviderError, RouterError};
use crate::health::{mask_key, HealthMonitor, ProviderHandle};
use crate::metrics;
use crate::types::{
    ContentPart, GenerateResponse, GenerationConfig, ProviderMode, DEFAULT_USAGE_CONTEXT,
};

/// Retry and backoff knobs of the router
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Pause after a soft rate limit before the next key
    #[serde(with = "duration_ms", rename = "rate_limit_ms")]
    pub rate_limit: Duration,

    /// Pause before retrying a transiently unavailable provider
    #[serde(with = "duration_ms", rename = "unavailable_ms")]
    pub unavailable: Duration,

    /// Same-key retries on transient unavailability before the model is abandoned
    pub max_unavailable_retries: u32,

    /// Upper bound on distinct keys tried per model
    pub max_key_tries: usize,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            rate_limit: Duration::from_secs(1),
            unavailable: Duration::from_secs(8),
            max_unavailable_retries: 3,
            max_key_tries: 3,
        }
    }
}

impl BackoffPolicy {
    /// No sleeping; used by tests and dry runs
    pub fn immediate() -> Self {
        Self {
            rate_limit: Duration::ZERO,
            unavailable: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Ordered model preference lists keyed by usage-context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelChains {
    chains: HashMap<String, Vec<String>>,
}

impl ModelChains {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain(
        mut self,
        usage_context: impl Into<String>,
        models: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.chains.insert(
            usage_context.into(),
            models.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Chain for `usage_context`, falling back to the default chain
    pub fn for_usage(&self, usage_context: &str) -> &[String] {
        self.chains
            .get(usage_context)
            .or_else(|| self.chains.get(DEFAULT_USAGE_CONTEXT))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

pub struct ProviderRouter {
    health: Arc<HealthMonitor>,
    chains: ModelChains,
    backoff: BackoffPolicy,
}

impl ProviderRouter {
    pub fn new(health: Arc<HealthMonitor>, chains: ModelChains, backoff: BackoffPolicy) -> Self {
        Self {
            health,
            chains,
            backoff,
        }
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn chains(&self) -> &ModelChains {
        &self.chains
    }

    /// Run one logical generate call across every provider.
    pub async fn unified_generate(
        &self,
        content: &[ContentPart],
        config: &GenerationConfig,
        usage_context: &str,
    ) -> Result<GenerateResponse, RouterError> {
        self.health.ensure_initialized().await;

        let providers = self.health.ordered_providers();
        if providers.is_empty() {
            return Err(RouterError::NoProviders);
        }

        let mut last_error: Option<ProviderError> = None;
        let mut attempted: HashSet<String> = HashSet::new();

        for provider in &providers {
            if !self.health.is_active(&provider.name) {
                debug!(provider = %provider.name, "skipping inactive provider");
                continue;
            }
            let response = match &provider.mode {
                ProviderMode::MultiKey => {
                    self.try_multi_key(provider, content, config, usage_context, &mut last_error)
                        .await
                }
                ProviderMode::SingleKey { model } => {
                    attempted.insert(provider.name.clone());
                    match self.health.next_key(&provider.name) {
                        Some(key) => {
                            self.try_single_key(provider, model, &key, content, config, &mut last_error)
                                .await
                        }
                        None => None,
                    }
                }
            };
            if let Some(response) = response {
                return Ok(response);
            }
        }

        // A single-key provider that failed its health ping may still answer.
        for provider in &providers {
            let ProviderMode::SingleKey { model } = &provider.mode else {
                continue;
            };
            if attempted.contains(&provider.name) || self.health.swept_active(&provider.name) {
                continue;
            }
            let Some(key) = self.health.primary_key(&provider.name) else {
                continue;
            };
            info!(provider = %provider.name, "trying inactive provider as last resort");
            if let Some(response) = self
                .try_single_key(provider, model, &key, content, config, &mut last_error)
                .await
            {
                return Ok(response);
            }
        }

        warn!(
            usage_context,
            last_error = ?last_error,
            "all providers exhausted"
        );
        Err(RouterError::exhausted(last_error))
    }

    async fn try_multi_key(
        &self,
        provider: &ProviderHandle,
        content: &[ContentPart],
        config: &GenerationConfig,
        usage_context: &str,
        last_error: &mut Option<ProviderError>,
    ) -> Option<GenerateResponse> {
        let chain = self.chains.for_usage(usage_context);
        if chain.is_empty() {
            warn!(provider = %provider.name, usage_context, "no model chain configured");
            return None;
        }

        for (rank, model) in chain.iter().enumerate() {
            if rank > 0 {
                info!(provider = %provider.name, model = %model, "downgrading to next model");
            }
            let max_tries = self
                .backoff
                .max_key_tries
                .min(self.health.active_key_count(&provider.name));

            let mut tries = 0;
            'keys: while tries < max_tries {
                let Some(key) = self.health.next_key(&provider.name) else {
                    debug!(provider = %provider.name, model = %model, "key pool exhausted");
                    break 'keys;
                };
                tries += 1;

                let mut unavailable_retries = 0;
                loop {
                    let outcome = provider
                        .backend
                        .generate(model, &key, content, config)
                        .await;
                    match outcome {
                        Ok(response) if !response.is_empty() => {
                            metrics::record_attempt(&provider.name, model, "success");
                            debug!(provider = %provider.name, model = %model, key = %mask_key(&key), "generate succeeded");
                            return Some(response);
                        }
                        Ok(_) => {
                            metrics::record_attempt(&provider.name, model, "empty");
                            warn!(provider = %provider.name, model = %model, "provider returned empty text");
                            *last_error = Some(ProviderError::Other("empty response".to_string()));
                            continue 'keys;
                        }
                        Err(err) => {
                            let class = err.class();
                            metrics::record_attempt(&provider.name, model, class.name());
                            match class {
                                ErrorClass::SoftRateLimit => {
                                    self.health.mark_rate_limited(&provider.name, &key);
                                    *last_error = Some(err);
                                    tokio::time::sleep(self.backoff.rate_limit).await;
                                    continue 'keys;
                                }
                                ErrorClass::PermanentAuth => {
                                    self.health.mark_dead(&provider.name, &key);
                                    *last_error = Some(err);
                                    continue 'keys;
                                }
                                ErrorClass::TransientUnavailable => {
                                    if unavailable_retries >= self.backoff.max_unavailable_retries {
                                        warn!(provider = %provider.name, model = %model, %err, "provider still unavailable; abandoning model");
                                        *last_error = Some(err);
                                        break 'keys;
                                    }
                                    unavailable_retries += 1;
                                    debug!(provider = %provider.name, model = %model, attempt = unavailable_retries, "provider unavailable; retrying same key");
                                    *last_error = Some(err);
                                    tokio::time::sleep(self.backoff.unavailable).await;
                                }
                                ErrorClass::Other => {
                                    warn!(provider = %provider.name, model = %model, %err, "abandoning model");
                                    *last_error = Some(err);
                                    break 'keys;
                                }
                            }
                        }
                    }
                }
            }
        }
        None
    }

    async fn try_single_key(
        &self,
        provider: &ProviderHandle,
        model: &str,
        key: &str,
        content: &[ContentPart],
        config: &GenerationConfig,
        last_error: &mut Option<ProviderError>,
    ) -> Option<GenerateResponse> {
        match provider.backend.generate(model, key, content, config).await {
            Ok(response) if !response.is_empty() => {
                metrics::record_attempt(&provider.name, model, "success");
                Some(response)
            }
            Ok(_) => {
                metrics::record_attempt(&provider.name, model, "empty");
                *last_error = Some(ProviderError::Other("empty response".to_string()));
                None
            }
            Err(err) => {
                metrics::record_attempt(&provider.name, model, err.class().name());
                warn!(provider = %provider.name, model, %err, "single-key provider failed");
                *last_error = Some(err);
                None
            }
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
