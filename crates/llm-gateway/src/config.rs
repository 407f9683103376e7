//! Declarative provider configuration

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::backend::ModelBackend;
use crate::errors::ProviderError;
use crate::gemini::{GeminiBackend, GeminiConfig, DEFAULT_GEMINI_API_BASE};
use crate::health::{HealthMonitor, HealthSettings, ProviderHandle};
use crate::openai::{OpenAiCompatBackend, OpenAiCompatConfig, DEFAULT_OPENAI_API_BASE};
use crate::router::{BackoffPolicy, ModelChains, ProviderRouter};
use crate::types::ProviderMode;

#[derive(Debug, Error)]
pub enum GatewayConfigError {
    #[error("provider '{0}' is declared twice")]
    DuplicateProvider(String),

    #[error("provider '{0}' needs a model")]
    MissingModel(String),

    #[error("failed to build provider '{provider}': {source}")]
    Backend {
        provider: String,
        #[source]
        source: ProviderError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google Gemini; a key pool serving the model chains
    Gemini,
    /// OpenAI-compatible chat completions with one key and one model
    OpenaiCompatible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// Environment variable holding comma separated keys
    #[serde(default)]
    pub api_keys_env: Option<String>,
    /// Fixed model for single-key providers
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    /// Inline keys followed by keys from `api_keys_env`, trimmed, blanks dropped
    pub fn resolved_keys(&self) -> Vec<String> {
        let from_env = self
            .api_keys_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .unwrap_or_default();
        self.api_keys
            .iter()
            .map(String::as_str)
            .chain(from_env.split(','))
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(120))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub refresh_interval_secs: u64,
    pub ping_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 15 * 60,
            ping_timeout_secs: 10,
        }
    }
}

impl HealthConfig {
    pub fn settings(&self) -> HealthSettings {
        HealthSettings {
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            ping_timeout: Duration::from_secs(self.ping_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub providers: Vec<ProviderConfig>,
    pub model_chains: ModelChains,
    pub health: HealthConfig,
    pub backoff: BackoffPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            model_chains: default_model_chains(),
            health: HealthConfig::default(),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Chains used when the config file names none
pub fn default_model_chains() -> ModelChains {
    ModelChains::new()
        .with_chain("default", ["gemini-2.5-flash", "gemini-2.0-flash"])
        .with_chain(
            "vision",
            ["gemini-2.5-pro", "gemini-2.5-flash", "gemini-2.0-flash"],
        )
        .with_chain(
            "locator",
            ["gemini-2.5-pro", "gemini-2.5-flash", "gemini-2.0-flash"],
        )
}

impl GatewayConfig {
    /// Instantiate HTTP backends and wire the health monitor and router
    pub fn build_router(&self) -> Result<ProviderRouter, GatewayConfigError> {
        let mut seen = HashSet::new();
        let mut providers = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            if !seen.insert(provider.name.clone()) {
                return Err(GatewayConfigError::DuplicateProvider(provider.name.clone()));
            }
            let backend = build_backend(provider)?;
            let (mode, keys) = provider_mode(provider)?;
            providers.push((ProviderHandle::new(&provider.name, mode, backend), keys));
        }
        Ok(self.router_from(providers))
    }

    /// Wire a router from already constructed backends
    pub fn router_from(&self, providers: Vec<(ProviderHandle, Vec<String>)>) -> ProviderRouter {
        let health = Arc::new(HealthMonitor::new(providers, self.health.settings()));
        ProviderRouter::new(health, self.model_chains.clone(), self.backoff.clone())
    }
}

fn provider_mode(provider: &ProviderConfig) -> Result<(ProviderMode, Vec<String>), GatewayConfigError> {
    let mut keys = provider.resolved_keys();
    if keys.is_empty() {
        warn!(provider = %provider.name, "provider has no API keys; it will stay inactive");
    }
    match provider.kind {
        ProviderKind::Gemini => Ok((ProviderMode::MultiKey, keys)),
        ProviderKind::OpenaiCompatible => {
            let model = provider
                .model
                .clone()
                .ok_or_else(|| GatewayConfigError::MissingModel(provider.name.clone()))?;
            if keys.len() > 1 {
                warn!(provider = %provider.name, "single-key provider configured with several keys; using the first");
                keys.truncate(1);
            }
            Ok((ProviderMode::SingleKey { model }, keys))
        }
    }
}

fn build_backend(provider: &ProviderConfig) -> Result<Arc<dyn ModelBackend>, GatewayConfigError> {
    let wrap = |source| GatewayConfigError::Backend {
        provider: provider.name.clone(),
        source,
    };
    let backend: Arc<dyn ModelBackend> = match provider.kind {
        ProviderKind::Gemini => Arc::new(
            GeminiBackend::new(GeminiConfig {
                name: provider.name.clone(),
                api_base: provider
                    .api_base
                    .clone()
                    .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
                timeout: provider.timeout(),
            })
            .map_err(wrap)?,
        ),
        ProviderKind::OpenaiCompatible => Arc::new(
            OpenAiCompatBackend::new(OpenAiCompatConfig {
                name: provider.name.clone(),
                api_base: provider
                    .api_base
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string()),
                timeout: provider.timeout(),
            })
            .map_err(wrap)?,
        ),
    };
    Ok(backend)
}
