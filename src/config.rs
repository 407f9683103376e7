//! Application configuration

use std::path::PathBuf;
use std::time::Duration;

use action_locator::HealerSettings;
use llm_gateway::{GatewayConfig, ProviderKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Locator knowledge file (`{context: {element_key: locator}}`)
    pub store_path: PathBuf,

    /// Where heal snapshots are written; unset keeps them in memory
    pub snapshot_dir: Option<PathBuf>,

    /// Context profile YAML
    pub contexts_file: Option<PathBuf>,

    /// Visibility wait used by validation and context checks
    pub validator_timeout_ms: u64,

    /// Upper bound on markup characters sent to the locator pass
    pub max_markup_chars: usize,

    pub healer: HealerSettings,

    pub gateway: GatewayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("data/locators.json"),
            snapshot_dir: Some(PathBuf::from("data/snapshots")),
            contexts_file: Some(PathBuf::from("config/contexts.yaml")),
            validator_timeout_ms: 3_000,
            max_markup_chars: action_locator::prompt::DEFAULT_MAX_MARKUP_CHARS,
            healer: HealerSettings::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Config {
    pub fn validator_timeout(&self) -> Duration {
        Duration::from_millis(self.validator_timeout_ms)
    }

    /// Problems that would make the runtime misbehave; empty when valid
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.validator_timeout_ms == 0 {
            issues.push("validator_timeout_ms must be greater than zero".to_string());
        }
        if self.max_markup_chars == 0 {
            issues.push("max_markup_chars must be greater than zero".to_string());
        }
        if self.gateway.providers.is_empty() {
            issues.push("gateway.providers is empty; every heal will fail".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.gateway.providers {
            if !seen.insert(provider.name.as_str()) {
                issues.push(format!("provider '{}' is declared twice", provider.name));
            }
            if provider.resolved_keys().is_empty() {
                issues.push(format!("provider '{}' has no API keys", provider.name));
            }
            if provider.kind == ProviderKind::OpenaiCompatible && provider.model.is_none() {
                issues.push(format!("provider '{}' needs a model", provider.name));
            }
        }

        for usage in [&self.healer.inventory_usage, &self.healer.locator_usage] {
            if self.gateway.model_chains.for_usage(usage).is_empty() {
                issues.push(format!(
                    "no model chain for usage '{usage}' and no default chain"
                ));
            }
        }
        issues
    }
}
