use std::path::{Path, PathBuf};
use std::sync::Arc;

use action_locator::{
    ContextRegistry, HealingOrchestrator, KnowledgeStore, PromptBuilder, SnapshotStore,
};
use anyhow::{Context, Result};
use llm_gateway::ProviderRouter;
use tokio::sync::OnceCell;
use tracing::warn;

use super::output::OutputFormat;
use crate::config::Config;

/// Lazily built runtime objects shared by the commands of one invocation
pub struct CliContext {
    config: Arc<Config>,
    config_path: PathBuf,
    output: OutputFormat,
    store: OnceCell<Arc<KnowledgeStore>>,
    contexts: OnceCell<Arc<ContextRegistry>>,
    router: OnceCell<Arc<ProviderRouter>>,
}

impl CliContext {
    pub fn new(config: Config, config_path: PathBuf, output: OutputFormat) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            output,
            store: OnceCell::new(),
            contexts: OnceCell::new(),
            router: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &Config {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn output(&self) -> &OutputFormat {
        &self.output
    }

    pub async fn store(&self) -> Arc<KnowledgeStore> {
        self.store
            .get_or_init(|| async {
                Arc::new(KnowledgeStore::load(self.config.store_path.clone()).await)
            })
            .await
            .clone()
    }

    /// Context profiles; a missing profile file means no declared contexts
    pub async fn contexts(&self) -> Result<Arc<ContextRegistry>> {
        self.contexts
            .get_or_try_init(|| async {
                let registry = match self.config.contexts_file.as_deref() {
                    Some(path) if path.exists() => ContextRegistry::load(path)
                        .with_context(|| format!("loading contexts from {}", path.display()))?,
                    Some(path) => {
                        warn!(path = %path.display(), "contexts file not found; no contexts declared");
                        ContextRegistry::new()
                    }
                    None => ContextRegistry::new(),
                };
                Ok::<_, anyhow::Error>(Arc::new(registry))
            })
            .await
            .map(Arc::clone)
    }

    pub async fn router(&self) -> Result<Arc<ProviderRouter>> {
        self.router
            .get_or_try_init(|| async {
                let router = self
                    .config
                    .gateway
                    .build_router()
                    .context("building provider router")?;
                Ok::<_, anyhow::Error>(Arc::new(router))
            })
            .await
            .map(Arc::clone)
    }

    pub fn snapshots(&self) -> SnapshotStore {
        match self.config.snapshot_dir.as_ref() {
            Some(dir) => SnapshotStore::new(dir.clone()),
            None => SnapshotStore::disabled(),
        }
    }

    pub async fn healer(&self) -> Result<HealingOrchestrator> {
        Ok(HealingOrchestrator::new(
            self.store().await,
            self.router().await?,
            self.contexts().await?,
            self.snapshots(),
        )
        .with_prompts(PromptBuilder::new(self.config.max_markup_chars))
        .with_settings(self.config.healer.clone()))
    }
}
