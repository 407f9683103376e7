//! Persisted locator knowledge: `{context: {element_key: locator}}`

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::StoreError;
use crate::types::{ContextLocators, LocatorBook};

/// Locator cache shared by every worker in the process.
///
/// Reads never touch disk. Writes are serialized in-process and merged into
/// whatever the file holds at save time, so two processes sharing the file
/// only clobber each other at `(context, key)` granularity.
#[derive(Debug)]
pub struct KnowledgeStore {
    path: Option<PathBuf>,
    book: RwLock<LocatorBook>,
    write_lock: Mutex<()>,
}

impl KnowledgeStore {
    /// Store without a backing file
    pub fn in_memory(book: LocatorBook) -> Self {
        Self {
            path: None,
            book: RwLock::new(book),
            write_lock: Mutex::new(()),
        }
    }

    /// Load the store at `path`. A missing or corrupt file is an empty store.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let book = read_book(&path).await;
        info!(
            path = %path.display(),
            contexts = book.len(),
            "locator store loaded"
        );
        Self {
            path: Some(path),
            book: RwLock::new(book),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Cached locator, or an empty string when unknown
    pub fn get(&self, context: &str, element_key: &str) -> String {
        self.book
            .read()
            .get(context)
            .and_then(|locators| locators.get(element_key))
            .cloned()
            .unwrap_or_default()
    }

    pub fn context(&self, context: &str) -> ContextLocators {
        self.book.read().get(context).cloned().unwrap_or_default()
    }

    /// True when the context holds at least one non-empty locator
    pub fn has_context(&self, context: &str) -> bool {
        self.book
            .read()
            .get(context)
            .map(|locators| locators.values().any(|value| !value.trim().is_empty()))
            .unwrap_or(false)
    }

    pub fn contexts(&self) -> Vec<String> {
        self.book.read().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> LocatorBook {
        self.book.read().clone()
    }

    pub async fn set(
        &self,
        context: &str,
        element_key: &str,
        locator: &str,
    ) -> Result<(), StoreError> {
        let mut update = ContextLocators::new();
        update.insert(element_key.to_string(), locator.to_string());
        self.set_many(context, update).await
    }

    /// Merge `update` into `context` and persist.
    ///
    /// Empty locators are dropped so a known-good value is never erased.
    pub async fn set_many(
        &self,
        context: &str,
        update: ContextLocators,
    ) -> Result<(), StoreError> {
        let update: ContextLocators = update
            .into_iter()
            .filter(|(_, locator)| !locator.trim().is_empty())
            .collect();
        if update.is_empty() {
            debug!(context, "nothing to write");
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let Some(path) = self.path.as_deref() else {
            merge_into(&mut self.book.write(), context, &update);
            return Ok(());
        };

        // Start from the file, not memory: another process may have written.
        let mut merged = read_book(path).await;
        merge_into(&mut merged, context, &update);
        let payload = serde_json::to_vec_pretty(&merged)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        write_atomic(path, &payload).await?;
        debug!(
            context,
            keys = update.len(),
            path = %path.display(),
            "locator store saved"
        );

        *self.book.write() = merged;
        Ok(())
    }
}

fn merge_into(book: &mut LocatorBook, context: &str, update: &ContextLocators) {
    let entry = book.entry(context.to_string()).or_default();
    for (key, locator) in update {
        entry.insert(key.clone(), locator.clone());
    }
}

async fn read_book(path: &Path) -> LocatorBook {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<LocatorBook>(&bytes) {
            Ok(book) => book,
            Err(err) => {
                warn!(%err, path = %path.display(), "locator store unreadable; starting empty");
                LocatorBook::new()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => LocatorBook::new(),
        Err(err) => {
            warn!(%err, path = %path.display(), "failed to read locator store");
            LocatorBook::new()
        }
    }
}

pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(data).await?;
    file.flush().await?;
    fs::rename(tmp, path).await
}
