//! Page snapshots captured for a heal: cleaned markup plus a screenshot

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::fs;
use tracing::{debug, warn};

use crate::document::Document;
use crate::errors::LocatorError;
use crate::store::write_atomic;

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("script regex"));
static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").expect("style regex"));
static SVG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<svg\b[^>]*>.*?</svg\s*>").expect("svg regex"));
static NOSCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<noscript\b[^>]*>.*?</noscript\s*>").expect("noscript regex"));
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex"));
static STYLE_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+style\s*=\s*(?:"[^"]*"|'[^']*')"#).expect("style attribute regex")
});
static BETWEEN_TAGS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+<").expect("tag gap regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Strip everything a locator prompt never needs
pub fn clean_markup(markup: &str) -> String {
    let mut cleaned = markup.to_string();
    for re in [&*SCRIPT_RE, &*STYLE_RE, &*SVG_RE, &*NOSCRIPT_RE, &*COMMENT_RE, &*STYLE_ATTR_RE] {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }
    let cleaned = BETWEEN_TAGS_RE.replace_all(&cleaned, "><");
    WHITESPACE_RE.replace_all(&cleaned, " ").trim().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Markup,
    Screenshot,
}

impl SnapshotKind {
    pub fn extension(self) -> &'static str {
        match self {
            SnapshotKind::Markup => "html",
            SnapshotKind::Screenshot => "png",
        }
    }
}

/// One captured page
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub markup: String,
    pub screenshot: Vec<u8>,
    pub markup_path: Option<PathBuf>,
    pub screenshot_path: Option<PathBuf>,
}

/// Writes `<context>_<timestamp>.{html,png}` under a directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: Option<PathBuf>,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Keep snapshots in memory only
    pub fn disabled() -> Self {
        Self { root: None }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub async fn capture(
        &self,
        document: &dyn Document,
        context: &str,
    ) -> Result<PageSnapshot, LocatorError> {
        let screenshot = document.capture_screenshot().await?;
        let markup = clean_markup(&document.capture_markup().await?);

        let mut snapshot = PageSnapshot {
            markup,
            screenshot,
            markup_path: None,
            screenshot_path: None,
        };
        let Some(root) = self.root.as_deref() else {
            return Ok(snapshot);
        };

        fs::create_dir_all(root)
            .await
            .map_err(|err| LocatorError::Snapshot(format!("{}: {err}", root.display())))?;
        let stem = format!(
            "{}_{}",
            sanitize_component(context),
            Utc::now().format("%Y%m%d_%H%M%S%3f")
        );
        let markup_path = root.join(format!("{stem}.{}", SnapshotKind::Markup.extension()));
        let screenshot_path = root.join(format!("{stem}.{}", SnapshotKind::Screenshot.extension()));

        write_atomic(&markup_path, snapshot.markup.as_bytes())
            .await
            .map_err(|err| LocatorError::Snapshot(format!("{}: {err}", markup_path.display())))?;
        write_atomic(&screenshot_path, &snapshot.screenshot)
            .await
            .map_err(|err| {
                LocatorError::Snapshot(format!("{}: {err}", screenshot_path.display()))
            })?;
        debug!(context, path = %markup_path.display(), "page snapshot written");

        snapshot.markup_path = Some(markup_path);
        snapshot.screenshot_path = Some(screenshot_path);
        Ok(snapshot)
    }

    /// Most recently modified snapshot of `kind` for `context`
    pub async fn latest(&self, context: &str, kind: SnapshotKind) -> Option<PathBuf> {
        let root = self.root.as_deref()?;
        let prefix = format!("{}_", sanitize_component(context));
        let mut entries = match fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(%err, path = %root.display(), "failed to list snapshots");
                }
                return None;
            }
        };

        let mut best: Option<(SystemTime, PathBuf)> = None;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let matches = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| {
                    name.starts_with(&prefix) && name.ends_with(&format!(".{}", kind.extension()))
                })
                .unwrap_or(false);
            if !matches {
                continue;
            }
            let Ok(modified) = entry.metadata().await.and_then(|meta| meta.modified()) else {
                continue;
            };
            if best.as_ref().map(|(time, _)| modified > *time).unwrap_or(true) {
                best = Some((modified, path));
            }
        }
        best.map(|(_, path)| path)
    }
}

fn sanitize_component(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "default".to_string();
    }
    trimmed
        .chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' => ch,
            '-' | '_' => ch,
            _ => '-',
        })
        .collect()
}
