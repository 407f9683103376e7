use std::env;
use std::fs as stdfs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

const APP_DIR: &str = "locator-heal";

/// Provider key variables from `config/local.env`; the process environment wins
pub fn load_local_env_overrides() {
    load_env_file(Path::new("config/local.env"));
}

/// Apply the entries of an env file that are not already set.
/// Returns how many variables were exported.
pub fn load_env_file(path: &Path) -> usize {
    let contents = match stdfs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(err) => {
            warn!(path = %path.display(), ?err, "failed to read env overrides");
            return 0;
        }
    };

    let mut exported = 0;
    for entry in parse_env_entries(&contents) {
        match entry {
            Ok((key, value)) => {
                if env::var_os(&key).is_some() {
                    continue;
                }
                env::set_var(&key, value);
                exported += 1;
            }
            Err(line) => warn!(path = %path.display(), line, "malformed env entry skipped"),
        }
    }
    info!(path = %path.display(), exported, "environment overrides applied");
    exported
}

/// `KEY=VALUE` entries (optionally `export`-prefixed); `Err` carries the
/// 1-based number of a line that is not an assignment.
fn parse_env_entries(contents: &str) -> Vec<Result<(String, String), usize>> {
    contents
        .lines()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                return Some(Err(idx + 1));
            };
            let key = key.trim();
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Some(Err(idx + 1));
            }
            Some(Ok((key.to_string(), env_value(value.trim()))))
        })
        .collect()
}

/// Double quotes honour `\n \r \t \" \\`; single quotes are literal;
/// bare values stop at an inline ` #` comment.
fn env_value(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return raw[1..raw.len() - 1].to_string();
    }
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        let mut out = String::with_capacity(raw.len());
        let mut chars = raw[1..raw.len() - 1].chars();
        while let Some(ch) = chars.next() {
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        return out;
    }
    match raw.find(" #") {
        Some(idx) => raw[..idx].trim_end().to_string(),
        None => raw.to_string(),
    }
}

/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
}

/// Explicit path, else `./config/config.yaml`, else the user config dir.
/// A missing file yields defaults.
pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => {
            let local_config = PathBuf::from("config/config.yaml");
            if local_config.exists() {
                local_config
            } else {
                let mut path = dirs::config_dir().context("Failed to get config directory")?;
                path.push(APP_DIR);
                path.push("config.yaml");
                path
            }
        }
    };

    if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;

        info!("Loaded configuration from: {}", config_path.display());
        Ok(LoadedConfig {
            config,
            path: config_path,
        })
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        Ok(LoadedConfig {
            config: Config::default(),
            path: config_path,
        })
    }
}
