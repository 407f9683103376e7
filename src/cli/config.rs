use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use serde_json::Value as JsonValue;

use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Get one configuration value by dotted key (e.g. gateway.backoff)
    Get {
        /// Configuration key
        key: String,
    },

    /// Validate the effective configuration
    Validate,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext) -> Result<()> {
    let path = ctx.config_path();
    let config = ctx.config();
    match args.action {
        ConfigAction::Show => {
            if ctx.output().print_structured(config)? {
                return Ok(());
            }
            println!("Current configuration ({}):", path.display());
            println!("{}", serde_yaml::to_string(config)?);
        }
        ConfigAction::Get { key } => {
            let json = serde_json::to_value(config)?;
            let segments = split_key(&key)?;
            match get_json_value(&json, &segments) {
                Some(value) => print!("{}", serde_yaml::to_string(value)?),
                None => bail!("{} not found in configuration", key),
            }
        }
        ConfigAction::Validate => {
            let issues = config.validate();
            if issues.is_empty() {
                println!("Configuration {} is valid", path.display());
                return Ok(());
            }
            for issue in &issues {
                println!("- {issue}");
            }
            bail!("{} configuration issue(s) in {}", issues.len(), path.display());
        }
    }
    Ok(())
}

fn split_key(key: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = key
        .split('.')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        bail!("configuration key cannot be empty");
    }
    Ok(segments)
}

fn get_json_value<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut current = value;
    for segment in path {
        match current {
            JsonValue::Object(map) => {
                current = map.get(*segment)?;
            }
            JsonValue::Array(items) => {
                current = items.get(segment.parse::<usize>().ok()?)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_nested_keys_and_indices() {
        let doc = json!({
            "gateway": {
                "backoff": {"rate_limit_ms": 1000},
                "providers": [{"name": "gemini"}]
            }
        });
        assert_eq!(
            get_json_value(&doc, &["gateway", "backoff", "rate_limit_ms"]),
            Some(&JsonValue::from(1000))
        );
        assert_eq!(
            get_json_value(&doc, &["gateway", "providers", "0", "name"]),
            Some(&JsonValue::from("gemini"))
        );
        assert!(get_json_value(&doc, &["gateway", "missing"]).is_none());
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(split_key("..").is_err());
        assert_eq!(split_key("a.b").unwrap(), vec!["a", "b"]);
    }
}
