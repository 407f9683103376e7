use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct ContextsArgs {
    /// Print the full expected key schema of one context
    #[arg(long, value_name = "CONTEXT")]
    pub schema: Option<String>,
}

#[derive(Serialize)]
struct ContextSummary {
    name: String,
    description: Option<String>,
    url_patterns: Vec<String>,
    title_patterns: Vec<String>,
    required_locators: Vec<String>,
    cached_keys: usize,
}

pub async fn cmd_contexts(args: ContextsArgs, ctx: &CliContext) -> Result<()> {
    let registry = ctx.contexts().await?;

    if let Some(context) = args.schema {
        let schema = registry.expected_schema(&context);
        if ctx.output().print_structured(&schema)? {
            return Ok(());
        }
        println!("Expected keys for {context}:");
        for (key, description) in &schema {
            println!("  {key:<28} {description}");
        }
        return Ok(());
    }

    let store = ctx.store().await;
    let summaries: Vec<ContextSummary> = registry
        .names()
        .into_iter()
        .filter_map(|name| {
            let profile = registry.profile(&name)?.clone();
            Some(ContextSummary {
                cached_keys: store.context(&name).len(),
                name,
                description: profile.description,
                url_patterns: profile.url_patterns,
                title_patterns: profile.title_patterns,
                required_locators: profile.required_locators,
            })
        })
        .collect();

    if ctx.output().print_structured(&summaries)? {
        return Ok(());
    }
    if summaries.is_empty() {
        println!("No contexts declared");
        return Ok(());
    }
    for summary in &summaries {
        println!("{} ({} cached keys)", summary.name, summary.cached_keys);
        if let Some(description) = summary.description.as_deref() {
            println!("  {description}");
        }
        if !summary.required_locators.is_empty() {
            println!("  required: {}", summary.required_locators.join(", "));
        }
        if !summary.url_patterns.is_empty() {
            println!("  url:      {}", summary.url_patterns.join(", "));
        }
        if !summary.title_patterns.is_empty() {
            println!("  title:    {}", summary.title_patterns.join(", "));
        }
    }
    Ok(())
}
