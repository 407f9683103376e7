use std::path::PathBuf;

use action_locator::simplify::MarkupIndex;
use action_locator::LocatorSimplifier;
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tokio::fs;

use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct SimplifyArgs {
    /// Markup the locators are checked against
    #[arg(long, value_name = "FILE")]
    pub markup: PathBuf,

    /// Locators to simplify
    #[arg(required = true)]
    pub locators: Vec<String>,
}

#[derive(Serialize)]
struct SimplifiedLocator {
    original: String,
    complex: bool,
    simplified: Option<String>,
}

pub async fn cmd_simplify(args: SimplifyArgs, ctx: &CliContext) -> Result<()> {
    let markup = fs::read_to_string(&args.markup)
        .await
        .with_context(|| format!("reading markup {}", args.markup.display()))?;
    let index = MarkupIndex::build(&markup);
    let simplifier = LocatorSimplifier::default();

    let results: Vec<SimplifiedLocator> = args
        .locators
        .into_iter()
        .map(|original| SimplifiedLocator {
            complex: simplifier.is_complex(&original),
            simplified: simplifier.simplify(&original, &index),
            original,
        })
        .collect();

    if ctx.output().print_structured(&results)? {
        return Ok(());
    }
    for result in &results {
        let shown = result.simplified.as_deref().unwrap_or(&result.original);
        println!("{shown}");
    }
    Ok(())
}
