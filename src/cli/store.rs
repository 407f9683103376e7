use anyhow::{bail, Result};
use clap::{Args, Subcommand};

use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct StoreArgs {
    #[command(subcommand)]
    pub action: StoreAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum StoreAction {
    /// Show every cached locator, or one context
    Show {
        /// Only this context
        #[arg(long)]
        context: Option<String>,
    },

    /// Print one cached locator
    Get {
        context: String,
        element_key: String,
    },
}

pub async fn cmd_store(args: StoreArgs, ctx: &CliContext) -> Result<()> {
    let store = ctx.store().await;
    match args.action {
        StoreAction::Show { context } => {
            let mut book = store.snapshot();
            if let Some(context) = context.as_deref() {
                book.retain(|name, _| name == context);
                if book.is_empty() {
                    bail!("context '{context}' has no cached locators");
                }
            }
            if ctx.output().print_structured(&book)? {
                return Ok(());
            }
            if book.is_empty() {
                println!("Locator store {} is empty", ctx.config().store_path.display());
                return Ok(());
            }
            for (context, locators) in &book {
                println!("{context} ({} keys)", locators.len());
                for (key, locator) in locators {
                    println!("  {key:<28} {locator}");
                }
            }
        }
        StoreAction::Get {
            context,
            element_key,
        } => {
            let locator = store.get(&context, &element_key);
            if locator.is_empty() {
                bail!("no locator cached for {context}/{element_key}");
            }
            println!("{locator}");
        }
    }
    Ok(())
}
