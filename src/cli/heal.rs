use std::path::PathBuf;

use action_locator::{HealOptions, HealOutcome, MemoryDocument, SelfHealer, SnapshotKind};
use anyhow::{bail, Context, Result};
use clap::Args;
use tokio::fs;
use tracing::info;

use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct HealArgs {
    /// Context to heal
    pub context: String,

    /// Saved page markup; defaults to the newest snapshot of the context
    #[arg(long, value_name = "FILE")]
    pub markup: Option<PathBuf>,

    /// Saved full-page screenshot (PNG); defaults to the newest snapshot
    #[arg(long, value_name = "FILE")]
    pub screenshot: Option<PathBuf>,

    /// Element whose failure prompted the heal
    #[arg(long)]
    pub element: Option<String>,

    /// Heal even when the context already has cached locators
    #[arg(long)]
    pub force: bool,
}

pub async fn cmd_heal(args: HealArgs, ctx: &CliContext) -> Result<()> {
    let snapshots = ctx.snapshots();
    let markup_path = match args.markup {
        Some(path) => path,
        None => match snapshots.latest(&args.context, SnapshotKind::Markup).await {
            Some(path) => {
                info!(path = %path.display(), "using newest markup snapshot");
                path
            }
            None => bail!(
                "no saved markup snapshot for {}; pass --markup",
                args.context
            ),
        },
    };
    let screenshot_path = match args.screenshot {
        Some(path) => Some(path),
        None => snapshots.latest(&args.context, SnapshotKind::Screenshot).await,
    };

    let markup = fs::read_to_string(&markup_path)
        .await
        .with_context(|| format!("reading markup {}", markup_path.display()))?;
    let screenshot = match screenshot_path.as_ref() {
        Some(path) => fs::read(path)
            .await
            .with_context(|| format!("reading screenshot {}", path.display()))?,
        None => Vec::new(),
    };
    let document = MemoryDocument::new(markup_path.display().to_string(), args.context.clone())
        .with_markup(markup)
        .with_screenshot(screenshot);

    let options = HealOptions {
        force: args.force,
        element_key: args.element,
        reason: Some("offline heal from saved snapshot".to_string()),
    };
    let healer = ctx.healer().await?;
    let outcome = healer
        .heal(&document, &args.context, options)
        .await
        .with_context(|| format!("healing context {}", args.context))?;

    if ctx.output().print_structured(&outcome)? {
        return Ok(());
    }
    match outcome {
        HealOutcome::Healed {
            updated,
            simplified,
        } => {
            println!(
                "Healed {} ({} keys, {} simplified)",
                args.context,
                updated.len(),
                simplified
            );
            for (key, locator) in &updated {
                println!("  {key:<28} {locator}");
            }
        }
        HealOutcome::Skipped { reason } => println!("Skipped: {reason}"),
        HealOutcome::Aborted { reason } => bail!("heal aborted: {reason}"),
    }
    Ok(())
}
