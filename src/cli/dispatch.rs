use super::config::cmd_config;
use super::contexts::cmd_contexts;
use super::env::CliArgs;
use super::generate::cmd_generate;
use super::heal::cmd_heal;
use super::health::cmd_health;
use super::metrics::cmd_metrics;
use super::simplify::cmd_simplify;
use super::store::cmd_store;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Store(args) => cmd_store(args, ctx).await,
        Commands::Contexts(args) => cmd_contexts(args, ctx).await,
        Commands::Health => cmd_health(ctx).await,
        Commands::Generate(args) => cmd_generate(args, ctx).await,
        Commands::Heal(args) => cmd_heal(args, ctx).await,
        Commands::Simplify(args) => cmd_simplify(args, ctx).await,
        Commands::Config(args) => cmd_config(args, ctx).await,
        Commands::Metrics => cmd_metrics(ctx).await,
    }
}
