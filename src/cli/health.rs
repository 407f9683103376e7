use anyhow::Result;

use crate::cli::context::CliContext;

pub async fn cmd_health(ctx: &CliContext) -> Result<()> {
    let router = ctx.router().await?;
    let health = router.health();
    health.refresh().await;
    let report = health.snapshot();

    if ctx.output().print_structured(&report)? {
        return Ok(());
    }
    if report.is_empty() {
        println!("No providers configured");
        return Ok(());
    }

    println!("Provider Health");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for provider in &report {
        let state = if provider.is_active { "active" } else { "inactive" };
        println!(
            "{:<16} {:<9} keys {}/{} active, {} dead",
            provider.provider, state, provider.active_keys, provider.total_keys, provider.dead_keys
        );
        if let Some(at) = provider.last_ping_time {
            println!("{:<16} last ping {}", "", at.to_rfc3339());
        }
    }
    Ok(())
}
