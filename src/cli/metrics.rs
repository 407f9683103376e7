use anyhow::Result;

use crate::cli::context::CliContext;
use crate::metrics::{global_registry, register_metrics, render_metrics};

pub async fn cmd_metrics(_ctx: &CliContext) -> Result<()> {
    register_metrics();
    print!("{}", render_metrics(global_registry())?);
    Ok(())
}
