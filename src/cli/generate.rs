use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use llm_gateway::{ContentPart, GenerationConfig};
use serde_json::json;
use tokio::fs;

use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct GenerateArgs {
    /// Prompt text
    pub prompt: String,

    /// Usage-context selecting the model chain
    #[arg(long, default_value = "default")]
    pub usage: String,

    /// PNG image attached after the prompt
    #[arg(long, value_name = "FILE")]
    pub image: Option<PathBuf>,

    /// Ask for a JSON object response
    #[arg(long)]
    pub structured: bool,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub max_output_tokens: Option<u32>,
}

pub async fn cmd_generate(args: GenerateArgs, ctx: &CliContext) -> Result<()> {
    let mut content = vec![ContentPart::text(args.prompt)];
    if let Some(path) = args.image.as_ref() {
        let data = fs::read(path)
            .await
            .with_context(|| format!("reading image {}", path.display()))?;
        content.push(ContentPart::png(data));
    }

    let mut config = GenerationConfig::default();
    if let Some(temperature) = args.temperature {
        config = config.with_temperature(temperature);
    }
    if let Some(max) = args.max_output_tokens {
        config = config.with_max_output_tokens(max);
    }
    if args.structured {
        config = config.structured();
    }

    let router = ctx.router().await?;
    let response = router
        .unified_generate(&content, &config, &args.usage)
        .await
        .context("generation failed on every provider")?;

    let view = json!({ "text": response.text, "raw_payload": response.raw_payload });
    if ctx.output().print_structured(&view)? {
        return Ok(());
    }
    println!("{}", response.text);
    Ok(())
}
