use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    locator_heal_cli::cli::run().await
}
