use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tether_cli::cli::app::run().await
}
