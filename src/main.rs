use anyhow::Context;
use youtube_download_service::{config::Config, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let config = Config::from_env().context("Invalid configuration")?;
    config.validate().context("Invalid configuration")?;

    youtube_download_service::run(config).await
}
