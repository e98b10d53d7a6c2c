use clap::Parser;
use snowflake_preview::{Config, SnowflakeConnector, config::init_tracing, preview};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(&config);

    let mut out = std::io::stdout().lock();
    preview::run(&config, &SnowflakeConnector, &mut out).await?;
    Ok(())
}
