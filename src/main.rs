#![cfg(not(tarpaulin_include))]
use clap::Parser;
use docview::{Config, app};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    log::debug!("{config:?}");

    // Start the web application
    app::run(config).await?;

    Ok(())
}
