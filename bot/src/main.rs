mod commands;
mod config;
mod marketplace;
mod monitor;
mod telegram;

use anyhow::Result;
use commands::CommandHandler;
use config::Config;
use log::{error, info};
use marketplace::OpenSea;
use monitor::{Monitor, MonitorConfig, Scanner};
use opensea::Purchaser;
use std::sync::Arc;
use telegram::Telegram;

#[tokio::main]
async fn main() -> Result<()> {
    common::setup_env();
    let config = Config::from_env()?;
    info!("Loaded {config:?}");

    let client = opensea::Client::new(
        &config.opensea_api_key,
        &config.collection_slug,
        &config.chain,
    )?;
    let purchaser = Purchaser::new(&config.private_key, config.rpc_url.as_str())?;
    info!("Purchasing from {}", purchaser.address());
    let market = Arc::new(OpenSea::new(client, purchaser));

    let monitor_config = Arc::new(MonitorConfig::new(
        config.max_price_multiplier,
        config.check_interval_secs,
    )?);
    let scanner = Scanner::new(market.clone(), monitor_config, config.trait_name.as_str());

    let telegram = Telegram::new(&config.telegram_token)?;
    let handler = Arc::new(CommandHandler::new(
        Monitor::new(scanner),
        market,
        Arc::new(telegram.clone()),
        config.allowed_users,
    ));

    info!("🚀 Starting My Little Sniper bot...");
    tokio::select! {
        result = telegram.run(handler.clone()) => {
            if let Err(e) = &result {
                error!("Telegram transport stopped: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
    }

    handler.shutdown().await;
    Ok(())
}
