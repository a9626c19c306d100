use std::{env, str::FromStr};

use anyhow::{Context, Result};
use log::{debug, error, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use uci_messenger::{Config, EngineType, Messenger, logging::setup_logger};

#[tokio::main]
async fn main() -> Result<()> {
    // start with "uci-messenger arasan 2>engine.log" to keep the log out of the UCI stream
    let mut config = Config::load()?;
    if let Some(engine) = env::args().nth(1) {
        config.engine = EngineType::from_str(&engine)?;
    }
    setup_logger(config.log_level()).context("installing logger")?;

    let engine_type = config.engine;
    let mut messenger = Messenger::with_config(config);
    messenger.set_response_handler(|line: String| println!("{line}"));
    messenger
        .start()
        .await
        .with_context(|| format!("starting {engine_type}"))?;
    info!(
        "{engine_type} {} ready - reading UCI commands from stdin ...",
        engine_type.version()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if let Err(e) = messenger.send_command(command) {
            error!("{e}");
            break;
        }
        if command == "quit" {
            debug!("quit received");
            break;
        }
    }

    messenger.stop().await?;
    info!("{engine_type} stopped, exiting");
    Ok(())
}
