use std::process::ExitCode;
use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, info};

use wooper_bot::bot::{BotState, register_commands, run};
use wooper_bot::config::{Config, DEFAULT_CONFIG_PATH};
use wooper_bot::images::ImageIndex;
use wooper_bot::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);
    let log = logging::init(&config, Some(bot.clone()));

    info!("🚀 Starting wooper-bot...");
    info!("Loaded config from {config_path}");
    if let Some(ref path) = log.log_file {
        info!("Logging to {}", path.display());
    }

    let code = serve(bot, &config).await;
    log.shutdown().await;
    code
}

async fn serve(bot: Bot, config: &Config) -> ExitCode {
    let index = match ImageIndex::build(&config.image_dir) {
        Ok(index) => index,
        Err(e) => {
            error!("Image index error: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Indexed {} images in {} categories from {}",
        index.total_images(),
        index.len(),
        config.image_dir.display()
    );

    if let Err(e) = register_commands(&bot).await {
        error!("Failed to register bot commands: {e}");
        return ExitCode::FAILURE;
    }

    let state = Arc::new(BotState::new(index, config));
    info!("Bot initialized, prefix '{}'", config.command_prefix);

    run(bot, state).await;

    info!("Shut down");
    ExitCode::SUCCESS
}
