//! Telegram front end: commands, routing and update handlers.

pub mod commands;
pub mod handlers;
pub mod router;

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

use crate::config::Config;
use crate::images::ImageIndex;

pub use commands::Command;
pub use router::Route;

/// Shared, read-only state handed to every handler.
pub struct BotState {
    pub index: ImageIndex,
    pub command_prefix: String,
    pub request_timeout: Duration,
}

impl BotState {
    pub fn new(index: ImageIndex, config: &Config) -> Self {
        Self {
            index,
            command_prefix: config.command_prefix.clone(),
            request_timeout: config.request_timeout,
        }
    }
}

/// Publish the command list so clients can suggest `/image` and friends.
pub async fn register_commands(bot: &Bot) -> ResponseResult<()> {
    bot.set_my_commands(Command::bot_commands()).await?;
    for command in Command::bot_commands() {
        info!("Registered bot command: /{}", command.command);
    }
    Ok(())
}

/// Resolves with the signal name once the process is asked to stop.
///
/// Handlers are registered before this returns, so a signal sent right
/// after the call is not lost.
#[cfg(unix)]
pub fn shutdown_signal() -> io::Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    Ok(async move {
        tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
        }
    })
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> io::Result<impl Future<Output = &'static str>> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl-C"
    })
}

/// Dispatch updates until SIGINT or SIGTERM.
pub async fn run(bot: Bot, state: Arc<BotState>) {
    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handlers::handle_command),
                )
                .branch(dptree::endpoint(handlers::handle_message)),
        )
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback));

    let stop = shutdown_signal();
    let mut builder = Dispatcher::builder(bot, handler).dependencies(dptree::deps![state]);
    if let Err(ref e) = stop {
        warn!("Cannot listen for SIGTERM, falling back to Ctrl-C only: {e}");
        builder = builder.enable_ctrlc_handler();
    }
    let mut dispatcher = builder.build();

    if let Ok(stop) = stop {
        let token = dispatcher.shutdown_token();
        tokio::spawn(async move {
            let name = stop.await;
            info!("Received {name}, shutting down");
            match token.shutdown() {
                Ok(done) => done.await,
                Err(e) => warn!("Dispatcher was not running: {e:?}"),
            }
        });
    }

    dispatcher.dispatch().await;
}
