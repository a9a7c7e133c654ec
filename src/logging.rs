//! Log output setup: stdout, an append-only file at
//! `<data_dir>/logs/wooper.log`, and optionally a Telegram chat.

use std::path::PathBuf;

use teloxide::Bot;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::config::{Config, LogLevel};
use crate::telegram_log::{TelegramLogHandle, TelegramLogLayer};

const LOG_FILE_NAME: &str = "wooper.log";

/// Keeps the log writers alive. Call [`LogGuard::shutdown`] before exiting.
pub struct LogGuard {
    file: Option<WorkerGuard>,
    telegram: Option<TelegramLogHandle>,
    pub log_file: Option<PathBuf>,
}

impl LogGuard {
    /// Send lines still batched for Telegram, then flush the log file.
    pub async fn shutdown(self) {
        if let Some(telegram) = self.telegram {
            telegram.shutdown().await;
        }
        drop(self.file);
    }
}

/// Filter built from the configured level, refined by `RUST_LOG` directives.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.as_tracing().into())
        .from_env_lossy()
}

/// Install the global subscriber described by `config`.
///
/// `bot` is only used when `log_chat_id` is set. Must run inside a tokio
/// runtime when forwarding to Telegram.
pub fn init(config: &Config, bot: Option<Bot>) -> LogGuard {
    let log_dir = config.data_dir.join("logs");
    let file_writer = std::fs::create_dir_all(&log_dir)
        .and_then(|_| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_dir.join(LOG_FILE_NAME))
        })
        .map_err(|e| {
            eprintln!(
                "Logging to stdout only, cannot open log file in {}: {e}",
                log_dir.display()
            )
        })
        .ok();

    let (file_layer, file_guard, log_file) = match file_writer {
        Some(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter(config.log_level));
            (Some(layer), Some(guard), Some(log_dir.join(LOG_FILE_NAME)))
        }
        None => (None, None, None),
    };

    let (telegram_layer, telegram) = match (config.log_chat_id, bot) {
        (Some(chat_id), Some(bot)) => {
            let min_level = config.log_level.as_tracing();
            let (layer, handle) = TelegramLogLayer::new(bot, chat_id, min_level);
            (Some(layer), Some(handle))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(env_filter(config.log_level)),
        )
        .with(file_layer)
        .with(telegram_layer)
        .init();

    LogGuard {
        file: file_guard,
        telegram,
        log_file,
    }
}
