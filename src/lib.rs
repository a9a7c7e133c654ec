//! Telegram bot that answers `!category` and `/image category` with a random
//! picture from a local directory tree.

pub mod bot;
pub mod config;
pub mod images;
pub mod logging;
pub mod telegram_log;
