use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::types::ChatId;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file '{}': {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse JSON.
    #[error("failed to parse config file '{}': {source}", path.display())]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Validation error.
    #[error("config validation error: {0}")]
    Validation(String),
}

/// Verbosity of the log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name; anything unrecognized falls back to `Info`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }

    pub fn as_tracing(self) -> tracing::Level {
        match self {
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// On-disk configuration. Every field is optional so the bot can run from
/// environment variables alone.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    telegram_bot_token: Option<String>,
    #[serde(default)]
    log_level: Option<String>,
    /// Base directory of the image index.
    #[serde(default)]
    image_dir: Option<String>,
    /// Prefix marking a plain message as a command (e.g. "!").
    #[serde(default)]
    command_prefix: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    /// Directory for log files. Defaults to current directory.
    data_dir: Option<String>,
    log_chat_id: Option<i64>,
}

fn default_request_timeout_secs() -> u64 {
    10
}

pub const DEFAULT_CONFIG_PATH: &str = "wooper.json";
/// Optional `KEY=value` file read from the working directory.
pub const DOTENV_PATH: &str = ".env";
pub const DEFAULT_IMAGE_DIR: &str = "img";
pub const DEFAULT_COMMAND_PREFIX: &str = "!";

pub struct Config {
    pub telegram_bot_token: String,
    pub log_level: LogLevel,
    pub image_dir: PathBuf,
    pub command_prefix: String,
    /// Budget for opening and uploading one image.
    pub request_timeout: Duration,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
    pub log_chat_id: Option<ChatId>,
}

impl Config {
    /// Load the JSON file at `path` (skipped when it does not exist) and apply
    /// environment overrides. Variables missing from the process environment
    /// are looked up in `.env`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let file = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).map_err(|e| {
                ConfigError::ReadFile { path: config_path.clone(), source: e }
            })?;
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseJson {
                path: config_path.clone(),
                source: e,
            })?
        } else {
            ConfigFile::default_file()
        };

        let dotenv = dotenv_vars(Path::new(DOTENV_PATH));
        Self::from_parts(file, env_with_fallback(|key| std::env::var(key).ok(), dotenv))
    }

    /// Combine a parsed file with an environment lookup. Environment wins.
    pub fn from_parts<E>(file: ConfigFile, env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let telegram_bot_token = env("TELEGRAM_BOT_TOKEN")
            .or(file.telegram_bot_token)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        if telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token is required (set TELEGRAM_BOT_TOKEN)".into(),
            ));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2
            || token_parts[0].parse::<u64>().is_err()
            || token_parts[1].is_empty()
        {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)"
                    .into(),
            ));
        }

        let log_level = env("LOG_LEVEL")
            .or(file.log_level)
            .map(|l| LogLevel::parse(&l))
            .unwrap_or_default();

        let image_dir = env("IMAGE_DIR")
            .or(file.image_dir)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_DIR));

        let command_prefix = env("COMMAND_PREFIX")
            .or(file.command_prefix)
            .map(|p| p.trim().to_string())
            .unwrap_or_else(|| DEFAULT_COMMAND_PREFIX.to_string());
        if command_prefix.is_empty() {
            return Err(ConfigError::Validation("command_prefix must not be empty".into()));
        }
        if command_prefix.starts_with('/') {
            return Err(ConfigError::Validation(
                "command_prefix must not start with '/' (reserved for bot commands)".into(),
            ));
        }

        if file.request_timeout_secs == 0 {
            return Err(ConfigError::Validation("request_timeout_secs must be positive".into()));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token,
            log_level,
            image_dir,
            command_prefix,
            request_timeout: Duration::from_secs(file.request_timeout_secs),
            data_dir,
            log_chat_id: file.log_chat_id.map(ChatId),
        })
    }
}

/// Read `KEY=value` pairs without touching the process environment.
///
/// A missing file yields nothing. A malformed one is reported and skipped.
fn dotenv_vars(path: &Path) -> HashMap<String, String> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => return HashMap::new(),
        Err(e) => {
            eprintln!("Ignoring {}: {e}", path.display());
            return HashMap::new();
        }
    };

    let mut vars = HashMap::new();
    for item in iter {
        match item {
            Ok((key, value)) => {
                vars.insert(key, value);
            }
            Err(e) => {
                eprintln!("Ignoring {}: {e}", path.display());
                return HashMap::new();
            }
        }
    }
    vars
}

/// Lookup that prefers `primary` and falls back to `dotenv`.
fn env_with_fallback<P>(
    primary: P,
    dotenv: HashMap<String, String>,
) -> impl Fn(&str) -> Option<String>
where
    P: Fn(&str) -> Option<String>,
{
    move |key| {
        primary(key)
            .filter(|v| !v.trim().is_empty())
            .or_else(|| dotenv.get(key).cloned())
    }
}

impl ConfigFile {
    fn default_file() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            ..Self::default()
        }
    }
}
