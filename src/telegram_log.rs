//! Forwards log events to an operator chat.

use std::future::Future;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Telegram rejects messages longer than 4096 chars.
const MAX_MESSAGE_CHARS: usize = 4000;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BUFFERED: usize = 50;
/// How long shutdown waits for the final flush.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq, Eq)]
enum LogLine {
    /// WARN/ERROR, sent right away.
    Urgent(String),
    /// INFO, batched.
    Batched(String),
}

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<LogLine>,
    min_level: Level,
}

/// Stops the forwarding task after sending whatever is still buffered.
pub struct TelegramLogHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TelegramLogHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, self.task).await.is_err() {
            eprintln!("Timed out flushing logs to Telegram");
        }
    }
}

impl TelegramLogLayer {
    /// Spawn the forwarding task. Must be called inside a tokio runtime.
    ///
    /// Events more verbose than `min_level` are dropped; DEBUG and TRACE are
    /// never forwarded.
    pub fn new(bot: Bot, chat_id: ChatId, min_level: Level) -> (Self, TelegramLogHandle) {
        let (tx, rx) = mpsc::unbounded_channel::<LogLine>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(forward(rx, shutdown_rx, move |text| {
            let bot = bot.clone();
            async move { send_log(&bot, chat_id, &text).await }
        }));

        let handle = TelegramLogHandle {
            shutdown: shutdown_tx,
            task,
        };
        (Self { tx, min_level }, handle)
    }
}

/// Deliver lines through `send` until shut down, then drain and flush.
async fn forward<F, Fut>(
    mut rx: mpsc::UnboundedReceiver<LogLine>,
    mut shutdown: oneshot::Receiver<()>,
    mut send: F,
) where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut batch: Vec<String> = Vec::new();
    let first_flush = tokio::time::Instant::now() + FLUSH_INTERVAL;
    let mut interval = tokio::time::interval_at(first_flush, FLUSH_INTERVAL);

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(LogLine::Urgent(text)) => send(text).await,
                Some(LogLine::Batched(text)) => {
                    batch.push(text);
                    if batch.len() >= MAX_BUFFERED {
                        flush(&mut send, &mut batch).await;
                    }
                }
                None => break,
            },
            _ = interval.tick() => flush(&mut send, &mut batch).await,
            _ = &mut shutdown => {
                while let Ok(line) = rx.try_recv() {
                    match line {
                        LogLine::Urgent(text) => send(text).await,
                        LogLine::Batched(text) => batch.push(text),
                    }
                }
                break;
            }
        }
    }

    flush(&mut send, &mut batch).await;
}

async fn send_log(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = bot.send_message(chat_id, truncate(text)).await {
        eprintln!("Failed to forward log to Telegram: {e}");
    }
}

async fn flush<F, Fut>(send: &mut F, batch: &mut Vec<String>)
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ()>,
{
    if batch.is_empty() {
        return;
    }
    let combined = batch.join("\n");
    batch.clear();
    send(combined).await;
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_MESSAGE_CHARS {
        let truncated: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}

/// Collects the message and `key = value` fields of an event into one line.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: Vec<String>,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.join(", ")
        } else {
            format!("{} ({})", self.message, self.fields.join(", "))
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{} = {}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{} = {:?}", field.name(), value));
        }
    }
}

fn classify(level: Level, min_level: Level, text: String) -> Option<LogLine> {
    if level > min_level || level > Level::INFO {
        return None;
    }
    Some(match level {
        Level::ERROR => LogLine::Urgent(format!("❌ {text}")),
        Level::WARN => LogLine::Urgent(format!("⚠️ {text}")),
        _ => LogLine::Batched(text),
    })
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > self.min_level || level > Level::INFO {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        if let Some(line) = classify(level, self.min_level, visitor.finish())
            && self.tx.send(line).is_err()
        {
            eprintln!("Log channel closed, message dropped");
        }
    }
}
