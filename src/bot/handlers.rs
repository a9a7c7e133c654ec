//! Telegram update handlers.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use teloxide::prelude::*;
use teloxide::types::{ChatAction, User};
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use crate::bot::BotState;
use crate::bot::commands::{Command, category_keyboard};
use crate::bot::router::{self, Route};
use crate::images::{ImageKind, open_image};

/// Who asked, for log fields.
struct Asker {
    user: String,
    user_id: u64,
    chat_id: ChatId,
}

impl Asker {
    fn new(user: &User, chat_id: ChatId) -> Self {
        Self {
            user: user.username.clone().unwrap_or_else(|| user.first_name.clone()),
            user_id: user.id.0,
            chat_id,
        }
    }
}

/// Plain messages: the `!category` text path.
pub async fn handle_message(
    bot: Bot,
    msg: Message,
    state: Arc<BotState>,
) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    if user.is_bot {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let asker = Asker::new(user, msg.chat.id);
    debug!(
        user = %asker.user,
        user_id = asker.user_id,
        chat_id = asker.chat_id.0,
        content = text,
        "Message received"
    );

    let Some(command) = router::parse_text_command(text, &state.command_prefix) else {
        return Ok(());
    };

    info!(
        category = %command.name,
        user = %asker.user,
        user_id = asker.user_id,
        chat_id = asker.chat_id.0,
        "Command received"
    );

    let route = router::route_text(&state.index, &state.command_prefix, text);
    if route == Route::Ignore {
        info!(category = %command.name, user = %asker.user, "Unknown command received");
        return Ok(());
    }

    respond(&bot, &state, &asker, route).await;
    Ok(())
}

/// `/image`, `/categories` and `/help`.
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<BotState>,
) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    if user.is_bot {
        return Ok(());
    }
    let asker = Asker::new(user, msg.chat.id);

    let route = match cmd {
        Command::Image(category) => {
            info!(
                command = "image",
                category = %category,
                user = %asker.user,
                user_id = asker.user_id,
                chat_id = asker.chat_id.0,
                "Slash command received"
            );
            router::route_category(&state.index, &category)
        }
        Command::Categories => {
            info!(
                user = %asker.user,
                user_id = asker.user_id,
                "Category listing requested"
            );
            Route::Text(router::category_listing(&state.index, &state.command_prefix))
        }
        Command::Help => Route::Text(format!(
            "{}\n\nYou can also send {}<category>, or {}list.",
            Command::descriptions(),
            state.command_prefix,
            state.command_prefix
        )),
    };

    respond(&bot, &state, &asker, route).await;
    Ok(())
}

/// Category buttons from the inline keyboard.
pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<BotState>,
) -> ResponseResult<()> {
    // Always stop the client's loading spinner.
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to answer callback query: {e}");
    }

    let Some(category) = q.data.as_deref().and_then(router::parse_callback_data) else {
        return Ok(());
    };
    let Some(chat_id) = q.message.as_ref().map(|m| m.chat().id) else {
        warn!(category, "Callback query without a message, cannot reply");
        return Ok(());
    };

    let asker = Asker::new(&q.from, chat_id);
    info!(
        category,
        user = %asker.user,
        user_id = asker.user_id,
        chat_id = chat_id.0,
        "Category button pressed"
    );

    let route = router::route_category(&state.index, category);
    respond(&bot, &state, &asker, route).await;
    Ok(())
}

/// Carry out a route. Failures are reported in the chat, never propagated.
async fn respond(bot: &Bot, state: &BotState, asker: &Asker, route: Route) {
    let chat_id = asker.chat_id;
    match route {
        Route::Ignore => {}
        Route::Text(text) => {
            for part in router::split_message(&text, router::MAX_MESSAGE_CHARS) {
                if let Err(e) = bot.send_message(chat_id, part).await {
                    warn!(chat_id = chat_id.0, "Failed to send reply: {e}");
                    break;
                }
            }
        }
        Route::Choices => {
            let request = bot
                .send_message(chat_id, "Pick a category:")
                .reply_markup(category_keyboard(&state.index));
            if let Err(e) = request.await {
                warn!(chat_id = chat_id.0, "Failed to send category keyboard: {e}");
            }
        }
        Route::Image { category, path } => {
            let start = Instant::now();
            match send_image(bot, chat_id, &category, &path, state.request_timeout).await {
                Ok(file_name) => info!(
                    category = %category,
                    filename = %file_name,
                    user = %asker.user,
                    user_id = asker.user_id,
                    chat_id = chat_id.0,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Image sent"
                ),
                Err(reply) => {
                    error!(
                        category = %category,
                        image_path = %path.display(),
                        user = %asker.user,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "{reply}"
                    );
                    if let Err(e) = bot.send_message(chat_id, reply).await {
                        warn!(chat_id = chat_id.0, "Failed to send error reply: {e}");
                    }
                }
            }
        }
    }
}

/// Open `path` and upload it within `budget`.
///
/// Returns the file name on success, or the text to show the user. The file
/// handle is dropped on every path, including when the budget runs out.
async fn send_image(
    bot: &Bot,
    chat_id: ChatId,
    category: &str,
    path: &Path,
    budget: Duration,
) -> Result<String, String> {
    let upload = async {
        let image = open_image(path)
            .await
            .map_err(|e| router::load_failed(category, &e))?;
        let file_name = image.file_name().to_string();
        let kind = image.kind();

        let action = match kind {
            ImageKind::Photo => ChatAction::UploadPhoto,
            ImageKind::Animation => ChatAction::UploadVideo,
        };
        if let Err(e) = bot.send_chat_action(chat_id, action).await {
            debug!("Failed to send chat action: {e}");
        }

        let input = image.into_input_file();
        let sent = match kind {
            ImageKind::Photo => bot.send_photo(chat_id, input).await,
            ImageKind::Animation => bot.send_animation(chat_id, input).await,
        };
        sent.map(|_| file_name)
            .map_err(|e| router::send_failed(category, &e))
    };

    within_budget(budget, category, upload).await
}

/// Run `request` for at most `budget`.
///
/// On expiry the request future is dropped before this returns, together
/// with any file handle it holds.
async fn within_budget<T, F>(budget: Duration, category: &str, request: F) -> Result<T, String>
where
    F: Future<Output = Result<T, String>>,
{
    let outcome = tokio::time::timeout(budget, request).await;
    match outcome {
        Ok(result) => result,
        Err(_) => Err(router::timed_out(category)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// Holds an open image and records when it is dropped.
    struct Held {
        _image: crate::images::ImageFile,
        dropped: Arc<AtomicBool>,
    }

    impl Drop for Held {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn write_image(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("cats").join("c.gif");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"gif bytes").unwrap();
        path
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_expiry_releases_open_image() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir);
        let dropped = Arc::new(AtomicBool::new(false));

        let held = Held {
            _image: open_image(&path).await.unwrap(),
            dropped: dropped.clone(),
        };
        let stalled_upload = async move {
            let _held = held;
            std::future::pending::<()>().await;
            Ok::<_, String>(())
        };

        let result = within_budget(Duration::from_secs(10), "cats", stalled_upload).await;
        assert_eq!(result, Err(router::timed_out("cats")));
        assert!(dropped.load(Ordering::SeqCst), "image handle outlived the request");

        // The file is free to be replaced once the handle is gone.
        std::fs::remove_file(&path).unwrap();
        std::fs::write(&path, b"new gif").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_passes_through_results() {
        let ok = within_budget(Duration::from_secs(1), "cats", async { Ok::<_, String>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = within_budget(Duration::from_secs(1), "cats", async {
            Err::<(), _>(router::load_failed("cats", &"gone"))
        })
        .await;
        assert_eq!(err, Err("failed to load cats: gone".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_allows_slow_but_timely_request() {
        let result = within_budget(Duration::from_secs(10), "cats", async {
            tokio::time::sleep(Duration::from_secs(9)).await;
            Ok::<_, String>("c.gif")
        })
        .await;
        assert_eq!(result, Ok("c.gif"));
    }
}
