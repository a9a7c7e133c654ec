//! Bot commands registered with Telegram.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use teloxide::utils::command::BotCommands;
use tracing::warn;

use crate::bot::router::callback_data;
use crate::images::ImageIndex;

/// Buttons per keyboard row.
const KEYBOARD_COLUMNS: usize = 3;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Random images:")]
pub enum Command {
    #[command(description = "send a random image from a category, e.g. /image wooper")]
    Image(String),
    #[command(description = "list image categories")]
    Categories,
    #[command(description = "show this help")]
    Help,
}

/// Inline keyboard with one button per category.
pub fn category_keyboard(index: &ImageIndex) -> InlineKeyboardMarkup {
    let buttons: Vec<InlineKeyboardButton> = index
        .categories()
        .into_iter()
        .filter_map(|category| match callback_data(category) {
            Some(data) => Some(InlineKeyboardButton::callback(category.to_string(), data)),
            None => {
                warn!(category, "Category name too long for an inline button");
                None
            }
        })
        .collect();

    InlineKeyboardMarkup::new(buttons.chunks(KEYBOARD_COLUMNS).map(|row| row.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn test_parse_image_command() {
        assert_eq!(
            Command::parse("/image wooper", "wooper_bot").unwrap(),
            Command::Image("wooper".into())
        );
        assert_eq!(
            Command::parse("/image@wooper_bot cats", "wooper_bot").unwrap(),
            Command::Image("cats".into())
        );
        assert_eq!(Command::parse("/categories", "wooper_bot").unwrap(), Command::Categories);
        assert!(Command::parse("/unknown", "wooper_bot").is_err());
    }

    #[test]
    fn test_descriptions_mention_commands() {
        let help = Command::descriptions().to_string();
        assert!(help.contains("/image"));
        assert!(help.contains("/categories"));
    }

    #[test]
    fn test_keyboard_has_button_per_category() {
        let dir = TempDir::new().unwrap();
        for name in ["a", "b", "c", "d"] {
            let sub = dir.path().join(name);
            fs::create_dir_all(&sub).unwrap();
            fs::write(sub.join("x.png"), b"img").unwrap();
        }
        let index = ImageIndex::build(dir.path()).unwrap();

        let keyboard = category_keyboard(&index);
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(keyboard.inline_keyboard[0].len(), 3);
        assert_eq!(keyboard.inline_keyboard[1].len(), 1);

        let first = &keyboard.inline_keyboard[0][0];
        assert_eq!(first.text, "a");
        assert!(matches!(&first.kind, InlineKeyboardButtonKind::CallbackData(d) if d == "image:a"));
    }
}
