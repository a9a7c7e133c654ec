//! Decides what to answer for a text command or an `/image` request.
//!
//! Everything here is pure: the handlers turn a [`Route`] into Telegram calls.

use std::fmt::Write;
use std::path::PathBuf;

use crate::images::ImageIndex;

/// Names answered with the category listing when no such category exists.
const LISTING_COMMANDS: &[&str] = &["help", "list"];

/// Callback data prefix for inline category buttons.
pub const CALLBACK_PREFIX: &str = "image:";

/// Telegram limit for callback data, in bytes.
pub const MAX_CALLBACK_DATA: usize = 64;

/// Telegram limit for one text message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// A plain message that starts with the trigger prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCommand {
    pub name: String,
}

/// What to do with one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Upload an image from `category`.
    Image { category: String, path: PathBuf },
    /// Reply with plain text.
    Text(String),
    /// Offer the categories as inline buttons.
    Choices,
    /// Not for us; stay silent.
    Ignore,
}

/// Strip the trigger prefix. Returns `None` for ordinary messages and for a
/// bare prefix.
pub fn parse_text_command(text: &str, prefix: &str) -> Option<TextCommand> {
    let rest = text.trim().strip_prefix(prefix)?.trim();
    if rest.is_empty() {
        return None;
    }
    Some(TextCommand { name: rest.to_string() })
}

/// Route a plain text message.
///
/// Existing categories win over the listing commands, so a `help/`
/// directory still serves images. Unknown names are ignored.
pub fn route_text(index: &ImageIndex, prefix: &str, text: &str) -> Route {
    let Some(command) = parse_text_command(text, prefix) else {
        return Route::Ignore;
    };

    if index.has_category(&command.name) {
        return match index.random_image(&command.name) {
            Some(path) => Route::Image {
                category: command.name,
                path: path.to_path_buf(),
            },
            None => Route::Text(format!("no {} images available", command.name)),
        };
    }

    if LISTING_COMMANDS.contains(&command.name.as_str()) {
        return Route::Text(category_listing(index, prefix));
    }

    Route::Ignore
}

/// Route an `/image <category>` command or a category button press.
pub fn route_category(index: &ImageIndex, category: &str) -> Route {
    let category = category.trim();
    if category.is_empty() {
        return Route::Choices;
    }

    if !index.has_category(category) {
        return Route::Text(category_not_found(index, category));
    }

    match index.random_image(category) {
        Some(path) => Route::Image {
            category: category.to_string(),
            path: path.to_path_buf(),
        },
        None => Route::Text(format!("No {category} images available")),
    }
}

/// Category name carried by an inline button press, if it is one of ours.
pub fn parse_callback_data(data: &str) -> Option<&str> {
    data.strip_prefix(CALLBACK_PREFIX)
}

/// Callback data for a category button, or `None` when it would not fit.
pub fn callback_data(category: &str) -> Option<String> {
    let data = format!("{CALLBACK_PREFIX}{category}");
    (data.len() <= MAX_CALLBACK_DATA).then_some(data)
}

/// Every category with its count, formatted as text commands.
pub fn category_listing(index: &ImageIndex, prefix: &str) -> String {
    let categories = index.categories();
    if categories.is_empty() {
        return "no image categories available".to_string();
    }

    let mut message = String::from("Available image categories:\n");
    for category in categories {
        let _ = writeln!(
            message,
            "• {prefix}{category} ({} images)",
            index.image_count(category)
        );
    }
    message
}

/// Split `text` into messages of at most `limit` chars, breaking between
/// lines where possible.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let mut line = line;
        loop {
            let line_len = line.chars().count();
            if current_len + line_len <= limit {
                current.push_str(line);
                current_len += line_len;
                break;
            }
            if current_len > 0 {
                parts.push(std::mem::take(&mut current));
                current_len = 0;
                continue;
            }
            // A single line longer than the limit is cut at a char boundary.
            let cut = line.char_indices().nth(limit).map_or(line.len(), |(i, _)| i);
            parts.push(line[..cut].to_string());
            line = &line[cut..];
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

pub fn category_not_found(index: &ImageIndex, category: &str) -> String {
    format!(
        "Category '{category}' not found. Available categories: {}",
        index.categories().join(", ")
    )
}

pub fn load_failed(category: &str, err: &dyn std::fmt::Display) -> String {
    format!("failed to load {category}: {err}")
}

pub fn send_failed(category: &str, err: &dyn std::fmt::Display) -> String {
    format!("failed to send {category}: {err}")
}

pub fn timed_out(category: &str) -> String {
    format!("timed out sending {category}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(dir: &Path, relative: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"img").unwrap();
    }

    fn index() -> (TempDir, ImageIndex) {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "wooper/a.jpg");
        touch(dir.path(), "wooper/b.png");
        touch(dir.path(), "cats/c.gif");
        let index = ImageIndex::build(dir.path()).unwrap();
        (dir, index)
    }

    #[test]
    fn test_parse_text_command() {
        assert_eq!(
            parse_text_command("!wooper", "!"),
            Some(TextCommand { name: "wooper".into() })
        );
        assert_eq!(
            parse_text_command("  !  wooper  ", "!"),
            Some(TextCommand { name: "wooper".into() })
        );
        assert_eq!(parse_text_command("wooper", "!"), None);
        assert_eq!(parse_text_command("!", "!"), None);
        assert_eq!(parse_text_command("!!", "!!"), None);
        assert_eq!(
            parse_text_command(">>cats", ">>"),
            Some(TextCommand { name: "cats".into() })
        );
    }

    #[test]
    fn test_route_text_known_category() {
        let (_dir, index) = index();
        match route_text(&index, "!", "!cats") {
            Route::Image { category, path } => {
                assert_eq!(category, "cats");
                assert_eq!(path, index.images("cats")[0]);
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn test_route_text_help_and_list() {
        let (_dir, index) = index();
        for text in ["!help", "!list"] {
            match route_text(&index, "!", text) {
                Route::Text(message) => {
                    assert!(message.starts_with("Available image categories:"));
                    assert!(message.contains("• !wooper (2 images)"));
                    assert!(message.contains("• !cats (1 images)"));
                    assert!(!message.contains('`'));
                }
                other => panic!("expected listing, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_route_text_category_beats_listing() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "help/a.png");
        let index = ImageIndex::build(dir.path()).unwrap();

        assert!(matches!(route_text(&index, "!", "!help"), Route::Image { .. }));
        assert!(matches!(route_text(&index, "!", "!list"), Route::Text(_)));
    }

    #[test]
    fn test_route_text_ignores_unknown_and_chatter() {
        let (_dir, index) = index();
        assert_eq!(route_text(&index, "!", "!dogs"), Route::Ignore);
        assert_eq!(route_text(&index, "!", "hello there"), Route::Ignore);
        assert_eq!(route_text(&index, "!", "!"), Route::Ignore);
        assert_eq!(route_text(&index, "!", "!Cats"), Route::Ignore);
    }

    #[test]
    fn test_route_category() {
        let (_dir, index) = index();

        match route_category(&index, "wooper") {
            Route::Image { category, path } => {
                assert_eq!(category, "wooper");
                assert!(index.images("wooper").contains(&path));
            }
            other => panic!("expected image, got {other:?}"),
        }

        assert_eq!(
            route_category(&index, "dogs"),
            Route::Text("Category 'dogs' not found. Available categories: cats, wooper".into())
        );
        assert_eq!(route_category(&index, ""), Route::Choices);
        assert_eq!(route_category(&index, "   "), Route::Choices);
    }

    #[test]
    fn test_callback_data_round_trip() {
        let data = callback_data("wooper").unwrap();
        assert_eq!(data, "image:wooper");
        assert_eq!(parse_callback_data(&data), Some("wooper"));
        assert_eq!(parse_callback_data("other:wooper"), None);
    }

    #[test]
    fn test_callback_data_too_long() {
        let long = "x".repeat(MAX_CALLBACK_DATA);
        assert!(callback_data(&long).is_none());

        let fits = "x".repeat(MAX_CALLBACK_DATA - CALLBACK_PREFIX.len());
        assert!(callback_data(&fits).is_some());
    }

    #[test]
    fn test_reply_texts() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(load_failed("cats", &err), "failed to load cats: gone");
        assert_eq!(send_failed("cats", &"network down"), "failed to send cats: network down");
        assert_eq!(timed_out("cats"), "timed out sending cats");
    }

    #[test]
    fn test_split_message_keeps_short_text_whole() {
        assert_eq!(split_message("a\nb\n", 10), vec!["a\nb\n".to_string()]);
        assert!(split_message("", 10).is_empty());
    }

    #[test]
    fn test_split_message_breaks_between_lines() {
        let parts = split_message("aaaa\nbbbb\ncccc\n", 10);
        assert_eq!(parts, vec!["aaaa\nbbbb\n".to_string(), "cccc\n".to_string()]);
    }

    #[test]
    fn test_split_message_cuts_overlong_line() {
        let parts = split_message(&"é".repeat(25), 10);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.chars().count() <= 10));
        assert_eq!(parts.concat(), "é".repeat(25));
    }

    #[test]
    fn test_large_listing_fits_telegram_limit() {
        let dir = TempDir::new().unwrap();
        for i in 0..300 {
            touch(dir.path(), &format!("category_with_a_long_name_{i:03}/a.png"));
        }
        let index = ImageIndex::build(dir.path()).unwrap();

        let listing = category_listing(&index, "!");
        assert!(listing.chars().count() > MAX_MESSAGE_CHARS);

        let parts = split_message(&listing, MAX_MESSAGE_CHARS);
        assert!(parts.len() > 1);
        assert!(parts.iter().all(|p| p.chars().count() <= MAX_MESSAGE_CHARS));
        assert_eq!(parts.concat(), listing);
    }
}
