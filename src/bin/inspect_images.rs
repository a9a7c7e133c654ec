//! Print the image index for a directory.
//!
//! Usage: cargo run --bin inspect_images [dir]
//!
//! Shows what the bot would serve: each category, its image count and the
//! total. Exits with status 1 if the directory cannot be indexed.

use std::process::ExitCode;

use wooper_bot::config::{DEFAULT_IMAGE_DIR, LogLevel};
use wooper_bot::images::ImageIndex;
use wooper_bot::logging::env_filter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(LogLevel::Warn))
        .with_writer(std::io::stderr)
        .init();

    let dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_IMAGE_DIR.to_string());

    let index = match ImageIndex::build(&dir) {
        Ok(index) => index,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let width = index.categories().iter().map(|c| c.len()).max().unwrap_or(0);
    for category in index.categories() {
        println!("{category:<width$}  {:>5}", index.image_count(category));
    }
    println!(
        "{} images in {} categories under {dir}",
        index.total_images(),
        index.len()
    );

    ExitCode::SUCCESS
}
