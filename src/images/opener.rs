//! Opening indexed images for upload.

use std::io;
use std::path::{Path, PathBuf};

use teloxide::types::InputFile;
use thiserror::Error;
use tokio::fs::File;
use tracing::{debug, error};

/// Failed to open an image selected from the index.
#[derive(Debug, Error)]
#[error("open image file '{}': {source}", path.display())]
pub struct OpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// How an image should be presented in the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Photo,
    Animation,
}

impl ImageKind {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gif") => Self::Animation,
            _ => Self::Photo,
        }
    }
}

/// An open image, owned by exactly one request.
///
/// The handle is closed when this value (or the [`InputFile`] it was turned
/// into) is dropped, whether the upload finished, failed or was cancelled.
#[derive(Debug)]
pub struct ImageFile {
    file: File,
    file_name: String,
    kind: ImageKind,
}

impl ImageFile {
    /// Base name of the image, as it should appear in the chat.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    #[cfg(test)]
    pub(crate) fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// Move the handle into an attachment that streams the file.
    pub fn into_input_file(self) -> InputFile {
        InputFile::read(self.file).file_name(self.file_name)
    }
}

/// Open `path` for streaming and report its base file name.
///
/// No timeout is applied here; callers bound the whole request instead.
pub async fn open_image(path: &Path) -> Result<ImageFile, OpenError> {
    debug!(path = %path.display(), "Opening image file");

    let file = File::open(path).await.map_err(|source| {
        error!(path = %path.display(), "Failed to open image file: {source}");
        OpenError {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    debug!(filename = %file_name, path = %path.display(), "Opened image file");

    Ok(ImageFile {
        file,
        kind: ImageKind::from_path(path),
        file_name,
    })
}
