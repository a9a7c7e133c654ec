//! In-memory index of images grouped by category.
//!
//! A category is the first directory below the base directory. Every image
//! found anywhere beneath that directory belongs to it:
//!
//! ```text
//! img/wooper/a.jpg          -> wooper
//! img/wooper/old/b.png      -> wooper
//! img/cats/c.gif            -> cats
//! img/readme.png            -> (ignored, no category)
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{debug, error, info};
use walkdir::WalkDir;

/// Extensions (lowercase, without the dot) recognized as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Errors that can occur while building the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The base directory is missing or could not be traversed.
    #[error("failed to scan image directory '{}': {source}", path.display())]
    DirectoryScan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The scan finished without finding a single category.
    #[error("no image categories found in directory '{}'", path.display())]
    Empty { path: PathBuf },
}

/// Category name -> image paths. Immutable once built.
#[derive(Debug, Clone)]
pub struct ImageIndex {
    categories: BTreeMap<String, Vec<PathBuf>>,
}

impl ImageIndex {
    /// Scan `base` recursively and group images by their top-level directory.
    pub fn build<P: AsRef<Path>>(base: P) -> Result<Self, IndexError> {
        let base = base.as_ref();
        info!(base_dir = %base.display(), "Building image index");

        let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

        for entry in WalkDir::new(base).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(base).to_path_buf();
                error!(path = %path.display(), "Error walking image directory: {e}");
                let source = match e.into_io_error() {
                    Some(io_err) => io_err,
                    None => io::Error::other(format!("traversal error at {}", path.display())),
                };
                IndexError::DirectoryScan {
                    path: base.to_path_buf(),
                    source,
                }
            })?;

            if !entry.file_type().is_file() || !is_image(entry.path()) {
                continue;
            }

            let Some(category) = category_of(base, entry.path()) else {
                continue;
            };

            debug!(
                category = %category,
                file = %entry.file_name().to_string_lossy(),
                path = %entry.path().display(),
                "Found image"
            );
            categories
                .entry(category)
                .or_default()
                .push(entry.into_path());
        }

        if categories.is_empty() {
            error!(base_dir = %base.display(), "No image categories found");
            return Err(IndexError::Empty {
                path: base.to_path_buf(),
            });
        }

        for (category, images) in &categories {
            info!(category = %category, count = images.len(), "Loaded image category");
        }
        info!(total_categories = categories.len(), "Image index ready");

        Ok(Self { categories })
    }

    /// Exact-match membership test.
    pub fn has_category(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    /// Pick a random image from `name` using the thread-local generator.
    ///
    /// Returns `None` when the category is unknown or holds no images.
    pub fn random_image(&self, name: &str) -> Option<&Path> {
        self.random_image_with(name, &mut rand::thread_rng())
    }

    /// Same as [`random_image`](Self::random_image) with a caller-supplied generator.
    pub fn random_image_with<R: Rng + ?Sized>(&self, name: &str, rng: &mut R) -> Option<&Path> {
        let images = self.categories.get(name)?;
        let selected = images.choose(rng)?;
        debug!(
            category = name,
            image = %selected.file_name().unwrap_or_default().to_string_lossy(),
            total_available = images.len(),
            "Selected random image"
        );
        Some(selected.as_path())
    }

    /// Number of images in `name`, 0 for unknown categories.
    pub fn image_count(&self, name: &str) -> usize {
        self.categories.get(name).map_or(0, Vec::len)
    }

    /// All category names, sorted.
    pub fn categories(&self) -> Vec<&str> {
        self.categories.keys().map(String::as_str).collect()
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Number of images across every category.
    pub fn total_images(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Paths recorded under `name`, in traversal order.
    pub fn images(&self, name: &str) -> &[PathBuf] {
        self.categories.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Whether the file extension is one of [`IMAGE_EXTENSIONS`], ignoring case.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// First directory under `base`, or `None` for files directly in `base`.
fn category_of(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let mut components = relative.components();
    let first = match components.next()? {
        Component::Normal(name) => name.to_string_lossy().into_owned(),
        _ => return None,
    };
    // The file itself must still follow.
    components.next()?;
    Some(first)
}
