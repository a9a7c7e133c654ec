//! Image index and file access.

pub mod index;
pub mod opener;

pub use index::{IMAGE_EXTENSIONS, ImageIndex, IndexError, is_image};
pub use opener::{ImageFile, ImageKind, OpenError, open_image};
