//! Index directory resolution.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Directory name used for an index kept beside its collection.
const LOCAL_INDEX_DIR: &str = ".xtext-index";

/// The index directory for a collection rooted at `collection_root`.
pub fn index_directory(collection_root: &Path) -> PathBuf {
    collection_root.join(LOCAL_INDEX_DIR)
}

/// The per-user index directory for indexes that do not live beside their
/// collection. `None` when no home directory can be determined.
pub fn global_index_directory() -> Option<PathBuf> {
    ProjectDirs::from("", "", "xtext").map(|dirs| dirs.data_dir().join("index"))
}
