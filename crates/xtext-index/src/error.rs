//! Error types for the xtext-index crate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::eval::EvalError;

/// Errors that can occur when working with the search index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Failed to open or create the index.
    #[error("failed to open index at {path}: {message}")]
    OpenIndex {
        /// Path to the index directory.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Failed to write to the index.
    #[error("failed to write to index: {0}")]
    Write(String),

    /// Failed to commit changes to the index.
    #[error("failed to commit index: {0}")]
    Commit(String),

    /// A search against the index failed.
    #[error("search failed: {0}")]
    Search(String),

    /// A query referenced a field that is not part of the index.
    #[error("no index is defined for `{0}`")]
    UnknownField(String),

    /// A query carried a regular expression the engine rejected.
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidQueryPattern {
        /// The rejected pattern.
        pattern: String,
        /// Engine error message.
        message: String,
    },

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] xtext_config::ConfigError),

    /// Document model failure.
    #[error(transparent)]
    Document(#[from] xtext_document::DocumentError),

    /// The query description was malformed.
    #[error(transparent)]
    QueryDesc(#[from] xtext_query::QueryDescError),

    /// A field/facet expression failed.
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl IndexError {
    /// Creates an `OpenIndex` error from a path and engine error.
    pub(crate) fn open_index(path: PathBuf, source: &tantivy::TantivyError) -> Self {
        Self::OpenIndex {
            path,
            message: source.to_string(),
        }
    }

    /// Creates a `Write` error from an engine error.
    pub(crate) fn write(source: &tantivy::TantivyError) -> Self {
        Self::Write(source.to_string())
    }

    /// Creates a `Commit` error from an engine error.
    pub(crate) fn commit(source: &tantivy::TantivyError) -> Self {
        Self::Commit(source.to_string())
    }

    /// Creates a `Search` error from an engine error.
    pub(crate) fn search(source: &tantivy::TantivyError) -> Self {
        Self::Search(source.to_string())
    }
}
