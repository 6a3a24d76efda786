//! Error types for the xtext-document crate.

use thiserror::Error;

/// Errors that can occur when parsing or addressing documents.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The input was not well-formed XML.
    #[error("parse error at byte {position}: {message}")]
    Parse {
        /// What went wrong.
        message: String,
        /// Byte offset into the input where the error was detected.
        position: usize,
    },

    /// A node id did not resolve to a node in the document.
    #[error("node {0} does not exist in this document")]
    NoSuchNode(String),

    /// A serialized node id was malformed.
    #[error("invalid node id bytes")]
    InvalidNodeId,
}

impl DocumentError {
    /// Creates a parse error at the given byte offset.
    pub(crate) fn parse(message: impl Into<String>, position: usize) -> Self {
        Self::Parse {
            message: message.into(),
            position,
        }
    }
}
