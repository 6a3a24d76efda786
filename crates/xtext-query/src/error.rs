//! Error types for query description parsing.

use thiserror::Error;

/// A query description failed to parse.
///
/// Carries the serialized offending fragment so callers can surface it.
/// Parse failures are never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryDescError {
    /// An element name with no query meaning.
    #[error("unknown query element <{name}> in `{fragment}`")]
    UnknownElement {
        /// The unrecognized element name.
        name: String,
        /// Serialized offending fragment.
        fragment: String,
    },

    /// An element that requires text content had none.
    #[error("<{name}> requires text content in `{fragment}`")]
    MissingContent {
        /// The element missing content.
        name: String,
        /// Serialized offending fragment.
        fragment: String,
    },

    /// An attribute value that could not be interpreted.
    #[error("invalid `{attribute}` value `{value}` on <{name}>")]
    InvalidAttribute {
        /// The element carrying the attribute.
        name: String,
        /// The attribute name.
        attribute: String,
        /// The rejected value.
        value: String,
    },

    /// A structural constraint was violated.
    #[error("{message} in `{fragment}`")]
    Malformed {
        /// What was wrong.
        message: String,
        /// Serialized offending fragment.
        fragment: String,
    },

    /// The description was empty.
    #[error("empty query description")]
    Empty,
}
