//! Error types for xtext configuration.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use toml::de;

/// Errors that can occur when loading or processing configuration.
///
/// A `ConfigError` is fatal to loading the configuration it came from;
/// callers fall back to the previous or default configuration rather than
/// aborting the session.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the settings file.
    #[error("failed to read settings file {path}: {source}")]
    ReadFile {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Failed to parse the TOML settings file.
    #[error("failed to parse settings file {path}: {source}")]
    ParseToml {
        /// Path to the file that could not be parsed.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: de::Error,
    },

    /// The rule document has no index rule section.
    #[error("configuration document contains no <fulltext> (or <lucene>) section")]
    NoRuleSection,

    /// A required attribute was missing from a rule document element.
    #[error("<{element}> requires a `{attribute}` attribute")]
    MissingAttribute {
        /// Element the attribute was expected on.
        element: String,
        /// The missing attribute.
        attribute: String,
    },

    /// A rule document element carried an invalid boost value.
    #[error("invalid boost value `{0}`")]
    InvalidBoost(String),

    /// A field declaration used an unknown type name.
    #[error("unknown field type `{0}`")]
    InvalidFieldType(String),

    /// An analyzer declaration used an unknown kind or class name.
    #[error("unknown analyzer `{0}`")]
    UnknownAnalyzer(String),

    /// A rule referenced an analyzer id that was never declared.
    #[error("rule references undeclared analyzer id `{0}`")]
    UndeclaredAnalyzer(String),

    /// Two analyzer declarations used the same id.
    #[error("duplicate analyzer id `{0}`")]
    DuplicateAnalyzerId(String),

    /// A stemmer analyzer named an unsupported language.
    #[error("unsupported stemmer language: {0}")]
    InvalidLanguage(String),

    /// A path pattern could not be compiled.
    #[error("invalid path pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern text.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two rules route content with different analyzers into one field.
    #[error("conflicting analyzers for index field `{0}`")]
    AnalyzerConflict(String),
}
