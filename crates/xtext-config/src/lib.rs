//! Index configuration for xtext.
//!
//! Two inputs are handled here:
//!
//! - A TOML settings file (`.xtext.toml`) with process-level knobs: buffer
//!   limits, result limits, and the default analyzer's stemming language.
//! - The collection index configuration document ("xconf"), a declarative
//!   XML rule document binding node-path patterns to indexing behavior:
//!   analyzers, boosts, derived fields, facets, and inline/ignore element
//!   sets. The xconf schema is a compatibility surface and is parsed
//!   exactly as documented on [`IndexConfiguration`].
//!
//! An [`IndexConfiguration`] is built once per configuration document and
//! is immutable afterwards; indexing sessions share it behind an `Arc` and
//! keep their own compiled-expression caches.

#![warn(missing_docs)]

mod analyzers;
mod configuration;
mod error;
mod pattern;
mod rules;
mod settings;
mod xconf;

pub use analyzers::{AnalyzerKind, AnalyzerRegistry, parse_stemmer_language};
pub use configuration::{IndexConfiguration, ReindexAnchor};
pub use error::ConfigError;
pub use pattern::{AttrPredicate, NameTest, PathPattern, PatternStep, PredicateOp};
pub use rules::{AttrBoost, FacetSpec, FieldKind, FieldSpec, IndexRule, RuleId};
pub use settings::{GeneralSettings, SETTINGS_FILENAME, SearchSettings, Settings};
