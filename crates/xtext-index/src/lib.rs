//! Tantivy-based structural text index for xtext.
//!
//! This crate keeps a secondary inverted-text index synchronized with a
//! primary tree-structured document store and answers structural+text
//! queries that point back at exact nodes inside live documents. It
//! handles:
//! - Schema derivation from the collection index configuration
//! - Per-document indexing sessions over a structural event stream, with
//!   buffered entries, removal tracking, and partial reindexing
//! - Writer/reader lifecycle with deferred, dirty-gated commits
//! - Translation of structured query descriptions into engine queries
//! - Configuration-hash index versioning
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xtext_config::{IndexConfiguration, Settings};
//! use xtext_document::{DocId, parse_document};
//! use xtext_index::{ReindexMode, SearchIndex};
//!
//! let conf = parse_document(
//!     DocId(0),
//!     "/db/system/config.xconf",
//!     r#"<fulltext><text match="/article/body"/></fulltext>"#,
//! )
//! .unwrap();
//! let config = Arc::new(IndexConfiguration::parse(&conf.root).unwrap());
//! let index = SearchIndex::open("./index".as_ref(), config, &Settings::default()).unwrap();
//!
//! let doc = parse_document(
//!     DocId(1),
//!     "/db/articles/a1.xml",
//!     "<article><body>alpha beta</body></article>",
//! )
//! .unwrap();
//! let mut session = index.session(&doc, ReindexMode::Store);
//! session.run().unwrap();
//! index.commit_manager().commit().unwrap();
//! ```

#![warn(missing_docs)]

mod analyzer;
mod binary;
mod commit;
mod config_hash;
mod discovery;
mod error;
mod eval;
mod extract;
mod index;
mod location;
mod schema;
mod search;
mod session;
mod translate;

pub use analyzer::{build_analyzer, engine_language, tokenize, tokenizer_name};
pub use binary::{PlainTextDoc, PlainTextField};
pub use commit::{CommitHooks, CommitManager};
pub use config_hash::{
    IndexingFingerprint, SCHEMA_VERSION, compute_config_hash, needs_rebuild, read_stored_hash,
    write_config_hash,
};
pub use discovery::discover_documents;
pub use error::IndexError;
pub use eval::{CompiledExpr, EvalError, Evaluator, PathEvaluator};
pub use extract::{OffsetEntry, TextExtractor, entry_at};
pub use index::SearchIndex;
pub use location::{global_index_directory, index_directory};
pub use schema::{IndexSchema, SHARED_KEY, encode_key};
pub use search::{NodeMatch, QueryOptions, TermCount};
pub use session::{IndexingSession, ReindexMode, SessionReport};
pub use translate::{QueryTranslator, TermsOfInterest, TranslatedQuery};
