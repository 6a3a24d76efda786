//! Match correlation and highlighting.
//!
//! The index stores no text, so highlighting re-derives everything from
//! the live document: the matched node's subtree is re-extracted with the
//! same extractor used at index time, re-tokenized through the same
//! analyzer, and the token offsets are mapped back onto the exact text
//! nodes they came from. Phrase matches are confirmed against the full
//! term sequence before anything is marked, so a recurring first term
//! never over-highlights.
//!
//! Spans are rebuilt on every serialization and never persisted.

#![warn(missing_docs)]

mod correlate;
mod render;
mod span;

pub use correlate::MatchCorrelator;
pub use render::render_marked;
pub use span::{MatchSpan, SpanMap, merge_spans};
