//! Text extraction from element subtrees.
//!
//! One extractor is pushed per matched rule when its anchor element opens,
//! fed every text node seen while it is open, and popped into a pending
//! entry when the anchor closes. The match correlator runs the same
//! extractor over the same subtree at serialization time, so the offsets
//! it records are comparable with index-time token offsets by
//! construction.
//!
//! Separator rules: inline elements insert nothing; any other element
//! boundary inserts exactly one space, and adjacent separators collapse.
//! Content below an `ignore` element is excluded entirely.

use xtext_config::IndexConfiguration;
use xtext_document::{NodeId, QName, Text};

/// Byte range of one text node inside the extracted string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetEntry {
    /// Start offset in the extracted text.
    pub start: usize,
    /// End offset (exclusive) in the extracted text.
    pub end: usize,
    /// The text node the range came from.
    pub node: NodeId,
}

/// Accumulates the text of one rule's subtree.
#[derive(Debug)]
pub struct TextExtractor<'a> {
    /// The active configuration, for inline/ignore sets.
    config: &'a IndexConfiguration,
    /// Extracted text so far.
    text: String,
    /// Per-text-node offsets, in document order.
    offsets: Vec<OffsetEntry>,
    /// Depth of ignored elements currently open.
    ignore_depth: usize,
    /// A block boundary was crossed since the last character.
    pending_separator: bool,
}

impl<'a> TextExtractor<'a> {
    /// Creates an empty extractor.
    pub fn new(config: &'a IndexConfiguration) -> Self {
        Self {
            config,
            text: String::new(),
            offsets: Vec::new(),
            ignore_depth: 0,
            pending_separator: false,
        }
    }

    /// Notes entry into a descendant element.
    pub fn start_element(&mut self, name: &QName) {
        if self.ignore_depth > 0 || self.config.is_ignored(name) {
            self.ignore_depth += 1;
            return;
        }
        if !self.config.is_inline(name) {
            self.pending_separator = true;
        }
    }

    /// Notes exit from a descendant element.
    pub fn end_element(&mut self, name: &QName) {
        if self.ignore_depth > 0 {
            self.ignore_depth -= 1;
            return;
        }
        if !self.config.is_inline(name) {
            self.pending_separator = true;
        }
    }

    /// Appends a text node's content.
    pub fn characters(&mut self, text: &Text) {
        if self.ignore_depth > 0 {
            return;
        }
        if self.pending_separator {
            self.pending_separator = false;
            // Collapse: no separator at the start, after whitespace, or
            // before incoming leading whitespace.
            if !self.text.is_empty()
                && !self.text.ends_with(char::is_whitespace)
                && !text.value.starts_with(char::is_whitespace)
            {
                self.text.push(' ');
            }
        }
        let start = self.text.len();
        self.text.push_str(&text.value);
        self.offsets.push(OffsetEntry {
            start,
            end: self.text.len(),
            node: text.node_id.clone(),
        });
    }

    /// The extracted text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consumes the extractor, returning text and offset table.
    pub fn into_parts(self) -> (String, Vec<OffsetEntry>) {
        (self.text, self.offsets)
    }
}

/// Finds the offset entry containing `offset`: the last entry whose start
/// is at or before it.
pub fn entry_at(offsets: &[OffsetEntry], offset: usize) -> Option<&OffsetEntry> {
    match offsets.partition_point(|entry| entry.start <= offset) {
        0 => None,
        n => Some(&offsets[n - 1]),
    }
}
