//! Token-offset correlation between query matches and document nodes.

use tantivy::tokenizer::TextAnalyzer;
use xtext_document::{Document, NodeHandle};
use xtext_index::{
    IndexError, NodeMatch, OffsetEntry, SearchIndex, TermsOfInterest, TextExtractor, entry_at,
};

use crate::span::{MatchSpan, SpanMap, normalize, push_span};

/// One materialized token of the re-analyzed text.
struct AnalyzedToken {
    /// Token text.
    text: String,
    /// Byte start in the extracted text.
    start: usize,
    /// Byte end in the extracted text.
    end: usize,
}

/// Recomputes match spans for nodes known to contain hits.
pub struct MatchCorrelator<'a> {
    /// The index that produced the matches.
    index: &'a SearchIndex,
}

impl<'a> MatchCorrelator<'a> {
    /// Creates a correlator.
    pub fn new(index: &'a SearchIndex) -> Self {
        Self { index }
    }

    /// Computes the span chains for one matched node.
    ///
    /// The node's subtree is re-extracted exactly as at index time, then
    /// re-tokenized with the field's analyzer. Single terms mark wherever
    /// they occur; phrase sequences are confirmed in full before any of
    /// their tokens are marked; a `first` bound discards matches past the
    /// allowed token position.
    pub fn correlate(
        &self,
        document: &Document,
        node_match: &NodeMatch,
        interest: &TermsOfInterest,
    ) -> Result<SpanMap, IndexError> {
        let (text, offsets) = self.re_extract(document, node_match)?;
        let mut analyzer = self.index.analyzer_for_key(&node_match.key)?;
        let tokens = analyze(&mut analyzer, &text);

        let mut spans = SpanMap::new();

        for (position, token) in tokens.iter().enumerate() {
            if !interest.terms.contains(&token.text) {
                continue;
            }
            if past_bound(interest, position + 1) {
                continue;
            }
            self.record(&mut spans, &offsets, token);
        }

        for phrase in &interest.phrases {
            let mut cursor = 0usize;
            while cursor + phrase.len() <= tokens.len() {
                let window = &tokens[cursor..cursor + phrase.len()];
                let is_match = window
                    .iter()
                    .zip(phrase.iter())
                    .all(|(token, term)| &token.text == term);
                if is_match && !past_bound(interest, cursor + phrase.len()) {
                    for token in window {
                        self.record(&mut spans, &offsets, token);
                    }
                    cursor += phrase.len();
                } else {
                    cursor += 1;
                }
            }
        }

        for chain in spans.values_mut() {
            normalize(chain);
        }
        Ok(spans)
    }

    /// Re-runs the index-time extraction over the matched subtree.
    fn re_extract(
        &self,
        document: &Document,
        node_match: &NodeMatch,
    ) -> Result<(String, Vec<OffsetEntry>), IndexError> {
        match document.node(&node_match.node.node)? {
            NodeHandle::Element(element) => {
                let mut extractor = TextExtractor::new(self.index.configuration());
                extract_element(&mut extractor, element);
                Ok(extractor.into_parts())
            }
            NodeHandle::Attribute(_, attribute) => {
                // Attribute entries have no subtree; the value is the text.
                let entry = OffsetEntry {
                    start: 0,
                    end: attribute.value.len(),
                    node: attribute.node_id.clone(),
                };
                Ok((attribute.value.clone(), vec![entry]))
            }
            NodeHandle::Text(text) => {
                let entry = OffsetEntry {
                    start: 0,
                    end: text.value.len(),
                    node: text.node_id.clone(),
                };
                Ok((text.value.clone(), vec![entry]))
            }
        }
    }

    /// Maps one matched token back onto its text node.
    fn record(&self, spans: &mut SpanMap, offsets: &[OffsetEntry], token: &AnalyzedToken) {
        let Some(entry) = entry_at(offsets, token.start) else {
            return;
        };
        if token.start >= entry.end {
            // The token starts in a separator gap; nothing to mark.
            return;
        }
        push_span(
            spans,
            entry.node.clone(),
            MatchSpan {
                start: token.start - entry.start,
                end: token.end.min(entry.end) - entry.start,
            },
        );
    }
}

/// True if a match ending at `end_position` (1-based) exceeds the bound.
fn past_bound(interest: &TermsOfInterest, end_position: usize) -> bool {
    interest
        .first_bound
        .is_some_and(|bound| end_position > bound as usize)
}

/// Feeds an element's descendants through an extractor.
///
/// The anchor element itself contributes no boundary, matching the
/// index-time behavior where the extractor starts inside its anchor.
fn extract_element(extractor: &mut TextExtractor<'_>, element: &xtext_document::Element) {
    for child in &element.children {
        match child {
            xtext_document::Content::Element(child_element) => {
                extractor.start_element(&child_element.name);
                extract_element(extractor, child_element);
                extractor.end_element(&child_element.name);
            }
            xtext_document::Content::Text(text) => extractor.characters(text),
        }
    }
}

/// Materializes a token stream with offsets.
fn analyze(analyzer: &mut TextAnalyzer, text: &str) -> Vec<AnalyzedToken> {
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while let Some(token) = stream.next() {
        tokens.push(AnalyzedToken {
            text: token.text.clone(),
            start: token.offset_from,
            end: token.offset_to,
        });
    }
    tokens
}
