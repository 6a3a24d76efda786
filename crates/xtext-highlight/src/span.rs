//! Match spans and per-node span chains.

use std::collections::BTreeMap;

use xtext_document::NodeId;

/// A matched character range within one node's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSpan {
    /// Start byte offset into the node's text.
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

/// Ordered span chains per node id.
pub type SpanMap = BTreeMap<NodeId, Vec<MatchSpan>>;

/// Adds a span to a node's chain, keeping the chain ordered.
pub(crate) fn push_span(spans: &mut SpanMap, node: NodeId, span: MatchSpan) {
    spans.entry(node).or_default().push(span);
}

/// Merges two span maps into one ordered chain per node.
///
/// Spans from concurrent matches (different queries on the same node) are
/// combined; duplicate start offsets collapse to the longer span.
pub fn merge_spans(mut into: SpanMap, other: SpanMap) -> SpanMap {
    for (node, spans) in other {
        into.entry(node).or_default().extend(spans);
    }
    for spans in into.values_mut() {
        normalize(spans);
    }
    into
}

/// Sorts a chain and collapses duplicate start offsets.
pub(crate) fn normalize(spans: &mut Vec<MatchSpan>) {
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    spans.dedup_by_key(|span| span.start);
}
