//! Serialization of highlighted subtrees.
//!
//! A node's text is sliced at its span boundaries; each matched slice is
//! wrapped in an `<xt:match>` marker element, text outside spans passes
//! through unchanged.

use std::fmt::Write as _;

use xtext_document::{Content, Element};

use crate::span::SpanMap;

/// Serializes `element` with match markers applied.
pub fn render_marked(element: &Element, spans: &SpanMap) -> String {
    let mut out = String::new();
    write_element(element, spans, &mut out);
    out
}

/// Writes one element, recursing into children.
fn write_element(element: &Element, spans: &SpanMap, out: &mut String) {
    let _ = write!(out, "<{}", element.name);
    for attribute in &element.attributes {
        let _ = write!(
            out,
            " {}=\"{}\"",
            attribute.name,
            escape(&attribute.value, true)
        );
    }
    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &element.children {
        match child {
            Content::Element(child_element) => write_element(child_element, spans, out),
            Content::Text(text) => match spans.get(&text.node_id) {
                Some(chain) => write_marked_text(&text.value, chain, out),
                None => out.push_str(&escape(&text.value, false)),
            },
        }
    }
    let _ = write!(out, "</{}>", element.name);
}

/// Writes text content, wrapping span slices in match markers.
fn write_marked_text(value: &str, chain: &[crate::span::MatchSpan], out: &mut String) {
    let mut cursor = 0usize;
    for span in chain {
        let start = span.start.min(value.len());
        let end = span.end.min(value.len());
        if start < cursor || start >= end {
            continue;
        }
        out.push_str(&escape(&value[cursor..start], false));
        let _ = write!(out, "<xt:match>{}</xt:match>", escape(&value[start..end], false));
        cursor = end;
    }
    out.push_str(&escape(&value[cursor..], false));
}

/// Escapes markup characters; quotes only in attribute values.
fn escape(value: &str, in_attribute: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' if in_attribute => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}
