//! End-to-end highlighting tests: index, query, correlate, render.

// Integration tests live outside cfg(test) by design
#![allow(clippy::tests_outside_test_module)]

use std::sync::Arc;

use xtext_config::{IndexConfiguration, Settings};
use xtext_document::{DocId, Document, QName, parse_document};
use xtext_highlight::{MatchCorrelator, SpanMap, merge_spans, render_marked};
use xtext_index::{
    NodeMatch, QueryOptions, QueryTranslator, ReindexMode, SearchIndex, TermsOfInterest,
};
use xtext_query::{QueryNode, parse_description};

/// Opens a transient index for a rule document.
fn index_for(xml: &str) -> SearchIndex {
    let conf = parse_document(DocId(0), "/conf", xml).unwrap();
    let config = Arc::new(IndexConfiguration::parse(&conf.root).unwrap());
    SearchIndex::in_memory(config, &Settings::default()).unwrap()
}

/// Indexes and commits one document.
fn store(index: &SearchIndex, doc: &Document) {
    let mut session = index.session(doc, ReindexMode::Store);
    session.run().unwrap();
    index.commit_manager().commit().unwrap();
}

/// Parses a query description fragment.
fn query(xml: &str) -> QueryNode {
    let doc = parse_document(DocId(0), "/query", xml).unwrap();
    parse_description(&doc.root).unwrap()
}

/// Runs a query by element name and collects the highlight terms for it.
fn search_with_terms(
    index: &SearchIndex,
    name: &str,
    description: &str,
) -> (Vec<NodeMatch>, TermsOfInterest) {
    let parsed = query(description);
    let matches = index
        .query(
            &parsed,
            &[QName::parse(name)],
            None,
            None,
            &QueryOptions::default(),
        )
        .unwrap();
    let key = format!("qn:{name}");
    let interest = index
        .commit_manager()
        .with_searcher(|searcher| QueryTranslator::new(index).collect_terms(searcher, &parsed, &key))
        .unwrap();
    (matches, interest)
}

/// Correlates and renders the matched element.
fn highlight(index: &SearchIndex, doc: &Document, description: &str, name: &str) -> String {
    let (matches, interest) = search_with_terms(index, name, description);
    assert!(!matches.is_empty(), "query should match the fixture");
    let correlator = MatchCorrelator::new(index);
    let spans = correlator.correlate(doc, &matches[0], &interest).unwrap();
    let element = doc.element(&matches[0].node.node).unwrap();
    render_marked(element, &spans)
}

#[test]
fn single_term_is_marked_everywhere_it_occurs() {
    let index = index_for(r#"<fulltext><text match="//body"/></fulltext>"#);
    let doc = parse_document(
        DocId(1),
        "/db/1.xml",
        "<doc><body>beta alpha beta</body></doc>",
    )
    .unwrap();
    store(&index, &doc);

    let rendered = highlight(&index, &doc, "<term>beta</term>", "body");
    assert_eq!(
        rendered,
        "<body><xt:match>beta</xt:match> alpha <xt:match>beta</xt:match></body>"
    );
}

#[test]
fn phrase_marks_only_complete_occurrences() {
    let index = index_for(r#"<fulltext><text match="//body"/></fulltext>"#);
    // The first term of the phrase recurs on its own and must stay
    // unmarked.
    let doc = parse_document(
        DocId(1),
        "/db/1.xml",
        "<doc><body>alpha gamma alpha beta</body></doc>",
    )
    .unwrap();
    store(&index, &doc);

    let rendered = highlight(&index, &doc, "<phrase>alpha beta</phrase>", "body");
    assert_eq!(
        rendered,
        "<body>alpha gamma <xt:match>alpha</xt:match> <xt:match>beta</xt:match></body>"
    );
}

#[test]
fn phrase_spans_map_onto_the_right_text_nodes() {
    let index = index_for(r#"<fulltext><text match="//body"/></fulltext>"#);
    let doc = parse_document(
        DocId(1),
        "/db/1.xml",
        "<doc><body><p>alpha beta</p><p>beta alpha</p></body></doc>",
    )
    .unwrap();
    store(&index, &doc);

    let rendered = highlight(&index, &doc, "<phrase>alpha beta</phrase>", "body");
    assert_eq!(
        rendered,
        "<body><p><xt:match>alpha</xt:match> <xt:match>beta</xt:match></p><p>beta alpha</p></body>"
    );
}

#[test]
fn first_bound_discards_late_matches() {
    let index = index_for(r#"<fulltext><text match="//body"/></fulltext>"#);
    let doc = parse_document(
        DocId(1),
        "/db/1.xml",
        "<doc><body>beta alpha beta</body></doc>",
    )
    .unwrap();
    store(&index, &doc);

    let rendered = highlight(
        &index,
        &doc,
        r#"<first end="1"><term>beta</term></first>"#,
        "body",
    );
    assert_eq!(
        rendered,
        "<body><xt:match>beta</xt:match> alpha beta</body>"
    );
}

#[test]
fn concurrent_query_spans_merge_into_one_chain() {
    let index = index_for(r#"<fulltext><text match="//body"/></fulltext>"#);
    let doc = parse_document(
        DocId(1),
        "/db/1.xml",
        "<doc><body>alpha beta gamma</body></doc>",
    )
    .unwrap();
    store(&index, &doc);

    let correlator = MatchCorrelator::new(&index);
    let (matches, alpha_terms) = search_with_terms(&index, "body", "<term>alpha</term>");
    let (_, gamma_terms) = search_with_terms(&index, "body", "<term>gamma</term>");

    let alpha_spans = correlator.correlate(&doc, &matches[0], &alpha_terms).unwrap();
    let gamma_spans = correlator.correlate(&doc, &matches[0], &gamma_terms).unwrap();
    let merged: SpanMap = merge_spans(alpha_spans, gamma_spans);

    let element = doc.element(&matches[0].node.node).unwrap();
    let rendered = render_marked(element, &merged);
    assert_eq!(
        rendered,
        "<body><xt:match>alpha</xt:match> beta <xt:match>gamma</xt:match></body>"
    );
}

#[test]
fn wildcard_matches_highlight_the_expanded_terms() {
    let index = index_for(r#"<fulltext><text match="//body"/></fulltext>"#);
    let doc = parse_document(
        DocId(1),
        "/db/1.xml",
        "<doc><body>database and databases</body></doc>",
    )
    .unwrap();
    store(&index, &doc);

    let rendered = highlight(&index, &doc, "<wildcard>databas*</wildcard>", "body");
    // Both surface forms stem to the same indexed term and are marked.
    assert!(rendered.contains("<xt:match>database</xt:match>"));
    assert!(rendered.contains("<xt:match>databases</xt:match>"));
}

#[test]
fn ignored_subtree_content_is_never_marked() {
    let index = index_for(
        r#"<fulltext><text match="//body"/><ignore qname="note"/></fulltext>"#,
    );
    let doc = parse_document(
        DocId(1),
        "/db/1.xml",
        "<doc><body>alpha <note>alpha</note></body></doc>",
    )
    .unwrap();
    store(&index, &doc);

    let (matches, interest) = search_with_terms(&index, "body", "<term>alpha</term>");
    let correlator = MatchCorrelator::new(&index);
    let spans = correlator.correlate(&doc, &matches[0], &interest).unwrap();

    // Only the text node outside <note> carries a span.
    assert_eq!(spans.len(), 1);
    let element = doc.element(&matches[0].node.node).unwrap();
    let rendered = render_marked(element, &spans);
    assert_eq!(
        rendered,
        "<body><xt:match>alpha</xt:match> <note>alpha</note></body>"
    );
}
