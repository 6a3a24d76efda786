//! End-to-end tests for the indexing pipeline and query path.

// Integration tests live outside cfg(test) by design
#![allow(clippy::tests_outside_test_module)]

use std::collections::HashSet;
use std::sync::Arc;

use xtext_config::{IndexConfiguration, Settings};
use xtext_document::{DocId, Document, QName, parse_document};
use xtext_index::{NodeMatch, QueryOptions, ReindexMode, SearchIndex};
use xtext_query::{QueryNode, parse_description};

/// Builds a configuration from a rule document.
fn config(xml: &str) -> Arc<IndexConfiguration> {
    let doc = parse_document(DocId(0), "/db/system/config.xconf", xml).unwrap();
    Arc::new(IndexConfiguration::parse(&doc.root).unwrap())
}

/// Opens a transient index for a configuration.
fn index_for(xml: &str) -> SearchIndex {
    SearchIndex::in_memory(config(xml), &Settings::default()).unwrap()
}

/// Parses a document fixture.
fn document(id: u32, uri: &str, xml: &str) -> Document {
    parse_document(DocId(id), uri, xml).unwrap()
}

/// Indexes a document in `Store` mode and commits.
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

/// Runs a query against one element name.
fn search(index: &SearchIndex, name: &str, description: &str) -> Vec<NodeMatch> {
    index
        .query(
            &query(description),
            &[QName::parse(name)],
            None,
            None,
            &QueryOptions::default(),
        )
        .unwrap()
}

#[test]
fn term_query_returns_the_matched_node() {
    let index = index_for(r#"<fulltext><text match="/article/body"/></fulltext>"#);
    let doc = document(1, "/db/a1.xml", "<article><body>alpha beta</body></article>");
    store(&index, &doc);

    let matches = search(&index, "body", "<term>beta</term>");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].node.doc, DocId(1));
    assert_eq!(matches[0].node.name, QName::local("body"));
    // The body element is the first child slot of <article>.
    assert_eq!(matches[0].node.node.to_string(), "1.1");

    // Store-mode commit leaves the manager clean.
    assert!(!index.commit_manager().is_dirty());

    assert!(search(&index, "body", "<term>gamma</term>").is_empty());
}

#[test]
fn indexing_then_removing_a_document_leaves_no_entries() {
    let index = index_for(r#"<fulltext><text match="//p"/></fulltext>"#);
    let doc = document(
        7,
        "/db/d.xml",
        "<doc><p>alpha</p><p>beta</p><p>gamma</p></doc>",
    );
    store(&index, &doc);
    assert_eq!(index.num_entries().unwrap(), 3);
    assert!(index.has_entries_for(DocId(7)).unwrap());

    let mut session = index.session(&doc, ReindexMode::RemoveAllNodes);
    session.flush().unwrap();
    index.commit_manager().commit().unwrap();

    assert_eq!(index.num_entries().unwrap(), 0);
    assert!(!index.has_entries_for(DocId(7)).unwrap());
}

#[test]
fn remove_some_nodes_removes_only_the_subtree() {
    let index = index_for(r#"<fulltext><text match="//p"/></fulltext>"#);
    let doc = document(1, "/db/d.xml", "<doc><p>alpha</p><p>beta</p></doc>");
    store(&index, &doc);

    // Replace the second <p>: its entries go, the sibling's stay.
    let second_p = matches_node(&search(&index, "p", "<term>beta</term>"));
    let mut session = index.session(&doc, ReindexMode::RemoveSomeNodes);
    session.run_subtree(&second_p).unwrap();
    index.commit_manager().commit().unwrap();

    assert!(search(&index, "p", "<term>beta</term>").is_empty());
    assert_eq!(search(&index, "p", "<term>alpha</term>").len(), 1);
}

/// Extracts the single match's node id.
fn matches_node(matches: &[NodeMatch]) -> xtext_document::NodeId {
    assert_eq!(matches.len(), 1);
    matches[0].node.node.clone()
}

#[test]
fn indexing_twice_with_reindex_semantics_is_idempotent() {
    let index = index_for(r#"<fulltext><text match="//p"/></fulltext>"#);
    let doc = document(1, "/db/d.xml", "<doc><p>alpha</p><p>beta</p></doc>");
    store(&index, &doc);
    assert_eq!(index.num_entries().unwrap(), 2);

    // Re-store with replace semantics: old entries per node are dropped
    // before the new ones are written.
    let mut session = index.session(&doc, ReindexMode::Store);
    session.set_reindexing(true);
    session.run().unwrap();
    index.commit_manager().commit().unwrap();

    assert_eq!(index.num_entries().unwrap(), 2);
    assert_eq!(search(&index, "p", "<term>alpha</term>").len(), 1);
    assert_eq!(search(&index, "p", "<term>beta</term>").len(), 1);
}

#[test]
fn facet_value_is_recorded_for_the_entry() {
    let index = index_for(
        r#"<fulltext>
            <text match="//name">
                <facet dimension="category" expression="../@cat"/>
            </text>
        </fulltext>"#,
    );
    let doc = document(1, "/db/i.xml", r#"<item cat="fruit"><name>apple</name></item>"#);
    store(&index, &doc);

    let matches = search(&index, "name", "<term>apple</term>");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].facets, vec!["/category/fruit"]);
    assert_eq!(
        index.stored_facets(&matches[0].node).unwrap(),
        vec!["/category/fruit"]
    );

    let counts = SearchIndex::facet_counts(&matches, "category");
    assert_eq!(counts.get("fruit"), Some(&1));
}

#[test]
fn facet_filter_restricts_matches() {
    let index = index_for(
        r#"<fulltext>
            <text match="//name">
                <facet dimension="category" expression="../@cat"/>
            </text>
        </fulltext>"#,
    );
    store(
        &index,
        &document(1, "/db/a.xml", r#"<item cat="fruit"><name>apple</name></item>"#),
    );
    store(
        &index,
        &document(2, "/db/b.xml", r#"<item cat="tool"><name>hammer</name></item>"#),
    );

    let options = QueryOptions {
        facet_filter: Some("/category/tool".to_string()),
        ..QueryOptions::default()
    };
    let matches = index
        .query(
            &query("<wildcard>*</wildcard>"),
            &[QName::local("name")],
            None,
            None,
            &options,
        )
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].node.doc, DocId(2));
}

#[test]
fn boolean_must_and_not_clauses() {
    let index = index_for(r#"<fulltext><text match="/article/body"/></fulltext>"#);
    store(&index, &document(1, "/db/1.xml", "<article><body>a b</body></article>"));
    store(&index, &document(2, "/db/2.xml", "<article><body>a</body></article>"));
    store(&index, &document(3, "/db/3.xml", "<article><body>b</body></article>"));

    let matches = search(
        &index,
        "body",
        r#"<bool><term occur="must">a</term><term occur="not">b</term></bool>"#,
    );
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].node.doc, DocId(2));
}

#[test]
fn phrase_requires_the_full_sequence() {
    let index = index_for(r#"<fulltext><text match="//body"/></fulltext>"#);
    store(
        &index,
        &document(1, "/db/1.xml", "<doc><body>native xml database</body></doc>"),
    );
    store(
        &index,
        &document(2, "/db/2.xml", "<doc><body>database native</body></doc>"),
    );

    let matches = search(&index, "body", "<phrase>native xml</phrase>");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].node.doc, DocId(1));
}

#[test]
fn wildcard_prefix_fuzzy_and_regex_queries() {
    let index = index_for(r#"<fulltext><text match="//body"/></fulltext>"#);
    store(
        &index,
        &document(1, "/db/1.xml", "<doc><body>database</body></doc>"),
    );

    assert_eq!(search(&index, "body", "<wildcard>data*</wildcard>").len(), 1);
    assert_eq!(search(&index, "body", "<prefix>datab</prefix>").len(), 1);
    assert_eq!(
        search(&index, "body", r#"<fuzzy max-edits="1">databose</fuzzy>"#).len(),
        1
    );
    assert_eq!(search(&index, "body", "<regex>data.*</regex>").len(), 1);
    assert!(search(&index, "body", "<wildcard>xyz*</wildcard>").is_empty());
}

#[test]
fn near_query_respects_slop() {
    let index = index_for(r#"<fulltext><text match="//body"/></fulltext>"#);
    store(
        &index,
        &document(1, "/db/1.xml", "<doc><body>alpha gap beta</body></doc>"),
    );

    assert!(search(&index, "body", r#"<near slop="0">alpha beta</near>"#).is_empty());
    assert_eq!(
        search(&index, "body", r#"<near slop="1">alpha beta</near>"#).len(),
        1
    );
}

#[test]
fn named_field_rules_are_queryable_by_name() {
    let index = index_for(r#"<fulltext><text match="//head" field="headline"/></fulltext>"#);
    let doc = document(1, "/db/1.xml", "<doc><head>breaking news</head></doc>");
    store(&index, &doc);

    let matches = index
        .query_field(
            "headline",
            &query("<term>breaking</term>"),
            None,
            None,
            &QueryOptions::default(),
        )
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].key, "field:headline");
}

#[test]
fn attribute_rules_index_attribute_values() {
    let index = index_for(r#"<fulltext><text qname="@type"/></fulltext>"#);
    let doc = document(1, "/db/1.xml", r#"<doc type="report"><p>x</p></doc>"#);
    store(&index, &doc);

    let matches = search(&index, "@type", "<term>report</term>");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].node.name, QName::local("type"));
    // The attribute occupies the first child slot of <doc>.
    assert_eq!(matches[0].node.node.to_string(), "1.1");
}

#[test]
fn document_set_and_context_filters() {
    let index = index_for(r#"<fulltext><text match="//p"/></fulltext>"#);
    store(&index, &document(1, "/db/1.xml", "<doc><p>same text</p></doc>"));
    store(&index, &document(2, "/db/2.xml", "<doc><p>same text</p></doc>"));

    let allowed: HashSet<DocId> = [DocId(2)].into_iter().collect();
    let matches = index
        .query(
            &query("<term>same</term>"),
            &[QName::local("p")],
            Some(&allowed),
            None,
            &QueryOptions::default(),
        )
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].node.doc, DocId(2));
}

#[test]
fn wildcard_tail_rules_use_the_shared_field() {
    let index = index_for(r#"<fulltext><text match="/doc/*"/></fulltext>"#);
    let doc = document(1, "/db/1.xml", "<doc><a>alpha</a><b>beta</b></doc>");
    store(&index, &doc);

    // Querying by the concrete element name finds the shared-field entry.
    let matches = search(&index, "a", "<term>alpha</term>");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].node.name, QName::local("a"));

    // The qname keyword keeps entries apart.
    assert!(search(&index, "a", "<term>beta</term>").is_empty());
    assert_eq!(search(&index, "b", "<term>beta</term>").len(), 1);
}

#[test]
fn defined_keys_and_term_scan() {
    let index = index_for(
        r#"<fulltext>
            <text match="//body"/>
            <text match="//head" field="headline"/>
        </fulltext>"#,
    );
    store(
        &index,
        &document(1, "/db/1.xml", "<doc><head>x</head><body>alpha beta alpha</body></doc>"),
    );

    let keys = index.defined_keys().unwrap();
    assert!(keys.contains(&"qn:body".to_string()));
    assert!(keys.contains(&"field:headline".to_string()));

    let counts = index
        .scan_terms(&[QName::local("body")], None, None, 10)
        .unwrap();
    let terms: Vec<&str> = counts.iter().map(|c| c.term.as_str()).collect();
    assert_eq!(terms, vec!["alpha", "beta"]);

    let bounded = index
        .scan_terms(&[QName::local("body")], Some("b"), None, 10)
        .unwrap();
    assert_eq!(bounded.len(), 1);
    assert_eq!(bounded[0].term, "beta");
}

#[test]
fn binary_resources_are_removed_by_uri() {
    let index = index_for(r#"<fulltext><text match="//x" field="abstract"/></fulltext>"#);
    let descriptor_doc = document(
        9,
        "/db/report.pdf",
        r#"<doc><field name="abstract">summary text</field></doc>"#,
    );
    let descriptor = xtext_index::PlainTextDoc::parse(&descriptor_doc.root).unwrap();
    index.index_plain_text("/db/report.pdf", &descriptor).unwrap();
    index.commit_manager().commit().unwrap();
    assert_eq!(index.num_entries().unwrap(), 1);

    let mut session = index.session(&descriptor_doc, ReindexMode::RemoveBinaryResource);
    session.flush().unwrap();
    index.commit_manager().commit().unwrap();
    assert_eq!(index.num_entries().unwrap(), 0);
}

#[test]
fn expression_failure_disables_only_that_rule() {
    let index = index_for(
        r#"<fulltext>
            <text match="//name">
                <facet dimension="bad" expression="count(x)"/>
            </text>
            <text match="//body"/>
        </fulltext>"#,
    );
    let doc = document(
        1,
        "/db/1.xml",
        "<item><name>apple</name><body>alpha</body></item>",
    );
    let mut session = index.session(&doc, ReindexMode::Store);
    session.run().unwrap();
    let report = session.into_report();
    assert_eq!(report.disabled_rules.len(), 1);
    index.commit_manager().commit().unwrap();

    // Both entries exist; only the facet is missing.
    assert_eq!(search(&index, "body", "<term>alpha</term>").len(), 1);
    let name_matches = search(&index, "name", "<term>apple</term>");
    assert_eq!(name_matches.len(), 1);
    assert!(name_matches[0].facets.is_empty());
}

#[test]
fn boost_scales_scores() {
    let index = index_for(
        r#"<fulltext>
            <text match="//p">
                <match-attribute qname="rank" value="high" boost="10.0"/>
            </text>
        </fulltext>"#,
    );
    let doc = document(
        1,
        "/db/1.xml",
        r#"<doc><p rank="high">same words</p><p>same words</p></doc>"#,
    );
    store(&index, &doc);

    let mut matches = search(&index, "p", "<term>same</term>");
    assert_eq!(matches.len(), 2);
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    // The boosted sibling wins by an order of magnitude.
    assert!(matches[0].score > matches[1].score * 5.0);
    assert_eq!(matches[0].node.node.to_string(), "1.1");
}

#[test]
fn eager_flush_writes_entries_mid_walk() {
    let mut settings = Settings::default();
    settings.settings.buffer_limit = 8;
    let index = SearchIndex::in_memory(
        config(r#"<fulltext><text match="//p"/></fulltext>"#),
        &settings,
    )
    .unwrap();
    let doc = document(
        1,
        "/db/d.xml",
        "<doc><p>alpha alpha</p><p>beta beta</p><p>gamma gamma</p></doc>",
    );

    let mut session = index.session(&doc, ReindexMode::Store);
    session.run().unwrap();
    assert_eq!(session.report().entries_written, 3);

    index.commit_manager().commit().unwrap();
    assert_eq!(index.num_entries().unwrap(), 3);
}

#[test]
fn expression_rules_defer_the_eager_flush() {
    // With a tiny buffer the session would flush mid-walk, but expression
    // rules need a structurally complete document, so everything is held
    // until the walk ends and the facets come out right.
    let mut settings = Settings::default();
    settings.settings.buffer_limit = 1;
    let index = SearchIndex::in_memory(
        config(
            r#"<fulltext>
                <text match="//name">
                    <facet dimension="category" expression="../@cat"/>
                </text>
            </fulltext>"#,
        ),
        &settings,
    )
    .unwrap();
    let doc = document(
        1,
        "/db/i.xml",
        r#"<list><item cat="fruit"><name>apple</name></item><item cat="tool"><name>hammer</name></item></list>"#,
    );

    let mut session = index.session(&doc, ReindexMode::Store);
    assert!(session.can_flush());
    session.run().unwrap();
    index.commit_manager().commit().unwrap();

    let apple = search(&index, "name", "<term>apple</term>");
    assert_eq!(apple[0].facets, vec!["/category/fruit"]);
    let hammer = search(&index, "name", "<term>hammer</term>");
    assert_eq!(hammer[0].facets, vec!["/category/tool"]);
}
