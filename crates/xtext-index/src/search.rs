//! Query execution.
//!
//! Queries run against refreshed searcher snapshots obtained from the
//! commit manager. Each matched engine document resolves back to the exact
//! node it was created from via the stored document and node ids, and the
//! per-entry boost stored with it scales the engine score.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tantivy::TantivyDocument;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, Occur as EngineOccur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Term, Value};
use xtext_document::{DocId, NodeId, NodeRef, QName};
use xtext_query::{QueryNode, Rewrite};

use crate::{
    error::IndexError,
    index::SearchIndex,
    schema::{SHARED_KEY, encode_key},
    translate::QueryTranslator,
};

/// One matched node with its score and the entry metadata.
#[derive(Debug, Clone, Serialize)]
pub struct NodeMatch {
    /// The node the entry came from.
    pub node: NodeRef,
    /// Engine score scaled by the entry's boost.
    pub score: f32,
    /// The content key the entry was indexed under.
    pub key: String,
    /// URI of the document the entry belongs to.
    pub uri: String,
    /// Facet paths stored with the entry.
    pub facets: Vec<String>,
}

/// Options shared by the query entry points.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Maximum matches retrieved per field; `None` uses the index default.
    pub limit: Option<usize>,
    /// Default multi-term rewrite strategy.
    pub rewrite: Rewrite,
    /// Restrict matches to entries carrying this exact facet path.
    pub facet_filter: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: None,
            rewrite: Rewrite::Scoring,
            facet_filter: None,
        }
    }
}

/// One term with its summed document frequency, from a dictionary scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermCount {
    /// The indexed term.
    pub term: String,
    /// Number of entries containing it.
    pub count: u64,
}

impl SearchIndex {
    /// Queries the index by qualified node names.
    ///
    /// With an empty `names` slice, every defined content key is queried.
    /// `docs` restricts matches to a document set; `context` restricts
    /// them to descendants-or-self of the given nodes.
    pub fn query(
        &self,
        description: &QueryNode,
        names: &[QName],
        docs: Option<&HashSet<DocId>>,
        context: Option<&[NodeRef]>,
        options: &QueryOptions,
    ) -> Result<Vec<NodeMatch>, IndexError> {
        let keys: Vec<String> = if names.is_empty() {
            self.schema()
                .content_keys()
                .iter()
                .map(|key| (*key).to_string())
                .collect()
        } else {
            names
                .iter()
                .map(|name| format!("qn:{}", name.encoded()))
                .collect()
        };

        let mut matches = Vec::new();
        for key in keys {
            matches.extend(self.run_query(&key, description, docs, context, options)?);
        }
        Ok(matches)
    }

    /// Queries one named field.
    pub fn query_field(
        &self,
        field_name: &str,
        description: &QueryNode,
        docs: Option<&HashSet<DocId>>,
        context: Option<&[NodeRef]>,
        options: &QueryOptions,
    ) -> Result<Vec<NodeMatch>, IndexError> {
        self.run_query(
            &format!("field:{field_name}"),
            description,
            docs,
            context,
            options,
        )
    }

    /// Runs one translated query against one content key.
    fn run_query(
        &self,
        key: &str,
        description: &QueryNode,
        docs: Option<&HashSet<DocId>>,
        context: Option<&[NodeRef]>,
        options: &QueryOptions,
    ) -> Result<Vec<NodeMatch>, IndexError> {
        let schema = self.schema();

        // Keys without their own field route through the shared field,
        // filtered by the exact qname keyword.
        let (effective_key, qname_filter) = if schema.content_field(key).is_some() {
            (key.to_string(), None)
        } else if schema.shared_field().is_some() && key != SHARED_KEY {
            (SHARED_KEY.to_string(), Some(key.to_string()))
        } else {
            return Ok(Vec::new());
        };

        let limit = options.limit.unwrap_or_else(|| self.default_limit());
        let translator = QueryTranslator::new(self);

        self.commit_manager().with_searcher(|searcher| {
            let translated =
                translator.translate(searcher, description, &effective_key, options.rewrite)?;

            let mut clauses: Vec<(EngineOccur, Box<dyn Query>)> =
                vec![(EngineOccur::Must, translated.query)];
            if let Some(qname_key) = &qname_filter {
                clauses.push((
                    EngineOccur::Must,
                    Box::new(TermQuery::new(
                        Term::from_field_text(schema.qname, qname_key),
                        IndexRecordOption::Basic,
                    )),
                ));
            }
            if let Some(facet_path) = &options.facet_filter {
                clauses.push((
                    EngineOccur::Must,
                    Box::new(TermQuery::new(
                        Term::from_field_text(schema.facet, facet_path),
                        IndexRecordOption::Basic,
                    )),
                ));
            }
            let query: Box<dyn Query> = if clauses.len() == 1 {
                let (_, only) = clauses.remove(0);
                only
            } else {
                Box::new(BooleanQuery::new(clauses))
            };

            let top_docs = searcher
                .search(&query, &TopDocs::with_limit(limit))
                .map_err(|e| IndexError::search(&e))?;

            let mut matches = Vec::with_capacity(top_docs.len());
            for (score, address) in top_docs {
                let doc: TantivyDocument =
                    searcher.doc(address).map_err(|e| IndexError::search(&e))?;
                let Some(node_match) = self.resolve_match(&doc, score)? else {
                    continue;
                };
                if let Some(allowed) = docs
                    && !allowed.contains(&node_match.node.doc)
                {
                    continue;
                }
                if let Some(ancestors) = context
                    && !ancestors.iter().any(|ancestor| {
                        ancestor.doc == node_match.node.doc
                            && node_match
                                .node
                                .node
                                .is_self_or_descendant_of(&ancestor.node)
                    })
                {
                    continue;
                }
                matches.push(node_match);
            }
            Ok(matches)
        })
    }

    /// Reconstructs a [`NodeMatch`] from a stored engine document.
    fn resolve_match(
        &self,
        doc: &TantivyDocument,
        score: f32,
    ) -> Result<Option<NodeMatch>, IndexError> {
        let schema = self.schema();
        let Some(doc_id) = doc.get_first(schema.doc_id).and_then(|v| v.as_u64()) else {
            return Ok(None);
        };
        let Some(node_bytes) = doc.get_first(schema.node_id).and_then(|v| v.as_bytes()) else {
            return Ok(None);
        };
        let Some(key) = doc.get_first(schema.qname).and_then(|v| v.as_str()) else {
            return Ok(None);
        };
        let uri = doc
            .get_first(schema.uri)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let boost = doc
            .get_first(schema.boost)
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0);
        let facets: Vec<String> = doc
            .get_all(schema.facet)
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        let node = NodeId::from_bytes(node_bytes)?;
        let name = match key.strip_prefix("qn:") {
            Some(encoded) => QName::parse(encoded.strip_prefix('@').unwrap_or(encoded)),
            None => QName::local(key.strip_prefix("field:").unwrap_or(key)),
        };

        Ok(Some(NodeMatch {
            node: NodeRef {
                doc: DocId(u32::try_from(doc_id).unwrap_or(u32::MAX)),
                node,
                name,
            },
            score: score * boost as f32,
            key: key.to_string(),
            uri,
            facets,
        }))
    }

    /// The content keys defined for this index.
    ///
    /// Concrete keys come from the schema; when a shared wildcard field
    /// exists, the exact keys seen in the live index replace it.
    pub fn defined_keys(&self) -> Result<Vec<String>, IndexError> {
        let schema = self.schema();
        let mut keys: HashSet<String> = schema
            .content_keys()
            .iter()
            .filter(|key| **key != SHARED_KEY)
            .map(|key| (*key).to_string())
            .collect();

        if schema.shared_field().is_some() {
            self.commit_manager().with_searcher(|searcher| {
                for segment_reader in searcher.segment_readers() {
                    let inverted = segment_reader
                        .inverted_index(schema.qname)
                        .map_err(|e| IndexError::search(&e))?;
                    let mut stream = inverted
                        .terms()
                        .stream()
                        .map_err(|e| IndexError::Search(e.to_string()))?;
                    while stream.advance() {
                        if let Ok(term) = core::str::from_utf8(stream.key()) {
                            keys.insert(term.to_string());
                        }
                    }
                }
                Ok(())
            })?;
        }

        let mut sorted: Vec<String> = keys.into_iter().collect();
        sorted.sort_unstable();
        Ok(sorted)
    }

    /// True if any committed entry belongs to the document.
    pub fn has_entries_for(&self, doc: DocId) -> Result<bool, IndexError> {
        self.commit_manager().with_searcher(|searcher| {
            let query = TermQuery::new(
                Term::from_field_u64(self.schema().doc_id, u64::from(doc.0)),
                IndexRecordOption::Basic,
            );
            let count = searcher
                .search(&query, &Count)
                .map_err(|e| IndexError::search(&e))?;
            Ok(count > 0)
        })
    }

    /// Scans the ordered term dictionary of the given names.
    ///
    /// Bounds are inclusive; at most `max` distinct terms are returned,
    /// with document frequencies summed across names and segments.
    pub fn scan_terms(
        &self,
        names: &[QName],
        start: Option<&str>,
        end: Option<&str>,
        max: usize,
    ) -> Result<Vec<TermCount>, IndexError> {
        let schema = self.schema();
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();

        self.commit_manager().with_searcher(|searcher| {
            for name in names {
                let key = format!("qn:{}", name.encoded());
                let Some(field) = schema.content_field(&key) else {
                    continue;
                };
                for segment_reader in searcher.segment_readers() {
                    let inverted = segment_reader
                        .inverted_index(field)
                        .map_err(|e| IndexError::search(&e))?;
                    let terms = inverted.terms();
                    let mut builder = terms.range();
                    if let Some(lower) = start {
                        builder = builder.ge(lower.as_bytes());
                    }
                    if let Some(upper) = end {
                        builder = builder.le(upper.as_bytes());
                    }
                    let mut stream = builder
                        .into_stream()
                        .map_err(|e| IndexError::Search(e.to_string()))?;
                    while stream.advance() {
                        if counts.len() >= max {
                            break;
                        }
                        if let Ok(term) = core::str::from_utf8(stream.key()) {
                            let doc_freq = u64::from(stream.value().doc_freq);
                            *counts.entry(term.to_string()).or_insert(0) += doc_freq;
                        }
                    }
                }
            }
            Ok(())
        })?;

        Ok(counts
            .into_iter()
            .map(|(term, count)| TermCount { term, count })
            .collect())
    }

    /// Facet paths stored with a node's entries.
    pub fn stored_facets(&self, node: &NodeRef) -> Result<Vec<String>, IndexError> {
        let schema = self.schema();
        self.commit_manager().with_searcher(|searcher| {
            let query = TermQuery::new(
                Term::from_field_bytes(schema.id, &encode_key(node.doc, &node.node)),
                IndexRecordOption::Basic,
            );
            let top_docs = searcher
                .search(&query, &TopDocs::with_limit(16))
                .map_err(|e| IndexError::search(&e))?;
            let mut facets = Vec::new();
            for (_, address) in top_docs {
                let doc: TantivyDocument =
                    searcher.doc(address).map_err(|e| IndexError::search(&e))?;
                facets.extend(
                    doc.get_all(schema.facet)
                        .filter_map(|v| v.as_str().map(str::to_string)),
                );
            }
            facets.sort_unstable();
            facets.dedup();
            Ok(facets)
        })
    }

    /// Counts facet values under a dimension across a match set.
    pub fn facet_counts(matches: &[NodeMatch], dimension: &str) -> BTreeMap<String, u64> {
        let prefix = format!("/{dimension}/");
        let mut counts = BTreeMap::new();
        for node_match in matches {
            for facet in &node_match.facets {
                if let Some(value) = facet.strip_prefix(&prefix) {
                    *counts.entry(value.to_string()).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    /// Merges all segments into one. Writes are blocked while the merge
    /// runs; the result is committed immediately.
    pub fn optimize(&self) -> Result<(), IndexError> {
        let segment_ids = self
            .engine()
            .searchable_segment_ids()
            .map_err(|e| IndexError::search(&e))?;
        if segment_ids.len() > 1 {
            self.commit_manager().with_writer(|writer| {
                writer
                    .merge(&segment_ids)
                    .wait()
                    .map_err(|e| IndexError::commit(&e))?;
                Ok(())
            })?;
        }
        self.commit_manager().commit()?;
        Ok(())
    }
}
