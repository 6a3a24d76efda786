//! The per-document indexing session.
//!
//! One session is created per document-processing pass and discarded
//! afterwards. It consumes the structural event stream, keeps a stack of
//! active text extractors (one per currently-open matched ancestor),
//! buffers pending entries, and flushes them through the commit manager.
//! The [`ReindexMode`] set at construction decides what a flush does:
//! store buffered entries, remove a whole document, remove the buffered
//! node set, or remove a binary resource by URI.
//!
//! Expression-bearing rules are compiled lazily, once per rule; a rule
//! whose expression fails is disabled for the remainder of the session and
//! reported, while indexing continues for all other rules.

use std::collections::{BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use tantivy::schema::Term;
use tantivy::{DateTime, TantivyDocument};
use xtext_config::{FacetSpec, FieldKind, IndexConfiguration, IndexRule, RuleId};
use xtext_document::{Document, NodeId, NodePath, NodeRef, TreeEvent, stream_tree};

use crate::{
    error::IndexError,
    eval::CompiledExpr,
    extract::TextExtractor,
    index::SearchIndex,
    schema::{SHARED_KEY, encode_key},
};

/// What a session's flush does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexMode {
    /// Buffer and store entries for matched nodes.
    Store,
    /// Remove every entry of the current document.
    RemoveAllNodes,
    /// Remove only the nodes collected during the walk.
    RemoveSomeNodes,
    /// Remove a binary resource's entries, keyed by URI.
    RemoveBinaryResource,
}

/// A buffered, not-yet-committed unit of indexed text.
///
/// Created during the tree walk and consumed exactly once by the flush
/// that writes it.
#[derive(Debug)]
struct PendingEntry {
    /// The node the text came from.
    node: NodeRef,
    /// Snapshot of the node's path, including captured attributes.
    path: NodePath,
    /// Extracted character content.
    text: String,
    /// Effective boost (static x satisfied attribute conditions).
    boost: f32,
    /// The rule that produced the entry.
    rule: RuleId,
}

/// One active extractor on the session stack.
struct ActiveExtractor<'a> {
    /// The rule whose anchor opened this extractor.
    rule: RuleId,
    /// The anchor element.
    anchor: NodeRef,
    /// Snapshot of the anchor's path.
    path: NodePath,
    /// The accumulating extractor.
    extractor: TextExtractor<'a>,
}

/// What happened during a session.
#[derive(Debug, Default)]
pub struct SessionReport {
    /// Entries written to the engine.
    pub entries_written: usize,
    /// Node entries deleted.
    pub nodes_removed: usize,
    /// Rules disabled by expression failures, with the reason.
    pub disabled_rules: Vec<(RuleId, String)>,
    /// Non-fatal notes (skipped values, conversion failures).
    pub notes: Vec<String>,
}

/// A per-document indexing pass.
pub struct IndexingSession<'a> {
    /// The owning index.
    index: &'a SearchIndex,
    /// The document being processed.
    document: &'a Document,
    /// Flush behavior.
    mode: ReindexMode,
    /// True when old entries for written nodes must be deleted first.
    reindexing: bool,
    /// Stack of active extractors.
    extractors: Vec<ActiveExtractor<'a>>,
    /// Buffered entries awaiting flush.
    pending: Vec<PendingEntry>,
    /// Node ids collected for removal.
    removals: BTreeSet<NodeId>,
    /// Total buffered text bytes.
    buffered: usize,
    /// True while a whole-document walk is in progress.
    walking: bool,
    /// Compiled expressions, keyed by rule.
    expr_cache: HashMap<RuleId, CompiledExpr>,
    /// Rules disabled for the rest of the session.
    disabled: BTreeSet<RuleId>,
    /// Session outcome.
    report: SessionReport,
}

impl<'a> IndexingSession<'a> {
    /// Creates a session. The mode is fixed for the session's lifetime.
    pub fn new(index: &'a SearchIndex, document: &'a Document, mode: ReindexMode) -> Self {
        Self {
            index,
            document,
            mode,
            reindexing: false,
            extractors: Vec::new(),
            pending: Vec::new(),
            removals: BTreeSet::new(),
            buffered: 0,
            walking: false,
            expr_cache: HashMap::new(),
            disabled: BTreeSet::new(),
            report: SessionReport::default(),
        }
    }

    /// Marks this session as replacing existing entries: each written node
    /// deletes its old entries first.
    pub fn set_reindexing(&mut self, reindexing: bool) {
        self.reindexing = reindexing;
    }

    /// True if a flush may run now.
    ///
    /// While a document walk is in progress and any rule evaluates
    /// expressions, the document is not yet structurally complete and
    /// flushing must wait.
    pub fn can_flush(&self) -> bool {
        !(self.walking && self.index.configuration().has_expression_rules())
    }

    /// Walks the whole document and flushes. This is the common path.
    pub fn run(&mut self) -> Result<(), IndexError> {
        let document = self.document;
        self.walking = true;
        let result = self.walk_subtree_inner(&document.root, NodePath::new());
        self.walking = false;
        result?;
        self.flush()
    }

    /// Walks only the subtree rooted at `anchor` (a reindex root), then
    /// flushes. Ancestor paths are reconstructed so patterns match as they
    /// would in a full walk.
    pub fn run_subtree(&mut self, anchor: &NodeId) -> Result<(), IndexError> {
        let document = self.document;
        let element = document.element(anchor)?;
        let base = self.path_to_parent(anchor)?;
        self.walking = true;
        let result = self.walk_subtree_inner(element, base);
        self.walking = false;
        result?;
        self.flush()
    }

    /// Streams events for `root` on top of `base` and handles them.
    fn walk_subtree_inner(
        &mut self,
        root: &xtext_document::Element,
        mut base: NodePath,
    ) -> Result<(), IndexError> {
        let mut first_error: Option<IndexError> = None;
        stream_tree(root, &mut base, &mut |event| {
            if first_error.is_some() {
                return;
            }
            if let Err(error) = self.handle_event(&event) {
                first_error = Some(error);
            }
        });
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Builds the path of `node`'s ancestors, excluding `node` itself.
    fn path_to_parent(&self, node: &NodeId) -> Result<NodePath, IndexError> {
        let mut path = NodePath::new();
        let levels = node.levels();
        for len in 1..levels.len() {
            let ancestor_id = NodeId::from_levels(levels[..len].to_vec());
            let element = self.document.element(&ancestor_id)?;
            path.push(xtext_document::PathStep::element(
                element.name.clone(),
                element.attr_pairs(),
            ));
        }
        Ok(path)
    }

    /// Dispatches one structural event.
    pub fn handle_event(&mut self, event: &TreeEvent<'_>) -> Result<(), IndexError> {
        match event {
            TreeEvent::StartElement { element, path } => self.on_start_element(element, path),
            TreeEvent::Attribute {
                owner,
                attribute,
                path,
            } => self.on_attribute(owner, attribute, path),
            TreeEvent::Characters { text, .. } => {
                if self.mode == ReindexMode::Store {
                    for active in &mut self.extractors {
                        active.extractor.characters(text);
                    }
                }
                Ok(())
            }
            TreeEvent::EndElement { element, path } => self.on_end_element(element, path),
        }
    }

    /// Element entry: feed open extractors, then push one extractor per
    /// matching rule.
    fn on_start_element(
        &mut self,
        element: &xtext_document::Element,
        path: &NodePath,
    ) -> Result<(), IndexError> {
        if self.mode != ReindexMode::Store {
            return Ok(());
        }
        for active in &mut self.extractors {
            active.extractor.start_element(&element.name);
        }
        let index = self.index;
        let config: &IndexConfiguration = index.configuration();
        let doc = self.document.id;
        for rule in config.rules_for(path) {
            if rule.pattern.targets_attribute() {
                continue;
            }
            self.extractors.push(ActiveExtractor {
                rule: rule.id,
                anchor: NodeRef {
                    doc,
                    node: element.node_id.clone(),
                    name: element.name.clone(),
                },
                path: path.clone(),
                extractor: TextExtractor::new(config),
            });
        }
        Ok(())
    }

    /// Attribute event: produce an entry (Store) or collect for removal.
    fn on_attribute(
        &mut self,
        owner: &xtext_document::Element,
        attribute: &xtext_document::Attribute,
        path: &NodePath,
    ) -> Result<(), IndexError> {
        match self.mode {
            ReindexMode::Store => {
                let config = self.index.configuration();
                let mut produced = Vec::new();
                for rule in config.rules_for(path) {
                    produced.push(PendingEntry {
                        node: NodeRef {
                            doc: self.document.id,
                            node: attribute.node_id.clone(),
                            name: attribute.name.clone(),
                        },
                        path: path.clone(),
                        text: attribute.value.clone(),
                        boost: rule.boost_for(&owner.attr_pairs()),
                        rule: rule.id,
                    });
                }
                for entry in produced {
                    self.add_pending(entry)?;
                }
                Ok(())
            }
            ReindexMode::RemoveSomeNodes => {
                if self.index.configuration().matches(path) {
                    self.removals.insert(attribute.node_id.clone());
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Element exit: feed extractors the boundary, pop one per matching
    /// rule and turn it into a pending entry.
    fn on_end_element(
        &mut self,
        element: &xtext_document::Element,
        path: &NodePath,
    ) -> Result<(), IndexError> {
        match self.mode {
            ReindexMode::Store => {
                for active in &mut self.extractors {
                    active.extractor.end_element(&element.name);
                }
                let matching: Vec<RuleId> = self
                    .index
                    .configuration()
                    .rules_for(path)
                    .iter()
                    .filter(|rule| !rule.pattern.targets_attribute())
                    .map(|rule| rule.id)
                    .collect();
                let mut produced = Vec::new();
                for _ in &matching {
                    let Some(active) = self.extractors.pop() else {
                        return Err(IndexError::Write(
                            "extractor stack underflow".to_string(),
                        ));
                    };
                    let boost = self
                        .index
                        .configuration()
                        .rule(active.rule)
                        .boost_for(&element.attr_pairs());
                    let (text, _) = active.extractor.into_parts();
                    produced.push(PendingEntry {
                        node: active.anchor,
                        path: active.path,
                        text,
                        boost,
                        rule: active.rule,
                    });
                }
                for entry in produced {
                    self.add_pending(entry)?;
                }
                Ok(())
            }
            ReindexMode::RemoveSomeNodes => {
                if self.index.configuration().matches(path) {
                    self.removals.insert(element.node_id.clone());
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Buffers an entry, flushing eagerly past the buffer threshold.
    fn add_pending(&mut self, entry: PendingEntry) -> Result<(), IndexError> {
        self.buffered += entry.text.len();
        self.pending.push(entry);
        if self.buffered > self.index.buffer_limit() && self.can_flush() {
            self.flush_store()?;
        }
        Ok(())
    }

    /// Runs the mode's flush behavior.
    pub fn flush(&mut self) -> Result<(), IndexError> {
        match self.mode {
            ReindexMode::Store => self.flush_store(),
            ReindexMode::RemoveAllNodes => {
                self.index.remove_document(self.document.id)?;
                self.report.nodes_removed += 1;
                Ok(())
            }
            ReindexMode::RemoveSomeNodes => self.flush_removals(),
            ReindexMode::RemoveBinaryResource => {
                self.index.remove_binary(&self.document.uri)
            }
        }
    }

    /// Deletes the collected node set, each by its exact join key so only
    /// that node's entries go, never the whole document.
    fn flush_removals(&mut self) -> Result<(), IndexError> {
        if self.removals.is_empty() {
            return Ok(());
        }
        let schema = self.index.schema();
        let doc = self.document.id;
        let removals = std::mem::take(&mut self.removals);
        self.index.commit_manager().with_writer(|writer| {
            for node in &removals {
                writer.delete_term(Term::from_field_bytes(schema.id, &encode_key(doc, node)));
            }
            Ok(())
        })?;
        self.report.nodes_removed += removals.len();
        Ok(())
    }

    /// Writes all buffered entries. Ownership of each entry transfers to
    /// the writer call; the buffer is empty afterwards.
    fn flush_store(&mut self) -> Result<(), IndexError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let entries = std::mem::take(&mut self.pending);
        self.buffered = 0;

        let mut docs = Vec::with_capacity(entries.len());
        for entry in &entries {
            docs.push(self.build_entry_doc(entry)?);
        }

        let schema = self.index.schema();
        let doc_id = self.document.id;
        let reindexing = self.reindexing;
        self.index.commit_manager().with_writer(|writer| {
            if reindexing {
                for entry in &entries {
                    writer.delete_term(Term::from_field_bytes(
                        schema.id,
                        &encode_key(doc_id, &entry.node.node),
                    ));
                }
            }
            for doc in docs {
                writer.add_document(doc).map_err(|e| IndexError::write(&e))?;
            }
            Ok(())
        })?;
        self.report.entries_written += entries.len();
        Ok(())
    }

    /// Builds the engine document for one entry: identity fields, the
    /// content field the rule routes to, and the rule's derived fields and
    /// facets.
    fn build_entry_doc(&mut self, entry: &PendingEntry) -> Result<TantivyDocument, IndexError> {
        let index = self.index;
        let schema = index.schema();
        let rule = index.configuration().rule(entry.rule).clone();

        let mut doc = TantivyDocument::new();
        doc.add_u64(schema.doc_id, u64::from(self.document.id.0));
        doc.add_bytes(schema.node_id, &entry.node.node.to_bytes());
        doc.add_bytes(schema.id, &encode_key(self.document.id, &entry.node.node));
        doc.add_text(schema.uri, &self.document.uri);

        let key = rule
            .content_key()
            .unwrap_or_else(|| SHARED_KEY.to_string());
        let field = schema
            .content_field(&key)
            .or_else(|| schema.shared_field())
            .ok_or_else(|| IndexError::UnknownField(key.clone()))?;
        // The qname keyword keeps the exact name even for shared-field
        // routing; named rules record the rule name instead.
        let qname_key = match &rule.name {
            Some(name) => format!("field:{name}"),
            None => {
                let marker = if rule.pattern.targets_attribute() {
                    "@"
                } else {
                    ""
                };
                format!("qn:{marker}{}", entry.node.name.encoded())
            }
        };
        doc.add_text(schema.qname, &qname_key);
        doc.add_text(field, &entry.text);
        doc.add_f64(schema.boost, f64::from(entry.boost));

        self.add_derived_values(&mut doc, &rule, entry)?;
        Ok(doc)
    }

    /// Evaluates the rule's fields and facets against the entry's node.
    fn add_derived_values(
        &mut self,
        doc: &mut TantivyDocument,
        rule: &IndexRule,
        entry: &PendingEntry,
    ) -> Result<(), IndexError> {
        if self.disabled.contains(&rule.id) {
            return Ok(());
        }
        let index = self.index;
        let schema = index.schema();

        for spec in &rule.fields {
            let values = match &spec.expression {
                Some(expression) => {
                    match self.evaluate_cached(rule.id, expression, &entry.node.node) {
                        Some(values) => values,
                        None => return Ok(()),
                    }
                }
                None => vec![entry.text.clone()],
            };
            let Some((field, kind)) = schema.typed_field(&spec.name) else {
                continue;
            };
            for value in values {
                match convert_value(kind, &value) {
                    Ok(converted) => converted.add_to(doc, field),
                    Err(reason) => self.report.notes.push(format!(
                        "field `{}`: skipped value `{value}`: {reason}",
                        spec.name
                    )),
                }
            }
        }

        for spec in &rule.facets {
            let Some(values) =
                self.evaluate_cached(rule.id, &spec.expression, &entry.node.node)
            else {
                return Ok(());
            };
            for path in facet_paths(spec, &values) {
                doc.add_text(schema.facet, path);
            }
        }
        Ok(())
    }

    /// Compiles (once) and evaluates an expression for a rule. On failure
    /// the rule is disabled for the rest of the session and `None` is
    /// returned; indexing continues for other rules.
    fn evaluate_cached(
        &mut self,
        rule: RuleId,
        expression: &str,
        context: &NodeId,
    ) -> Option<Vec<String>> {
        let evaluator = self.index.evaluator().clone();
        let compiled = match self.expr_cache.get(&rule) {
            Some(compiled) => compiled.clone(),
            None => match evaluator.compile(expression) {
                Ok(compiled) => {
                    self.expr_cache.insert(rule, compiled.clone());
                    compiled
                }
                Err(error) => {
                    self.disable_rule(rule, error.to_string());
                    return None;
                }
            },
        };
        match evaluator.evaluate(&compiled, self.document, context) {
            Ok(values) => Some(values),
            Err(error) => {
                self.disable_rule(rule, error.to_string());
                None
            }
        }
    }

    /// Disables a rule for the remainder of the session.
    fn disable_rule(&mut self, rule: RuleId, reason: String) {
        if self.disabled.insert(rule) {
            self.report.disabled_rules.push((rule, reason));
        }
    }

    /// The session outcome so far.
    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    /// Consumes the session, returning its report.
    pub fn into_report(self) -> SessionReport {
        self.report
    }
}

/// A converted typed field value.
enum Converted {
    /// Text.
    Str(String),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// Date.
    Date(DateTime),
    /// Bytes.
    Bytes(Vec<u8>),
}

impl Converted {
    /// Adds the value to an engine document.
    fn add_to(self, doc: &mut TantivyDocument, field: tantivy::schema::Field) {
        match self {
            Self::Str(value) => doc.add_text(field, value),
            Self::Int(value) => doc.add_i64(field, value),
            Self::Float(value) => doc.add_f64(field, value),
            Self::Date(value) => doc.add_date(field, value),
            Self::Bytes(value) => doc.add_bytes(field, &value),
        }
    }
}

/// Converts a string result into the field's declared type.
fn convert_value(kind: FieldKind, value: &str) -> Result<Converted, String> {
    match kind {
        FieldKind::String => Ok(Converted::Str(value.to_string())),
        FieldKind::Int => value
            .trim()
            .parse()
            .map(Converted::Int)
            .map_err(|e| e.to_string()),
        FieldKind::Float => value
            .trim()
            .parse()
            .map(Converted::Float)
            .map_err(|e| e.to_string()),
        FieldKind::Date => parse_date(value.trim()).map(Converted::Date),
        FieldKind::Binary => Ok(Converted::Bytes(value.as_bytes().to_vec())),
    }
}

/// Parses `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS` into an engine timestamp.
fn parse_date(value: &str) -> Result<DateTime, String> {
    let timestamp = if let Ok(datetime) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
    {
        datetime.and_utc().timestamp()
    } else if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0)
            .ok_or_else(|| "invalid date".to_string())?
            .and_utc()
            .timestamp()
    } else {
        return Err(format!("`{value}` is not a date"));
    };
    Ok(DateTime::from_timestamp_secs(timestamp))
}

/// Builds facet paths from evaluated values.
///
/// Flat facets produce one `/dimension/value` path per value; hierarchical
/// facets treat `/`-separated values as one path below the dimension.
fn facet_paths(spec: &FacetSpec, values: &[String]) -> Vec<String> {
    if spec.hierarchical {
        let segments: Vec<&str> = values
            .iter()
            .flat_map(|value| value.split('/'))
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.is_empty() {
            return Vec::new();
        }
        return vec![format!("/{}/{}", spec.dimension, segments.join("/"))];
    }
    values
        .iter()
        .filter(|value| !value.is_empty())
        .map(|value| format!("/{}/{value}", spec.dimension))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn converts_typed_values() {
        assert!(matches!(
            convert_value(FieldKind::Int, " 42 "),
            Ok(Converted::Int(42))
        ));
        assert!(matches!(
            convert_value(FieldKind::Float, "2.5"),
            Ok(Converted::Float(_))
        ));
        assert!(convert_value(FieldKind::Int, "many").is_err());
        assert!(matches!(
            convert_value(FieldKind::Date, "2024-02-29"),
            Ok(Converted::Date(_))
        ));
        assert!(convert_value(FieldKind::Date, "yesterday").is_err());
    }

    #[test]
    fn facet_path_construction() {
        let flat = FacetSpec {
            dimension: "category".to_string(),
            expression: "../@cat".to_string(),
            hierarchical: false,
        };
        assert_eq!(
            facet_paths(&flat, &["fruit".to_string(), "fresh".to_string()]),
            vec!["/category/fruit", "/category/fresh"]
        );

        let tree = FacetSpec {
            dimension: "place".to_string(),
            expression: "loc".to_string(),
            hierarchical: true,
        };
        assert_eq!(
            facet_paths(&tree, &["europe/se".to_string()]),
            vec!["/place/europe/se"]
        );
        assert!(facet_paths(&tree, &[]).is_empty());
    }
}
