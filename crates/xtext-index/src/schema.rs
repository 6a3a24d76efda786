//! Index schema derived from the collection configuration.
//!
//! The engine needs a closed schema, so content fields are derived from the
//! rule set at open time:
//!
//! - named rules route into `field:{name}`
//! - rules whose pattern ends in a concrete name route into `qn:{name}`
//! - rules whose pattern ends in a wildcard route into the shared `qn:*`
//!   field; the entry's `qname` keyword field keeps the exact name for
//!   filtering
//!
//! Every entry additionally carries the document id, the node id (stored),
//! the binary join key `id` (document id + node id, indexed as an exact
//! term so node removal is a single delete), the document `uri`, and any
//! facet paths. Derived typed fields from `<field>` declarations become
//! `f:{name}` fields of the declared type.
//!
//! A configuration change changes the schema, which is why the stored
//! configuration hash gates reopening an existing index.

use std::collections::HashMap;

use tantivy::schema::{
    BytesOptions, DateOptions, FAST, Field, INDEXED, IndexRecordOption, NumericOptions, STORED,
    STRING, Schema, TextFieldIndexing, TextOptions,
};
use tantivy::Index;
use xtext_config::{AnalyzerKind, ConfigError, FieldKind, IndexConfiguration};
use xtext_document::{DocId, NodeId};

use crate::{analyzer, error::IndexError};

/// The shared content field for wildcard-tail rules.
pub const SHARED_KEY: &str = "qn:*";

/// Handles to all fields of a derived schema.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    /// The underlying engine schema.
    schema: Schema,
    /// Document id (indexed, stored, fast).
    pub doc_id: Field,
    /// Node id bytes (stored).
    pub node_id: Field,
    /// Binary join key: document id + node id, indexed as an exact term.
    pub id: Field,
    /// Document URI (keyword, stored).
    pub uri: Field,
    /// The content key the entry was indexed under (keyword, stored).
    pub qname: Field,
    /// Facet paths `/dimension/value...` (keyword, stored).
    pub facet: Field,
    /// Per-entry boost, applied to scores at result time (stored).
    pub boost: Field,
    /// Content fields by key.
    content: HashMap<String, Field>,
    /// Typed fields from `<field>` declarations, by declared name.
    typed: HashMap<String, (Field, FieldKind)>,
    /// Analyzer kind per content field key.
    analyzers: HashMap<String, AnalyzerKind>,
}

impl IndexSchema {
    /// Derives the schema for a configuration.
    pub fn for_configuration(config: &IndexConfiguration) -> Result<Self, IndexError> {
        let mut builder = Schema::builder();

        let doc_id = builder.add_u64_field("doc_id", INDEXED | STORED | FAST);
        let node_id = builder.add_bytes_field("node_id", BytesOptions::default().set_stored());
        let id = builder.add_bytes_field("id", BytesOptions::default().set_indexed());
        let uri = builder.add_text_field("uri", STRING | STORED);
        let qname = builder.add_text_field("qname", STRING | STORED);
        let facet = builder.add_text_field("facet", STRING | STORED);
        let boost = builder.add_f64_field("boost", STORED);

        // Resolve every rule's content key and analyzer before creating
        // fields, so conflicting declarations fail deterministically.
        let mut keyed: Vec<(String, AnalyzerKind)> = Vec::new();
        for rule in config.rules() {
            let key = rule.content_key().unwrap_or_else(|| SHARED_KEY.to_string());
            let kind = config.analyzers().resolve(rule.analyzer.as_deref())?.clone();
            keyed.push((key, kind));
        }

        let mut analyzers: HashMap<String, AnalyzerKind> = HashMap::new();
        let mut content = HashMap::new();
        for (key, kind) in keyed {
            match analyzers.get(&key) {
                Some(existing) if existing != &kind => {
                    return Err(IndexError::Config(ConfigError::AnalyzerConflict(key)));
                }
                Some(_) => continue,
                None => {}
            }
            let indexing = TextFieldIndexing::default()
                .set_tokenizer(&analyzer::tokenizer_name(&kind))
                .set_index_option(IndexRecordOption::WithFreqsAndPositions);
            let options = TextOptions::default().set_indexing_options(indexing);
            let field = builder.add_text_field(&key, options);
            content.insert(key.clone(), field);
            analyzers.insert(key, kind);
        }

        let mut typed = HashMap::new();
        for rule in config.rules() {
            for spec in &rule.fields {
                let name = format!("f:{}", spec.name);
                if typed.contains_key(&spec.name) {
                    continue;
                }
                let field = match spec.kind {
                    FieldKind::String => {
                        let kind = config
                            .analyzers()
                            .resolve(spec.analyzer.as_deref())?
                            .clone();
                        let indexing = TextFieldIndexing::default()
                            .set_tokenizer(&analyzer::tokenizer_name(&kind))
                            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
                        let mut options = TextOptions::default().set_indexing_options(indexing);
                        if spec.store {
                            options = options.set_stored();
                        }
                        let field = builder.add_text_field(&name, options);
                        analyzers.insert(name.clone(), kind);
                        field
                    }
                    FieldKind::Int => {
                        let options: NumericOptions = if spec.store {
                            (INDEXED | STORED | FAST).into()
                        } else {
                            (INDEXED | FAST).into()
                        };
                        builder.add_i64_field(&name, options)
                    }
                    FieldKind::Float => {
                        let options: NumericOptions = if spec.store {
                            (INDEXED | STORED | FAST).into()
                        } else {
                            (INDEXED | FAST).into()
                        };
                        builder.add_f64_field(&name, options)
                    }
                    FieldKind::Date => {
                        let mut options = DateOptions::default().set_indexed().set_fast();
                        if spec.store {
                            options = options.set_stored();
                        }
                        builder.add_date_field(&name, options)
                    }
                    FieldKind::Binary => {
                        let mut options = BytesOptions::default().set_indexed();
                        if spec.store {
                            options = options.set_stored();
                        }
                        builder.add_bytes_field(&name, options)
                    }
                };
                typed.insert(spec.name.clone(), (field, spec.kind));
            }
        }

        Ok(Self {
            schema: builder.build(),
            doc_id,
            node_id,
            id,
            uri,
            qname,
            facet,
            boost,
            content,
            typed,
            analyzers,
        })
    }

    /// The underlying engine schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Looks up a content field by key (`qn:{name}` or `field:{name}`).
    pub fn content_field(&self, key: &str) -> Option<Field> {
        self.content.get(key).copied()
    }

    /// The shared content field for wildcard-tail rules, if any rule uses it.
    pub fn shared_field(&self) -> Option<Field> {
        self.content_field(SHARED_KEY)
    }

    /// All content field keys, sorted.
    pub fn content_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.content.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Looks up a typed field by its declared name.
    pub fn typed_field(&self, name: &str) -> Option<(Field, FieldKind)> {
        self.typed.get(name).copied()
    }

    /// The analyzer kind of a content field key.
    pub fn analyzer_kind(&self, key: &str) -> Option<&AnalyzerKind> {
        self.analyzers.get(key)
    }

    /// Registers every tokenizer the schema references on an index.
    pub fn register_tokenizers(&self, index: &Index) -> Result<(), IndexError> {
        for kind in self.analyzers.values() {
            let name = analyzer::tokenizer_name(kind);
            index
                .tokenizers()
                .register(&name, analyzer::build_analyzer(kind)?);
        }
        Ok(())
    }
}

/// Encodes the binary join key for one node of one document.
pub fn encode_key(doc: DocId, node: &NodeId) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(4 + node.depth() * 4);
    bytes.extend_from_slice(&doc.0.to_be_bytes());
    bytes.extend_from_slice(&node.to_bytes());
    bytes
}

#[cfg(test)]
mod test {
    use xtext_document::{DocId as DocumentId, parse_document};

    use super::*;

    fn config(xml: &str) -> IndexConfiguration {
        let doc = parse_document(DocumentId(0), "/conf", xml).unwrap();
        IndexConfiguration::parse(&doc.root).unwrap()
    }

    #[test]
    fn derives_content_fields_per_rule() {
        let schema = IndexSchema::for_configuration(&config(
            r#"<fulltext>
                <text match="/article/body"/>
                <text qname="title" field="doc-title"/>
                <text match="/a/*"/>
            </fulltext>"#,
        ))
        .unwrap();

        assert!(schema.content_field("qn:body").is_some());
        assert!(schema.content_field("field:doc-title").is_some());
        assert!(schema.shared_field().is_some());
        assert!(schema.content_field("qn:missing").is_none());
        assert_eq!(
            schema.content_keys(),
            vec!["field:doc-title", "qn:*", "qn:body"]
        );
    }

    #[test]
    fn same_key_same_analyzer_is_shared() {
        let schema = IndexSchema::for_configuration(&config(
            r#"<fulltext>
                <text match="/a/p"/>
                <text match="/b/p"/>
            </fulltext>"#,
        ))
        .unwrap();
        assert!(schema.content_field("qn:p").is_some());
    }

    #[test]
    fn same_key_conflicting_analyzers_error() {
        let result = IndexSchema::for_configuration(&config(
            r#"<fulltext>
                <analyzer id="ws" kind="whitespace"/>
                <text match="/a/p" analyzer="ws"/>
                <text match="/b/p"/>
            </fulltext>"#,
        ));
        assert!(matches!(
            result,
            Err(IndexError::Config(ConfigError::AnalyzerConflict(_)))
        ));
    }

    #[test]
    fn typed_fields_are_created() {
        let schema = IndexSchema::for_configuration(&config(
            r#"<fulltext>
                <text match="/item/name">
                    <field name="price" expression="../@price" type="float"/>
                    <field name="added" expression="../@added" type="date" store="no"/>
                </text>
            </fulltext>"#,
        ))
        .unwrap();
        assert!(matches!(
            schema.typed_field("price"),
            Some((_, FieldKind::Float))
        ));
        assert!(matches!(
            schema.typed_field("added"),
            Some((_, FieldKind::Date))
        ));
        assert!(schema.typed_field("missing").is_none());
    }

    #[test]
    fn join_key_is_doc_then_node() {
        let key = encode_key(DocumentId(0x0102_0304), &NodeId::from_levels(vec![1, 2]));
        assert_eq!(key.len(), 12);
        assert_eq!(&key[..4], &[1, 2, 3, 4]);
        assert_eq!(&key[4..8], &[0, 0, 0, 1]);
        assert_eq!(&key[8..], &[0, 0, 0, 2]);
    }
}
