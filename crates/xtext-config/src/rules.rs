//! Index rules and their field/facet sub-rules.
//!
//! Rules live in an arena owned by [`crate::IndexConfiguration`] and are
//! referenced by [`RuleId`] everywhere else: lookup tables, session caches,
//! and pending index entries. Several rules may share a last path component;
//! they are kept as sibling entries in the lookup table, in declaration
//! order, and every matching rule fires.

use xtext_document::QName;

use crate::{error::ConfigError, pattern::PathPattern};

/// Arena index of a rule within its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub usize);

/// The value type of a derived field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Analyzed text.
    String,
    /// Signed integer.
    Int,
    /// Floating point.
    Float,
    /// Calendar date (`YYYY-MM-DD`, optionally with a time part).
    Date,
    /// Opaque binary, base64-encoded in the document.
    Binary,
}

impl FieldKind {
    /// Parses a `type` attribute value. `xs:`-prefixed names are accepted.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.strip_prefix("xs:").unwrap_or(value) {
            "string" => Ok(Self::String),
            "int" | "integer" | "long" => Ok(Self::Int),
            "float" | "double" | "decimal" => Ok(Self::Float),
            "date" | "dateTime" => Ok(Self::Date),
            "binary" | "base64Binary" => Ok(Self::Binary),
            other => Err(ConfigError::InvalidFieldType(other.to_string())),
        }
    }
}

/// A derived field attached to a rule.
///
/// A field either captures the matched node's own text (no expression) or
/// evaluates an expression against the matched node and indexes the result
/// under the field's name.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Field name, unique per configuration.
    pub name: String,
    /// Expression evaluated against the matched node, if any.
    pub expression: Option<String>,
    /// Value type.
    pub kind: FieldKind,
    /// Whether the raw value is stored for retrieval.
    pub store: bool,
    /// Analyzer id override for this field's text.
    pub analyzer: Option<String>,
}

/// A facet attached to a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetSpec {
    /// Facet dimension name.
    pub dimension: String,
    /// Expression producing the facet value(s).
    pub expression: String,
    /// True if multi-valued results form one hierarchical path rather than
    /// independent flat values.
    pub hierarchical: bool,
}

/// An attribute-conditional boost on a rule.
///
/// `value: None` boosts on mere presence of the attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrBoost {
    /// Attribute to inspect on the matched element.
    pub name: QName,
    /// Required value, or `None` for presence.
    pub value: Option<String>,
    /// Multiplier applied when the condition holds.
    pub boost: f32,
}

/// One configuration entry binding a path pattern to indexing behavior.
#[derive(Debug, Clone)]
pub struct IndexRule {
    /// Arena id of this rule.
    pub id: RuleId,
    /// The compiled path pattern.
    pub pattern: PathPattern,
    /// Optional name; named rules are queryable by name instead of qname.
    pub name: Option<String>,
    /// Static boost applied to entries produced by this rule.
    pub boost: f32,
    /// Analyzer id, or `None` for the default analyzer.
    pub analyzer: Option<String>,
    /// Derived fields, in declaration order.
    pub fields: Vec<FieldSpec>,
    /// Facets, in declaration order.
    pub facets: Vec<FacetSpec>,
    /// Attribute-conditional boosts.
    pub attr_boosts: Vec<AttrBoost>,
}

impl IndexRule {
    /// True if entries are indexed under the rule name rather than the
    /// matched node's qname.
    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }

    /// True if a change to an attribute below this rule's anchor must
    /// trigger reindexing: either a pattern predicate or a boost condition
    /// reads attributes.
    pub fn should_reindex_on_attribute_change(&self) -> bool {
        !self.attr_boosts.is_empty() || self.pattern.has_predicates()
    }

    /// True if any field or facet evaluates an expression, which requires a
    /// structurally complete document.
    pub fn has_expressions(&self) -> bool {
        self.fields.iter().any(|f| f.expression.is_some()) || !self.facets.is_empty()
    }

    /// Computes the entry boost given the captured attribute set of the
    /// matched element: the static boost times every satisfied conditional.
    pub fn boost_for(&self, attrs: &[(QName, String)]) -> f32 {
        let mut boost = self.boost;
        for conditional in &self.attr_boosts {
            let present = attrs.iter().find(|(name, _)| name == &conditional.name);
            let satisfied = match (&conditional.value, present) {
                (None, Some(_)) => true,
                (Some(required), Some((_, actual))) => required == actual,
                (_, None) => false,
            };
            if satisfied {
                boost *= conditional.boost;
            }
        }
        boost
    }

    /// The index field key this rule routes content into: the rule name for
    /// named rules, the pattern's last component otherwise, or `None` when
    /// the last component is a wildcard (shared-key routing).
    ///
    /// Attribute targets carry an `@` so `qn:@type` never collides with an
    /// element field `qn:type`.
    pub fn content_key(&self) -> Option<String> {
        if let Some(name) = &self.name {
            return Some(format!("field:{name}"));
        }
        let marker = if self.pattern.targets_attribute() {
            "@"
        } else {
            ""
        };
        self.pattern
            .last_name()
            .map(|qname| format!("qn:{marker}{}", qname.encoded()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn rule(boost: f32, attr_boosts: Vec<AttrBoost>) -> IndexRule {
        IndexRule {
            id: RuleId(0),
            pattern: PathPattern::parse("//p").unwrap(),
            name: None,
            boost,
            analyzer: None,
            fields: vec![],
            facets: vec![],
            attr_boosts,
        }
    }

    #[test]
    fn field_kind_parses_with_and_without_prefix() {
        assert_eq!(FieldKind::parse("string").unwrap(), FieldKind::String);
        assert_eq!(FieldKind::parse("xs:integer").unwrap(), FieldKind::Int);
        assert_eq!(FieldKind::parse("xs:dateTime").unwrap(), FieldKind::Date);
        assert!(FieldKind::parse("xs:duration").is_err());
    }

    #[test]
    fn boost_for_multiplies_satisfied_conditions() {
        let rule = rule(
            2.0,
            vec![
                AttrBoost {
                    name: QName::local("type"),
                    value: Some("main".into()),
                    boost: 3.0,
                },
                AttrBoost {
                    name: QName::local("lang"),
                    value: None,
                    boost: 1.5,
                },
            ],
        );

        let attrs = vec![
            (QName::local("type"), "main".to_string()),
            (QName::local("lang"), "en".to_string()),
        ];
        assert!((rule.boost_for(&attrs) - 9.0).abs() < f32::EPSILON);

        let partial = vec![(QName::local("type"), "other".to_string())];
        assert!((rule.boost_for(&partial) - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn reindex_on_attribute_change_flags() {
        assert!(!rule(1.0, vec![]).should_reindex_on_attribute_change());
        assert!(
            rule(
                1.0,
                vec![AttrBoost {
                    name: QName::local("x"),
                    value: None,
                    boost: 2.0
                }]
            )
            .should_reindex_on_attribute_change()
        );

        let with_predicate = IndexRule {
            pattern: PathPattern::parse("//p[@rend='bold']").unwrap(),
            ..rule(1.0, vec![])
        };
        assert!(with_predicate.should_reindex_on_attribute_change());
    }

    #[test]
    fn content_keys() {
        let plain = rule(1.0, vec![]);
        assert_eq!(plain.content_key().as_deref(), Some("qn:p"));

        let named = IndexRule {
            name: Some("body-text".into()),
            ..rule(1.0, vec![])
        };
        assert_eq!(named.content_key().as_deref(), Some("field:body-text"));

        let wildcard_tail = IndexRule {
            pattern: PathPattern::parse("/a/*").unwrap(),
            ..rule(1.0, vec![])
        };
        assert_eq!(wildcard_tail.content_key(), None);
    }
}
