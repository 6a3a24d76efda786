//! Parser for the collection index configuration document.
//!
//! The document schema is a compatibility surface. The rule section is a
//! `<fulltext>` element (`<lucene>` is accepted as an alias), usually
//! nested under `<collection><index>`:
//!
//! ```xml
//! <collection>
//!   <index>
//!     <fulltext>
//!       <analyzer id="ws" kind="whitespace"/>
//!       <analyzer id="en" kind="stemmer" language="english"/>
//!       <text match="//article/body" analyzer="en" boost="2.0">
//!         <field name="author" expression="../author" type="string" store="yes"/>
//!         <facet dimension="category" expression="../@cat"/>
//!         <match-attribute qname="type" value="main" boost="3.0"/>
//!         <has-attribute qname="lang" boost="1.5"/>
//!       </text>
//!       <text qname="title" field="doc-title"/>
//!       <inline qname="em"/>
//!       <ignore qname="note"/>
//!     </fulltext>
//!   </index>
//! </collection>
//! ```
//!
//! Unknown analyzer kinds, missing required attributes, and malformed
//! boosts or patterns are load-time [`ConfigError`]s; the caller keeps its
//! previous configuration when loading fails.

use std::collections::HashSet;

use xtext_document::{Content, Element};

use crate::{
    analyzers::{AnalyzerKind, AnalyzerRegistry},
    configuration::IndexConfiguration,
    error::ConfigError,
    pattern::PathPattern,
    rules::{AttrBoost, FacetSpec, FieldKind, FieldSpec, IndexRule, RuleId},
};

/// Parses a configuration from the rule document's root element.
pub(crate) fn parse(root: &Element) -> Result<IndexConfiguration, ConfigError> {
    let section = find_rule_section(root).ok_or(ConfigError::NoRuleSection)?;

    let mut analyzers = AnalyzerRegistry::default();
    let mut rules = Vec::new();
    let mut inline = HashSet::new();
    let mut ignore = HashSet::new();

    // Analyzers first: rules may reference ids declared after them.
    for child in child_elements(section) {
        if child.name.local == "analyzer" {
            let (id, kind) = parse_analyzer(child)?;
            analyzers.declare(&id, kind)?;
        }
    }

    for child in child_elements(section) {
        match child.name.local.as_str() {
            "analyzer" => {}
            "text" => {
                let rule = parse_text_rule(child, RuleId(rules.len()), &analyzers)?;
                rules.push(rule);
            }
            "inline" => {
                inline.insert(required_attr(child, "qname")?);
            }
            "ignore" => {
                ignore.insert(required_attr(child, "qname")?);
            }
            // Unknown elements are skipped so newer documents still load.
            _ => {}
        }
    }

    Ok(IndexConfiguration::assemble(
        rules,
        analyzers,
        inline,
        ignore,
        section.to_xml(),
    ))
}

/// Finds the `<fulltext>` (or `<lucene>`) section anywhere below `root`.
fn find_rule_section(root: &Element) -> Option<&Element> {
    if matches!(root.name.local.as_str(), "fulltext" | "lucene") {
        return Some(root);
    }
    for child in child_elements(root) {
        if let Some(found) = find_rule_section(child) {
            return Some(found);
        }
    }
    None
}

/// Iterates the element children of `element`.
fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|content| match content {
        Content::Element(child) => Some(child),
        Content::Text(_) => None,
    })
}

/// Fetches a required attribute or fails naming the element.
fn required_attr(element: &Element, name: &str) -> Result<String, ConfigError> {
    element
        .attributes
        .iter()
        .find(|a| a.name.local == name && a.name.prefix.is_none())
        .map(|a| a.value.clone())
        .ok_or_else(|| ConfigError::MissingAttribute {
            element: element.name.local.clone(),
            attribute: name.to_string(),
        })
}

/// Fetches an optional attribute.
fn optional_attr(element: &Element, name: &str) -> Option<String> {
    element
        .attributes
        .iter()
        .find(|a| a.name.local == name && a.name.prefix.is_none())
        .map(|a| a.value.clone())
}

/// Parses a boost attribute value.
fn parse_boost(value: &str) -> Result<f32, ConfigError> {
    let boost: f32 = value
        .parse()
        .map_err(|_| ConfigError::InvalidBoost(value.to_string()))?;
    if !boost.is_finite() || boost <= 0.0 {
        return Err(ConfigError::InvalidBoost(value.to_string()));
    }
    Ok(boost)
}

/// Parses a yes/no flag, defaulting to `default`.
fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value {
        Some(v) => matches!(v, "yes" | "true" | "1"),
        None => default,
    }
}

/// Parses an `<analyzer>` declaration.
fn parse_analyzer(element: &Element) -> Result<(String, AnalyzerKind), ConfigError> {
    let id = required_attr(element, "id")?;
    let kind = if let Some(kind) = optional_attr(element, "kind") {
        AnalyzerKind::from_kind(&kind, optional_attr(element, "language").as_deref())?
    } else if let Some(class) = optional_attr(element, "class") {
        AnalyzerKind::from_class_name(&class)?
    } else {
        return Err(ConfigError::MissingAttribute {
            element: "analyzer".to_string(),
            attribute: "kind".to_string(),
        });
    };
    Ok((id, kind))
}

/// Parses one `<text>` rule with its nested field, facet, and
/// attribute-boost declarations.
fn parse_text_rule(
    element: &Element,
    id: RuleId,
    analyzers: &AnalyzerRegistry,
) -> Result<IndexRule, ConfigError> {
    let pattern = if let Some(match_attr) = optional_attr(element, "match") {
        PathPattern::parse(&match_attr)?
    } else if let Some(qname) = optional_attr(element, "qname") {
        let (name, is_attribute) = match qname.strip_prefix('@') {
            Some(rest) => (rest, true),
            None => (qname.as_str(), false),
        };
        PathPattern::for_name(&xtext_document::QName::parse(name), is_attribute)
    } else {
        return Err(ConfigError::MissingAttribute {
            element: "text".to_string(),
            attribute: "match".to_string(),
        });
    };

    let analyzer = optional_attr(element, "analyzer");
    if let Some(analyzer_id) = &analyzer {
        // Validate the reference now; sessions assume resolved ids.
        analyzers.get(analyzer_id)?;
    }

    let boost = match optional_attr(element, "boost") {
        Some(value) => parse_boost(&value)?,
        None => 1.0,
    };

    let mut fields = Vec::new();
    let mut facets = Vec::new();
    let mut attr_boosts = Vec::new();

    for child in child_elements(element) {
        match child.name.local.as_str() {
            "field" => {
                let kind = match optional_attr(child, "type") {
                    Some(value) => FieldKind::parse(&value)?,
                    None => FieldKind::String,
                };
                if let Some(analyzer_id) = optional_attr(child, "analyzer") {
                    analyzers.get(&analyzer_id)?;
                }
                fields.push(FieldSpec {
                    name: required_attr(child, "name")?,
                    expression: optional_attr(child, "expression"),
                    kind,
                    store: parse_flag(optional_attr(child, "store").as_deref(), true),
                    analyzer: optional_attr(child, "analyzer"),
                });
            }
            "facet" => {
                facets.push(FacetSpec {
                    dimension: required_attr(child, "dimension")?,
                    expression: required_attr(child, "expression")?,
                    hierarchical: parse_flag(
                        optional_attr(child, "hierarchical").as_deref(),
                        false,
                    ),
                });
            }
            "match-attribute" => {
                attr_boosts.push(AttrBoost {
                    name: xtext_document::QName::parse(&required_attr(child, "qname")?),
                    value: Some(required_attr(child, "value")?),
                    boost: parse_boost(&required_attr(child, "boost")?)?,
                });
            }
            "has-attribute" => {
                attr_boosts.push(AttrBoost {
                    name: xtext_document::QName::parse(&required_attr(child, "qname")?),
                    value: None,
                    boost: parse_boost(&required_attr(child, "boost")?)?,
                });
            }
            _ => {}
        }
    }

    Ok(IndexRule {
        id,
        pattern,
        name: optional_attr(element, "field"),
        boost,
        analyzer,
        fields,
        facets,
        attr_boosts,
    })
}

#[cfg(test)]
mod test {
    use xtext_document::{DocId, parse_document};

    use super::*;
    use crate::analyzers::AnalyzerKind;

    fn load(xml: &str) -> Result<IndexConfiguration, ConfigError> {
        let doc = parse_document(DocId(0), "/db/system/config.xconf", xml).unwrap();
        parse(&doc.root)
    }

    #[test]
    fn full_document_round_trip() {
        let config = load(
            r#"<collection>
              <index>
                <fulltext>
                  <analyzer id="ws" kind="whitespace"/>
                  <text match="//article/body" analyzer="ws" boost="2.0">
                    <field name="author" expression="../author" type="string" store="yes"/>
                    <facet dimension="category" expression="../@cat"/>
                    <match-attribute qname="type" value="main" boost="3.0"/>
                  </text>
                  <text qname="title" field="doc-title"/>
                  <inline qname="em"/>
                  <ignore qname="note"/>
                </fulltext>
              </index>
            </collection>"#,
        )
        .unwrap();

        assert_eq!(config.rules().len(), 2);
        let body = &config.rules()[0];
        assert_eq!(body.analyzer.as_deref(), Some("ws"));
        assert!((body.boost - 2.0).abs() < f32::EPSILON);
        assert_eq!(body.fields.len(), 1);
        assert_eq!(body.fields[0].name, "author");
        assert_eq!(body.facets[0].dimension, "category");
        assert_eq!(body.attr_boosts.len(), 1);

        let title = &config.rules()[1];
        assert_eq!(title.name.as_deref(), Some("doc-title"));
        assert_eq!(title.content_key().as_deref(), Some("field:doc-title"));

        assert!(config.is_inline(&xtext_document::QName::local("em")));
        assert!(config.is_ignored(&xtext_document::QName::local("note")));
        assert_eq!(
            config.analyzers().get("ws").unwrap(),
            &AnalyzerKind::Whitespace
        );
    }

    #[test]
    fn bare_fulltext_root_is_accepted() {
        let config = load(r#"<fulltext><text qname="p"/></fulltext>"#).unwrap();
        assert_eq!(config.rules().len(), 1);
    }

    #[test]
    fn lucene_alias_is_accepted() {
        let config = load(r#"<lucene><text qname="p"/></lucene>"#).unwrap();
        assert_eq!(config.rules().len(), 1);
    }

    #[test]
    fn attribute_qname_rule() {
        let config = load(r#"<fulltext><text qname="@type"/></fulltext>"#).unwrap();
        assert!(config.rules()[0].pattern.targets_attribute());
    }

    #[test]
    fn legacy_analyzer_class_maps() {
        let config = load(
            r#"<fulltext>
              <analyzer id="kw" class="org.apache.lucene.analysis.core.KeywordAnalyzer"/>
              <text qname="id" analyzer="kw"/>
            </fulltext>"#,
        )
        .unwrap();
        assert_eq!(
            config.analyzers().get("kw").unwrap(),
            &AnalyzerKind::Keyword
        );
    }

    #[test]
    fn missing_section_errors() {
        assert!(matches!(
            load("<collection><index/></collection>"),
            Err(ConfigError::NoRuleSection)
        ));
    }

    #[test]
    fn missing_required_attribute_errors() {
        assert!(matches!(
            load(r#"<fulltext><text boost="2"/></fulltext>"#),
            Err(ConfigError::MissingAttribute { .. })
        ));
        assert!(matches!(
            load(r#"<fulltext><text qname="p"><facet dimension="d"/></text></fulltext>"#),
            Err(ConfigError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn bad_boost_errors() {
        assert!(matches!(
            load(r#"<fulltext><text qname="p" boost="huge"/></fulltext>"#),
            Err(ConfigError::InvalidBoost(_))
        ));
        assert!(matches!(
            load(r#"<fulltext><text qname="p" boost="-1"/></fulltext>"#),
            Err(ConfigError::InvalidBoost(_))
        ));
    }

    #[test]
    fn undeclared_analyzer_reference_errors() {
        assert!(matches!(
            load(r#"<fulltext><text qname="p" analyzer="nope"/></fulltext>"#),
            Err(ConfigError::UndeclaredAnalyzer(_))
        ));
    }

    #[test]
    fn unknown_analyzer_kind_errors() {
        assert!(matches!(
            load(r#"<fulltext><analyzer id="x" kind="quantum"/><text qname="p"/></fulltext>"#),
            Err(ConfigError::UnknownAnalyzer(_))
        ));
    }
}
