//! Recursive descent over the query description element tree.

use xtext_document::{Content, Element};

use crate::{
    ast::{BoolClause, Occur, PhrasePart, QueryKind, QueryNode, Rewrite},
    error::QueryDescError,
};

/// Parses a query description.
///
/// The root may be a `<query>` wrapper around a single operation element,
/// or the operation element itself.
pub fn parse_description(root: &Element) -> Result<QueryNode, QueryDescError> {
    if root.name.local == "query" {
        let children: Vec<&Element> = child_elements(root).collect();
        return match children.as_slice() {
            [] => Err(QueryDescError::Empty),
            [single] => parse_node(single),
            _ => Err(QueryDescError::Malformed {
                message: "<query> must contain exactly one operation".to_string(),
                fragment: root.to_xml(),
            }),
        };
    }
    parse_node(root)
}

/// Iterates the element children of `element`.
fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|content| match content {
        Content::Element(child) => Some(child),
        Content::Text(_) => None,
    })
}

/// Concatenated immediate text content.
fn text_of(element: &Element) -> String {
    element
        .children
        .iter()
        .filter_map(|content| match content {
            Content::Text(text) => Some(text.value.as_str()),
            Content::Element(_) => None,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Fetches an attribute value.
fn attr(element: &Element, name: &str) -> Option<String> {
    element
        .attributes
        .iter()
        .find(|a| a.name.local == name && a.name.prefix.is_none())
        .map(|a| a.value.clone())
}

/// Requires non-empty text content.
fn required_text(element: &Element) -> Result<String, QueryDescError> {
    let text = text_of(element);
    if text.is_empty() {
        return Err(QueryDescError::MissingContent {
            name: element.name.local.clone(),
            fragment: element.to_xml(),
        });
    }
    Ok(text)
}

/// Parses a numeric attribute.
fn numeric_attr<T: core::str::FromStr>(
    element: &Element,
    name: &str,
) -> Result<Option<T>, QueryDescError> {
    match attr(element, name) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| QueryDescError::InvalidAttribute {
                name: element.name.local.clone(),
                attribute: name.to_string(),
                value,
            }),
    }
}

/// Parses one operation element into a node.
fn parse_node(element: &Element) -> Result<QueryNode, QueryDescError> {
    let kind = match element.name.local.as_str() {
        "term" => QueryKind::Term(required_text(element)?),
        "phrase" => parse_phrase(element)?,
        "wildcard" => QueryKind::Wildcard(required_text(element)?),
        "prefix" => QueryKind::Prefix(required_text(element)?),
        "fuzzy" => QueryKind::Fuzzy {
            value: required_text(element)?,
            max_edits: numeric_attr(element, "max-edits")?,
        },
        "regex" => QueryKind::Regex(required_text(element)?),
        "bool" => parse_bool(element)?,
        "near" => parse_near(element)?,
        "first" => parse_first(element)?,
        other => {
            return Err(QueryDescError::UnknownElement {
                name: other.to_string(),
                fragment: element.to_xml(),
            });
        }
    };

    let boost = match attr(element, "boost") {
        None => None,
        Some(value) => Some(value.parse::<f32>().map_err(|_| {
            QueryDescError::InvalidAttribute {
                name: element.name.local.clone(),
                attribute: "boost".to_string(),
                value,
            }
        })?),
    };

    let rewrite = match attr(element, "rewrite").as_deref() {
        None => None,
        Some("constant-score") => Some(Rewrite::ConstantScore),
        Some("scoring") => Some(Rewrite::Scoring),
        Some(other) => {
            return Err(QueryDescError::InvalidAttribute {
                name: element.name.local.clone(),
                attribute: "rewrite".to_string(),
                value: other.to_string(),
            });
        }
    };

    Ok(QueryNode {
        kind,
        field: attr(element, "field"),
        boost,
        rewrite,
    })
}

/// Parses `<phrase>`: explicit term/wildcard parts, or literal text.
fn parse_phrase(element: &Element) -> Result<QueryKind, QueryDescError> {
    let slop = numeric_attr(element, "slop")?.unwrap_or(0);
    let mut parts = Vec::new();
    for child in child_elements(element) {
        match child.name.local.as_str() {
            "term" => parts.push(PhrasePart::Term(required_text(child)?)),
            "wildcard" => parts.push(PhrasePart::Wildcard(required_text(child)?)),
            other => {
                return Err(QueryDescError::UnknownElement {
                    name: other.to_string(),
                    fragment: element.to_xml(),
                });
            }
        }
    }
    if parts.is_empty() {
        return Ok(QueryKind::Phrase {
            literal: Some(required_text(element)?),
            parts,
            slop,
        });
    }
    Ok(QueryKind::Phrase {
        literal: None,
        parts,
        slop,
    })
}

/// Parses `<bool>` with per-clause `occur` attributes.
fn parse_bool(element: &Element) -> Result<QueryKind, QueryDescError> {
    let mut clauses = Vec::new();
    for child in child_elements(element) {
        let occur = match attr(child, "occur").as_deref() {
            None | Some("should") => Occur::Should,
            Some("must") => Occur::Must,
            Some("not") => Occur::MustNot,
            Some(other) => {
                return Err(QueryDescError::InvalidAttribute {
                    name: child.name.local.clone(),
                    attribute: "occur".to_string(),
                    value: other.to_string(),
                });
            }
        };
        clauses.push(BoolClause {
            occur,
            node: parse_node(child)?,
        });
    }
    if clauses.is_empty() {
        return Err(QueryDescError::Malformed {
            message: "<bool> requires at least one clause".to_string(),
            fragment: element.to_xml(),
        });
    }
    Ok(QueryKind::Bool {
        clauses,
        min_should: numeric_attr(element, "min-should-match")?,
    })
}

/// Parses `<near>`: sub-elements or whitespace-separated literal terms.
fn parse_near(element: &Element) -> Result<QueryKind, QueryDescError> {
    let slop = numeric_attr(element, "slop")?.unwrap_or(0);
    let ordered = match attr(element, "ordered").as_deref() {
        None | Some("yes") => true,
        Some("no") => false,
        Some(other) => {
            return Err(QueryDescError::InvalidAttribute {
                name: "near".to_string(),
                attribute: "ordered".to_string(),
                value: other.to_string(),
            });
        }
    };

    let mut parts: Vec<QueryNode> = Vec::new();
    for child in child_elements(element) {
        match child.name.local.as_str() {
            "term" | "wildcard" | "near" | "first" => parts.push(parse_node(child)?),
            other => {
                return Err(QueryDescError::UnknownElement {
                    name: other.to_string(),
                    fragment: element.to_xml(),
                });
            }
        }
    }
    if parts.is_empty() {
        let text = required_text(element)?;
        parts = text.split_whitespace().map(QueryNode::term).collect();
    }

    Ok(QueryKind::Near {
        parts,
        slop,
        ordered,
    })
}

/// Parses `<first end="N">`.
fn parse_first(element: &Element) -> Result<QueryKind, QueryDescError> {
    let end = numeric_attr(element, "end")?.unwrap_or(1);
    let children: Vec<&Element> = child_elements(element).collect();
    let inner = match children.as_slice() {
        [] => QueryNode::term(required_text(element)?),
        [single] => parse_node(single)?,
        _ => {
            return Err(QueryDescError::Malformed {
                message: "<first> must contain at most one sub-query".to_string(),
                fragment: element.to_xml(),
            });
        }
    };
    Ok(QueryKind::First {
        inner: Box::new(inner),
        end,
    })
}
