//! In-memory element tree.
//!
//! The tree is the unit the indexing pipeline walks and the match
//! correlator re-walks. Every node carries its structural id, so a
//! [`NodeId`] recovered from the index can be resolved back to the live
//! node with [`Document::node`].

use std::fmt::Write as _;

use crate::{
    error::DocumentError,
    id::{DocId, NodeId},
    qname::QName,
};

/// A document: a stable id, a URI, and the element tree.
#[derive(Debug, Clone)]
pub struct Document {
    /// Store-assigned document id.
    pub id: DocId,
    /// URI of the document within the store.
    pub uri: String,
    /// The document element.
    pub root: Element,
}

/// An element node.
#[derive(Debug, Clone)]
pub struct Element {
    /// Qualified name.
    pub name: QName,
    /// Structural id.
    pub node_id: NodeId,
    /// Attributes in document order.
    pub attributes: Vec<Attribute>,
    /// Child nodes in document order.
    pub children: Vec<Content>,
}

/// An attribute node.
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Qualified name.
    pub name: QName,
    /// Structural id.
    pub node_id: NodeId,
    /// Attribute value.
    pub value: String,
}

/// A text node.
#[derive(Debug, Clone)]
pub struct Text {
    /// Structural id.
    pub node_id: NodeId,
    /// Character content.
    pub value: String,
}

/// A child of an element.
#[derive(Debug, Clone)]
pub enum Content {
    /// A child element.
    Element(Element),
    /// A text node.
    Text(Text),
}

impl Content {
    /// The structural id of this child.
    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::Element(element) => &element.node_id,
            Self::Text(text) => &text.node_id,
        }
    }
}

/// A resolved node within a document.
#[derive(Debug, Clone, Copy)]
pub enum NodeHandle<'a> {
    /// An element.
    Element(&'a Element),
    /// An attribute, together with its owner element.
    Attribute(&'a Element, &'a Attribute),
    /// A text node.
    Text(&'a Text),
}

impl Document {
    /// Resolves a node id to the live node.
    pub fn node(&self, id: &NodeId) -> Result<NodeHandle<'_>, DocumentError> {
        if id == &self.root.node_id {
            return Ok(NodeHandle::Element(&self.root));
        }
        if !id.is_descendant_of(&self.root.node_id) {
            return Err(DocumentError::NoSuchNode(id.to_string()));
        }
        find_in(&self.root, id).ok_or_else(|| DocumentError::NoSuchNode(id.to_string()))
    }

    /// Resolves the element identified by `id`.
    ///
    /// Fails if the id addresses an attribute or text node.
    pub fn element(&self, id: &NodeId) -> Result<&Element, DocumentError> {
        match self.node(id)? {
            NodeHandle::Element(element) => Ok(element),
            _ => Err(DocumentError::NoSuchNode(id.to_string())),
        }
    }
}

/// Searches `element`'s attributes and children for the node `id`, which is
/// known to be a strict descendant of `element`.
fn find_in<'a>(element: &'a Element, id: &NodeId) -> Option<NodeHandle<'a>> {
    for attribute in &element.attributes {
        if &attribute.node_id == id {
            return Some(NodeHandle::Attribute(element, attribute));
        }
    }
    for child in &element.children {
        match child {
            Content::Element(child_element) => {
                if &child_element.node_id == id {
                    return Some(NodeHandle::Element(child_element));
                }
                if id.is_descendant_of(&child_element.node_id) {
                    return find_in(child_element, id);
                }
            }
            Content::Text(text) => {
                if &text.node_id == id {
                    return Some(NodeHandle::Text(text));
                }
            }
        }
    }
    None
}

impl Element {
    /// Looks up an attribute by name.
    pub fn attribute(&self, name: &QName) -> Option<&Attribute> {
        self.attributes.iter().find(|a| &a.name == name)
    }

    /// Returns the attribute name/value pairs, as captured on node paths.
    pub fn attr_pairs(&self) -> Vec<(QName, String)> {
        self.attributes
            .iter()
            .map(|a| (a.name.clone(), a.value.clone()))
            .collect()
    }

    /// Concatenated text content of this element and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Serializes the element subtree to an XML string.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }
}

/// Appends the text content of `element` and its descendants to `out`.
fn collect_text(element: &Element, out: &mut String) {
    for child in &element.children {
        match child {
            Content::Element(child_element) => collect_text(child_element, out),
            Content::Text(text) => out.push_str(&text.value),
        }
    }
}

/// Serializes one element, escaping text and attribute values.
fn write_element(element: &Element, out: &mut String) {
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
            Content::Element(child_element) => write_element(child_element, out),
            Content::Text(text) => out.push_str(&escape(&text.value, false)),
        }
    }
    let _ = write!(out, "</{}>", element.name);
}

/// Escapes markup characters; quotes are only escaped in attribute values.
pub(crate) fn escape(value: &str, in_attribute: bool) -> String {
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

#[cfg(test)]
mod test {
    use crate::reader::parse_document;

    use super::*;

    fn fixture() -> Document {
        parse_document(
            DocId(1),
            "/db/test.xml",
            "<article id=\"a1\"><head>On Bees</head><body>alpha <em>beta</em></body></article>",
        )
        .unwrap()
    }

    #[test]
    fn resolves_root_and_children() {
        let doc = fixture();
        assert!(matches!(
            doc.node(&NodeId::root()).unwrap(),
            NodeHandle::Element(_)
        ));

        // id attribute is numbered before the element children
        let attr_id = NodeId::root().child(1);
        match doc.node(&attr_id).unwrap() {
            NodeHandle::Attribute(owner, attribute) => {
                assert_eq!(owner.name, QName::local("article"));
                assert_eq!(attribute.value, "a1");
            }
            other => panic!("expected attribute, got {other:?}"),
        }
    }

    #[test]
    fn missing_node_errors() {
        let doc = fixture();
        let bogus = NodeId::from_levels(vec![1, 99]);
        assert!(doc.node(&bogus).is_err());
    }

    #[test]
    fn text_content_concatenates_descendants() {
        let doc = fixture();
        let body = doc.element(&NodeId::root().child(3)).unwrap();
        assert_eq!(body.name, QName::local("body"));
        assert_eq!(body.text_content(), "alpha beta");
    }

    #[test]
    fn serializer_round_trips_markup() {
        let doc = fixture();
        let xml = doc.root.to_xml();
        assert!(xml.starts_with("<article id=\"a1\">"));
        assert!(xml.contains("<em>beta</em>"));
    }

    #[test]
    fn escape_handles_attribute_context() {
        assert_eq!(escape("a<b&c", false), "a&lt;b&amp;c");
        assert_eq!(escape("say \"hi\"", true), "say &quot;hi&quot;");
    }
}
