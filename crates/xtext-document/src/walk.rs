//! Structural event stream.
//!
//! [`stream_tree`] flattens a document subtree into the event protocol the
//! indexing pipeline consumes: a start event per element, one event per
//! attribute, one per text node, and an end event per element. The walker
//! maintains the [`NodePath`] (including captured attribute sets) and hands
//! it to the callback with every event; for attribute events the attribute
//! itself is pushed as the final path step for the duration of the call.

use crate::{
    path::{NodePath, PathStep},
    tree::{Attribute, Content, Element, Text},
};

/// One structural event during a tree walk.
#[derive(Debug)]
pub enum TreeEvent<'a> {
    /// An element was entered. Attributes have not been delivered yet.
    StartElement {
        /// The element being entered.
        element: &'a Element,
        /// Path from the document element to this element, inclusive.
        path: &'a NodePath,
    },
    /// An attribute of the most recently started element.
    Attribute {
        /// The owning element.
        owner: &'a Element,
        /// The attribute node.
        attribute: &'a Attribute,
        /// Path including the attribute as its final step.
        path: &'a NodePath,
    },
    /// A text node.
    Characters {
        /// The text node.
        text: &'a Text,
        /// Path to the enclosing element.
        path: &'a NodePath,
    },
    /// An element was exited.
    EndElement {
        /// The element being exited.
        element: &'a Element,
        /// Path from the document element to this element, inclusive.
        path: &'a NodePath,
    },
}

/// Walks the subtree rooted at `root`, delivering events to `sink`.
///
/// `base_path` holds the steps of `root`'s ancestors; pass an empty path
/// when walking from the document element.
pub fn stream_tree<F>(root: &Element, base_path: &mut NodePath, sink: &mut F)
where
    F: for<'a> FnMut(TreeEvent<'a>),
{
    walk_element(root, base_path, sink);
}

/// Recursive walker behind [`stream_tree`].
fn walk_element<F>(element: &Element, path: &mut NodePath, sink: &mut F)
where
    F: for<'a> FnMut(TreeEvent<'a>),
{
    path.push(PathStep::element(element.name.clone(), element.attr_pairs()));
    sink(TreeEvent::StartElement { element, path });

    for attribute in &element.attributes {
        path.push(PathStep::attribute(attribute.name.clone()));
        sink(TreeEvent::Attribute {
            owner: element,
            attribute,
            path,
        });
        path.pop();
    }

    for child in &element.children {
        match child {
            Content::Element(child_element) => walk_element(child_element, path, sink),
            Content::Text(text) => sink(TreeEvent::Characters { text, path }),
        }
    }

    sink(TreeEvent::EndElement { element, path });
    path.pop();
}
