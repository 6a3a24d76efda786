//! Tree-structured document model for xtext.
//!
//! This crate provides the data structures the rest of the workspace builds
//! on:
//! - Qualified names, document ids, and hierarchical node ids
//! - Node paths carrying the attribute sets seen along the way
//! - An in-memory element tree with a strict XML reader and serializer
//! - A structural event walker that turns a tree into a flat event stream
//!
//! Node ids use dotted level numbering: the document element is `1`, its
//! k-th node child is `1.k`, and so on. Attributes are numbered in the same
//! sequence space as child nodes, so every node in a document has a unique,
//! order-preserving id.

#![warn(missing_docs)]

mod error;
mod id;
mod path;
mod qname;
mod reader;
mod tree;
mod walk;

pub use error::DocumentError;
pub use id::{DocId, NodeId, NodeRef};
pub use path::{NodePath, PathStep};
pub use qname::QName;
pub use reader::parse_document;
pub use tree::{Attribute, Content, Document, Element, NodeHandle, Text};
pub use walk::{TreeEvent, stream_tree};
