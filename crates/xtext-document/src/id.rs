//! Document and node identifiers.
//!
//! Node ids use dotted level numbering. The ordering derived from the level
//! components is document order, and a node's id is a prefix of all of its
//! descendants' ids, which makes ancestor tests and parent lookup purely
//! structural.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{error::DocumentError, qname::QName};

/// Identifier of a document within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A hierarchical node id in dotted level numbering.
///
/// The document element is `1`; the k-th node child of a node `p` is `p.k`.
/// Lexicographic comparison of the level components is document order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(Vec<u32>);

impl NodeId {
    /// The id of the document element.
    pub fn root() -> Self {
        Self(vec![1])
    }

    /// Creates a node id from its level components.
    ///
    /// An empty component list is not a valid node id; callers construct ids
    /// through [`NodeId::root`] and [`NodeId::child`] during tree building.
    pub fn from_levels(levels: Vec<u32>) -> Self {
        Self(levels)
    }

    /// Returns the id of this node's k-th child (1-based).
    pub fn child(&self, k: u32) -> Self {
        let mut levels = self.0.clone();
        levels.push(k);
        Self(levels)
    }

    /// Returns the parent id, or `None` for the document element.
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Returns true if `self` is a strict descendant of `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &Self) -> bool {
        self.0.len() > ancestor.0.len() && self.0.starts_with(&ancestor.0)
    }

    /// Returns true if `self` is `ancestor` or a descendant of it.
    pub fn is_self_or_descendant_of(&self, ancestor: &Self) -> bool {
        self.0.starts_with(&ancestor.0)
    }

    /// Number of levels in this id.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// The level components.
    pub fn levels(&self) -> &[u32] {
        &self.0
    }

    /// Serializes the id as a big-endian byte run, one `u32` per level.
    ///
    /// This byte form is used verbatim as the exact engine term for the node,
    /// so it must be stable across releases.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.0.len() * 4);
        for level in &self.0 {
            bytes.extend_from_slice(&level.to_be_bytes());
        }
        bytes
    }

    /// Deserializes an id from the byte form produced by [`NodeId::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            return Err(DocumentError::InvalidNodeId);
        }
        let levels = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self(levels))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for level in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{level}")?;
            first = false;
        }
        Ok(())
    }
}

/// A reference to one node in one document.
///
/// Never reused across documents and immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    /// The document the node belongs to.
    pub doc: DocId,
    /// The node's structural id.
    pub node: NodeId,
    /// The node's qualified name.
    pub name: QName,
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.doc, self.name, self.node)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn child_and_parent_are_inverse() {
        let root = NodeId::root();
        let child = root.child(3);
        assert_eq!(child.to_string(), "1.3");
        assert_eq!(child.parent(), Some(root.clone()));
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn descendant_tests() {
        let root = NodeId::root();
        let a = root.child(2);
        let b = a.child(1);
        assert!(b.is_descendant_of(&root));
        assert!(b.is_descendant_of(&a));
        assert!(!a.is_descendant_of(&b));
        assert!(!a.is_descendant_of(&a));
        assert!(a.is_self_or_descendant_of(&a));
    }

    #[test]
    fn ordering_is_document_order() {
        let root = NodeId::root();
        let a = root.child(2);
        let b = root.child(10);
        let a_child = a.child(1);
        assert!(root < a);
        assert!(a < a_child);
        assert!(a_child < b);
    }

    #[test]
    fn byte_round_trip() {
        let id = NodeId::from_levels(vec![1, 4, 260]);
        let bytes = id.to_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(NodeId::from_bytes(&bytes).unwrap(), id);
    }

    #[test]
    fn malformed_bytes_rejected() {
        assert!(NodeId::from_bytes(&[]).is_err());
        assert!(NodeId::from_bytes(&[0, 0, 1]).is_err());
    }
}
