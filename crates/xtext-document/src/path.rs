//! Node paths.
//!
//! A [`NodePath`] is the sequence of qualified names from the document
//! element down to the node under consideration. Each step carries the
//! attribute set that was present on the element, so pattern predicates can
//! be evaluated without going back to the tree.

use std::fmt;

use crate::qname::QName;

/// One step of a node path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    /// The element or attribute name at this step.
    pub name: QName,
    /// True if this step addresses an attribute node (always the last step).
    pub is_attribute: bool,
    /// Attributes present on the element at this step.
    ///
    /// Empty for attribute steps.
    pub attrs: Vec<(QName, String)>,
}

impl PathStep {
    /// Creates an element step.
    pub fn element(name: QName, attrs: Vec<(QName, String)>) -> Self {
        Self {
            name,
            is_attribute: false,
            attrs,
        }
    }

    /// Creates an attribute step.
    pub fn attribute(name: QName) -> Self {
        Self {
            name,
            is_attribute: true,
            attrs: Vec::new(),
        }
    }
}

/// The path from the document element to a node, root first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePath {
    /// Steps from the document element downwards.
    steps: Vec<PathStep>,
}

impl NodePath {
    /// Creates an empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step.
    pub fn push(&mut self, step: PathStep) {
        self.steps.push(step);
    }

    /// Removes the last step.
    pub fn pop(&mut self) -> Option<PathStep> {
        self.steps.pop()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True if the path has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The steps, root first.
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// The last step, if any.
    pub fn last(&self) -> Option<&PathStep> {
        self.steps.last()
    }

    /// Returns a copy of the first `len` steps.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            steps: self.steps[..len.min(self.steps.len())].to_vec(),
        }
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            if step.is_attribute {
                write!(f, "/@{}", step.name)?;
            } else {
                write!(f, "/{}", step.name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_marks_attributes() {
        let mut path = NodePath::new();
        path.push(PathStep::element(QName::local("article"), vec![]));
        path.push(PathStep::element(QName::local("head"), vec![]));
        path.push(PathStep::attribute(QName::local("rend")));
        assert_eq!(path.to_string(), "/article/head/@rend");
    }

    #[test]
    fn prefix_truncates() {
        let mut path = NodePath::new();
        path.push(PathStep::element(QName::local("a"), vec![]));
        path.push(PathStep::element(QName::local("b"), vec![]));
        let prefix = path.prefix(1);
        assert_eq!(prefix.to_string(), "/a");
        assert_eq!(path.prefix(9).len(), 2);
    }
}
