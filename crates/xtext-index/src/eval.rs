//! Expression evaluation for derived fields and facets.
//!
//! Field and facet values are computed by evaluating an embedded expression
//! against the matched node. The full query language lives in an external
//! engine; this crate only depends on the capability expressed by the
//! [`Evaluator`] trait and ships [`PathEvaluator`], a compiler for the
//! relative-path subset that rule documents use in practice
//! (`../@cat`, `author/last`, `.`, `@type`).
//!
//! Expressions are compiled lazily, once per rule per session; a rule whose
//! expression fails stays disabled for the remainder of that session.

use thiserror::Error;
use xtext_document::{Document, NodeHandle, NodeId, QName};

/// Errors from compiling or evaluating an expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The expression could not be compiled.
    #[error("cannot compile expression `{expression}`: {reason}")]
    Compile {
        /// The expression text.
        expression: String,
        /// Why compilation failed.
        reason: String,
    },

    /// The expression failed while evaluating against a node.
    #[error("expression `{expression}` failed: {reason}")]
    Evaluate {
        /// The expression text.
        expression: String,
        /// Why evaluation failed.
        reason: String,
    },

    /// The caller lacks access to evaluate the expression.
    ///
    /// Treated exactly like an evaluation failure: the rule is disabled for
    /// the session, indexing continues.
    #[error("permission denied evaluating `{expression}`")]
    PermissionDenied {
        /// The expression text.
        expression: String,
    },
}

/// One step of a compiled path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ExprStep {
    /// `.`: stay on the context node.
    SelfNode,
    /// `..`: move to the parent element.
    Parent,
    /// `name`: child elements with this name.
    Child(QName),
    /// `@name`: an attribute value; must be the final step.
    Attribute(QName),
}

/// A compiled expression, cached per rule by the indexing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledExpr {
    /// The source expression.
    source: String,
    /// Compiled steps.
    steps: Vec<ExprStep>,
}

impl CompiledExpr {
    /// The source text of the expression.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// The capability to evaluate expressions against document nodes.
pub trait Evaluator: Send + Sync {
    /// Compiles an expression.
    fn compile(&self, expression: &str) -> Result<CompiledExpr, EvalError>;

    /// Evaluates a compiled expression against a context node, returning
    /// the string values of the result sequence.
    fn evaluate(
        &self,
        expr: &CompiledExpr,
        document: &Document,
        context: &NodeId,
    ) -> Result<Vec<String>, EvalError>;
}

/// The built-in relative-path evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathEvaluator;

impl Evaluator for PathEvaluator {
    fn compile(&self, expression: &str) -> Result<CompiledExpr, EvalError> {
        let fail = |reason: &str| EvalError::Compile {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(fail("empty expression"));
        }
        if trimmed.starts_with('/') {
            return Err(fail("absolute paths are not supported"));
        }

        let mut steps = Vec::new();
        for raw in trimmed.split('/') {
            let raw = raw.trim();
            let step = match raw {
                "" => return Err(fail("empty step")),
                "." => ExprStep::SelfNode,
                ".." => ExprStep::Parent,
                _ => {
                    if let Some(name) = raw.strip_prefix('@') {
                        ExprStep::Attribute(QName::parse(name))
                    } else if raw.contains(['(', ')', '[', ']']) {
                        return Err(fail("only name, `.`, `..`, and `@attr` steps are supported"));
                    } else {
                        ExprStep::Child(QName::parse(raw))
                    }
                }
            };
            if matches!(steps.last(), Some(ExprStep::Attribute(_))) {
                return Err(fail("attribute step must be last"));
            }
            steps.push(step);
        }

        Ok(CompiledExpr {
            source: trimmed.to_string(),
            steps,
        })
    }

    fn evaluate(
        &self,
        expr: &CompiledExpr,
        document: &Document,
        context: &NodeId,
    ) -> Result<Vec<String>, EvalError> {
        let fail = |reason: String| EvalError::Evaluate {
            expression: expr.source.clone(),
            reason,
        };

        let start = match document.node(context).map_err(|e| fail(e.to_string()))? {
            NodeHandle::Element(element) => element,
            NodeHandle::Attribute(owner, _) => owner,
            NodeHandle::Text(_) => {
                return Err(fail("context node is a text node".to_string()));
            }
        };

        let mut nodes: Vec<&xtext_document::Element> = vec![start];
        let mut values: Option<Vec<String>> = None;

        for step in &expr.steps {
            if values.is_some() {
                return Err(fail("attribute step must be last".to_string()));
            }
            match step {
                ExprStep::SelfNode => {}
                ExprStep::Parent => {
                    let mut parents = Vec::new();
                    for node in &nodes {
                        if let Some(parent_id) = node.node_id.parent()
                            && let Ok(element) = document.element(&parent_id)
                        {
                            parents.push(element);
                        }
                    }
                    nodes = parents;
                }
                ExprStep::Child(name) => {
                    let mut children = Vec::new();
                    for node in &nodes {
                        for child in &node.children {
                            if let xtext_document::Content::Element(child_element) = child
                                && &child_element.name == name
                            {
                                children.push(child_element);
                            }
                        }
                    }
                    nodes = children;
                }
                ExprStep::Attribute(name) => {
                    let collected = nodes
                        .iter()
                        .filter_map(|node| node.attribute(name))
                        .map(|attribute| attribute.value.clone())
                        .collect();
                    values = Some(collected);
                }
            }
        }

        Ok(values.unwrap_or_else(|| {
            nodes
                .iter()
                .map(|node| node.text_content())
                .collect()
        }))
    }
}

#[cfg(test)]
mod test {
    use xtext_document::{DocId, parse_document};

    use super::*;

    fn fixture() -> Document {
        parse_document(
            DocId(1),
            "/db/item.xml",
            r#"<item cat="fruit"><name lang="en">apple</name><price>3</price><price>4</price></item>"#,
        )
        .unwrap()
    }

    fn eval(expression: &str, context: &NodeId) -> Result<Vec<String>, EvalError> {
        let evaluator = PathEvaluator;
        let compiled = evaluator.compile(expression)?;
        evaluator.evaluate(&compiled, &fixture(), context)
    }

    #[test]
    fn parent_attribute() {
        // context: <name> element (attr cat = 1.1, name element = 1.2)
        let name_id = NodeId::root().child(2);
        assert_eq!(eval("../@cat", &name_id).unwrap(), vec!["fruit"]);
    }

    #[test]
    fn own_attribute_and_self() {
        let name_id = NodeId::root().child(2);
        assert_eq!(eval("@lang", &name_id).unwrap(), vec!["en"]);
        assert_eq!(eval(".", &name_id).unwrap(), vec!["apple"]);
    }

    #[test]
    fn child_steps_collect_every_match() {
        let root = NodeId::root();
        assert_eq!(eval("price", &root).unwrap(), vec!["3", "4"]);
        assert_eq!(eval("name", &root).unwrap(), vec!["apple"]);
    }

    #[test]
    fn missing_results_are_empty_not_errors() {
        let root = NodeId::root();
        assert_eq!(eval("missing", &root).unwrap(), Vec::<String>::new());
        assert_eq!(eval("@missing", &root).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn compile_rejects_unsupported_forms() {
        let evaluator = PathEvaluator;
        assert!(evaluator.compile("").is_err());
        assert!(evaluator.compile("/absolute").is_err());
        assert!(evaluator.compile("name()").is_err());
        assert!(evaluator.compile("@a/@b").is_err());
        assert!(evaluator.compile("@a/name").is_err());
    }

    #[test]
    fn text_context_is_an_evaluation_error() {
        // 1.2.1 is the text node inside <name>
        let text_id = NodeId::root().child(2).child(1);
        assert!(matches!(
            eval(".", &text_id),
            Err(EvalError::Evaluate { .. })
        ));
    }
}
