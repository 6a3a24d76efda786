//! Query abstract syntax tree.
//!
//! Represents parsed query descriptions before lowering to engine queries.

use std::fmt;

/// How a boolean clause participates in the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    /// The clause must match.
    Must,
    /// The clause should match; at least one `Should` must when no `Must`
    /// clauses are present.
    Should,
    /// The clause must not match.
    MustNot,
}

/// Multi-term rewrite strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rewrite {
    /// Matches contribute a constant score.
    ConstantScore,
    /// Matches are scored normally.
    Scoring,
}

/// One part of an explicit phrase.
#[derive(Debug, Clone, PartialEq)]
pub enum PhrasePart {
    /// An exact term.
    Term(String),
    /// A wildcard pattern expanded against the live term dictionary.
    Wildcard(String),
}

/// One clause of a boolean query.
#[derive(Debug, Clone, PartialEq)]
pub struct BoolClause {
    /// Participation mode.
    pub occur: Occur,
    /// The clause itself.
    pub node: QueryNode,
}

/// A parsed query node: the operation plus the modifiers every node may
/// carry.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryNode {
    /// The operation.
    pub kind: QueryKind,
    /// Field override; `None` uses the caller-supplied field.
    pub field: Option<String>,
    /// Score multiplier applied after construction.
    pub boost: Option<f32>,
    /// Multi-term rewrite override for this node.
    pub rewrite: Option<Rewrite>,
}

/// The operation of a query node.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryKind {
    /// A single term, analyzed with the target field's analyzer.
    Term(String),
    /// A phrase: either literal text (tokenized through the analyzer) or
    /// explicit parts, some of which may be wildcards.
    Phrase {
        /// Literal text, when the description carried plain content.
        literal: Option<String>,
        /// Explicit parts, when the description carried sub-elements.
        parts: Vec<PhrasePart>,
        /// Allowed positional slack between parts.
        slop: u32,
    },
    /// A wildcard pattern (`*` and `?`).
    Wildcard(String),
    /// A prefix match.
    Prefix(String),
    /// A fuzzy term with a bounded edit distance.
    Fuzzy {
        /// The term text.
        value: String,
        /// Maximum edit distance; `None` uses the engine default.
        max_edits: Option<u8>,
    },
    /// A regular expression over indexed terms.
    Regex(String),
    /// A boolean combination.
    Bool {
        /// The clauses, in description order.
        clauses: Vec<BoolClause>,
        /// Minimum number of `Should` clauses that must match.
        min_should: Option<usize>,
    },
    /// Terms within `slop` positions of each other.
    Near {
        /// Sub-queries; terms and wildcards, possibly nested spans.
        parts: Vec<QueryNode>,
        /// Allowed positional slack.
        slop: u32,
        /// Whether parts must appear in order.
        ordered: bool,
    },
    /// A match within the first `end` token positions of the content.
    First {
        /// The inner span.
        inner: Box<QueryNode>,
        /// Last allowed token position (1-based, inclusive).
        end: u32,
    },
}

impl QueryNode {
    /// Creates a plain node with no modifiers.
    pub fn plain(kind: QueryKind) -> Self {
        Self {
            kind,
            field: None,
            boost: None,
            rewrite: None,
        }
    }

    /// Creates a term node.
    pub fn term(text: impl Into<String>) -> Self {
        Self::plain(QueryKind::Term(text.into()))
    }

    /// Creates a boolean node from clauses.
    pub fn bool_of(clauses: Vec<(Occur, Self)>) -> Self {
        Self::plain(QueryKind::Bool {
            clauses: clauses
                .into_iter()
                .map(|(occur, node)| BoolClause { occur, node })
                .collect(),
            min_should: None,
        })
    }

    /// Formats the node as an indented tree.
    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let prefix = "  ".repeat(indent);
        let modifiers = {
            let mut parts = Vec::new();
            if let Some(field) = &self.field {
                parts.push(format!("field={field}"));
            }
            if let Some(boost) = self.boost {
                parts.push(format!("boost={boost}"));
            }
            if parts.is_empty() {
                String::new()
            } else {
                format!(" [{}]", parts.join(" "))
            }
        };
        match &self.kind {
            QueryKind::Term(text) => writeln!(f, "{prefix}Term({text:?}){modifiers}"),
            QueryKind::Phrase {
                literal,
                parts,
                slop,
            } => {
                if let Some(literal) = literal {
                    writeln!(f, "{prefix}Phrase({literal:?}, slop={slop}){modifiers}")
                } else {
                    writeln!(f, "{prefix}Phrase({parts:?}, slop={slop}){modifiers}")
                }
            }
            QueryKind::Wildcard(pattern) => {
                writeln!(f, "{prefix}Wildcard({pattern:?}){modifiers}")
            }
            QueryKind::Prefix(text) => writeln!(f, "{prefix}Prefix({text:?}){modifiers}"),
            QueryKind::Fuzzy { value, max_edits } => {
                writeln!(f, "{prefix}Fuzzy({value:?}, {max_edits:?}){modifiers}")
            }
            QueryKind::Regex(pattern) => writeln!(f, "{prefix}Regex({pattern:?}){modifiers}"),
            QueryKind::Bool { clauses, .. } => {
                writeln!(f, "{prefix}Bool{modifiers}")?;
                for clause in clauses {
                    writeln!(f, "{prefix}  {:?}:", clause.occur)?;
                    clause.node.fmt_tree(f, indent + 2)?;
                }
                Ok(())
            }
            QueryKind::Near {
                parts,
                slop,
                ordered,
            } => {
                writeln!(f, "{prefix}Near(slop={slop}, ordered={ordered}){modifiers}")?;
                for part in parts {
                    part.fmt_tree(f, indent + 1)?;
                }
                Ok(())
            }
            QueryKind::First { inner, end } => {
                writeln!(f, "{prefix}First(end={end}){modifiers}")?;
                inner.fmt_tree(f, indent + 1)
            }
        }
    }
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn constructors() {
        let node = QueryNode::term("alpha");
        assert_eq!(node.kind, QueryKind::Term("alpha".into()));
        assert!(node.field.is_none());

        let boolean = QueryNode::bool_of(vec![
            (Occur::Must, QueryNode::term("a")),
            (Occur::MustNot, QueryNode::term("b")),
        ]);
        match boolean.kind {
            QueryKind::Bool { clauses, .. } => {
                assert_eq!(clauses.len(), 2);
                assert_eq!(clauses[1].occur, Occur::MustNot);
            }
            other => panic!("expected bool, got {other:?}"),
        }
    }

    #[test]
    fn display_renders_tree() {
        let node = QueryNode::bool_of(vec![(Occur::Must, QueryNode::term("a"))]);
        let rendered = node.to_string();
        assert!(rendered.contains("Bool"));
        assert!(rendered.contains("Term(\"a\")"));
    }
}
