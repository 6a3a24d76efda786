//! Compiled node-path patterns.
//!
//! A [`PathPattern`] is a sequence of name matchers with optional attribute
//! predicates, compiled from the `match` attribute of a rule. Supported
//! forms:
//!
//! - `/a/b`: anchored path of exact names
//! - `//b`: skip any depth, then `b`
//! - `/a/*/c`: wildcard consumes exactly one path element
//! - `/a/@type`: final step addresses an attribute
//! - `//p[@rend='bold']`, `//p[@rend!='x']`, `//p[not(@rend='x')]`:
//!   attribute predicates evaluated against the attribute set captured at
//!   the matched position
//!
//! Consecutive skip matchers are collapsed during parsing. A skip resolves
//! lazily: when its following matcher also matches the next path element,
//! the skip prefers not to consume it, which reproduces the
//! closest-qualifying-ancestor behavior of `//` patterns.

use std::fmt;

use xtext_document::{NodePath, PathStep, QName};

use crate::error::ConfigError;

/// How a pattern step matches one path element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// Matches exactly one element with this name.
    Name(QName),
    /// Matches exactly one element with any name.
    Wildcard,
    /// Matches zero or more elements of any name.
    Skip,
}

/// Comparison operator of an attribute predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOp {
    /// `@attr = 'value'`
    Eq,
    /// `@attr != 'value'`
    Ne,
}

/// An attribute predicate attached to a pattern step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrPredicate {
    /// The attribute the predicate inspects.
    pub name: QName,
    /// Comparison operator.
    pub op: PredicateOp,
    /// The value compared against.
    pub value: String,
    /// True if the predicate is wrapped in `not(...)`.
    pub negated: bool,
}

impl AttrPredicate {
    /// Evaluates the predicate against an element's attribute set.
    fn matches(&self, attrs: &[(QName, String)]) -> bool {
        let actual = attrs.iter().find(|(name, _)| name == &self.name);
        let satisfied = match (self.op, actual) {
            (PredicateOp::Eq, Some((_, value))) => value == &self.value,
            (PredicateOp::Eq, None) => false,
            (PredicateOp::Ne, Some((_, value))) => value != &self.value,
            // != against an absent attribute holds: the value is not there.
            (PredicateOp::Ne, None) => true,
        };
        satisfied != self.negated
    }
}

/// One step of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternStep {
    /// The name matcher.
    pub test: NameTest,
    /// True if this step addresses an attribute (only valid as last step).
    pub is_attribute: bool,
    /// Attribute predicates, all of which must hold at the matched position.
    pub predicates: Vec<AttrPredicate>,
}

/// A compiled node-path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    /// Steps in match order.
    steps: Vec<PatternStep>,
    /// The original pattern text, kept for diagnostics and hashing.
    source: String,
}

impl PathPattern {
    /// Compiles a pattern from its textual form.
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        Parser {
            pattern,
            rest: pattern,
        }
        .parse()
    }

    /// Builds the pattern equivalent to a bare `qname` rule: `//name`.
    pub fn for_name(name: &QName, is_attribute: bool) -> Self {
        let source = if is_attribute {
            format!("//@{name}")
        } else {
            format!("//{name}")
        };
        Self {
            steps: vec![
                PatternStep {
                    test: NameTest::Skip,
                    is_attribute: false,
                    predicates: Vec::new(),
                },
                PatternStep {
                    test: NameTest::Name(name.clone()),
                    is_attribute,
                    predicates: Vec::new(),
                },
            ],
            source,
        }
    }

    /// The compiled steps.
    pub fn steps(&self) -> &[PatternStep] {
        &self.steps
    }

    /// The original pattern text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True if any step is a wildcard or skip matcher.
    pub fn has_wildcard(&self) -> bool {
        self.steps
            .iter()
            .any(|step| matches!(step.test, NameTest::Wildcard | NameTest::Skip))
    }

    /// The exact name of the final step, if it is a name matcher.
    ///
    /// Patterns with a concrete last name are indexed by it; the rest go to
    /// the linear wildcard list.
    pub fn last_name(&self) -> Option<&QName> {
        match self.steps.last() {
            Some(PatternStep {
                test: NameTest::Name(name),
                ..
            }) => Some(name),
            _ => None,
        }
    }

    /// True if the final step addresses an attribute.
    pub fn targets_attribute(&self) -> bool {
        self.steps.last().is_some_and(|step| step.is_attribute)
    }

    /// True if any step carries attribute predicates.
    pub fn has_predicates(&self) -> bool {
        self.steps.iter().any(|step| !step.predicates.is_empty())
    }

    /// Tests the pattern against a full node path.
    pub fn matches(&self, path: &NodePath) -> bool {
        self.match_from(&self.steps, path.steps(), true)
    }

    /// Tests the pattern ignoring attribute predicates.
    ///
    /// Used as the probabilistic pre-filter: false positives are fine,
    /// false negatives are not.
    pub fn matches_ignoring_predicates(&self, path: &NodePath) -> bool {
        self.match_from(&self.steps, path.steps(), false)
    }

    /// Dual-pointer matcher. A skip prefers consuming nothing first, so the
    /// following matcher binds to the closest qualifying element.
    fn match_from(&self, steps: &[PatternStep], path: &[PathStep], predicates: bool) -> bool {
        let Some((step, remaining)) = steps.split_first() else {
            return path.is_empty();
        };
        match &step.test {
            NameTest::Skip => {
                // Zero-consumption first, then give one element to the skip.
                if self.match_from(remaining, path, predicates) {
                    return true;
                }
                match path.split_first() {
                    Some((head, tail)) if !head.is_attribute => {
                        self.match_from(steps, tail, predicates)
                    }
                    _ => false,
                }
            }
            NameTest::Wildcard | NameTest::Name(_) => {
                let Some((head, tail)) = path.split_first() else {
                    return false;
                };
                if head.is_attribute != step.is_attribute {
                    return false;
                }
                if let NameTest::Name(name) = &step.test
                    && name != &head.name
                {
                    return false;
                }
                if predicates && !step.predicates.iter().all(|p| p.matches(&head.attrs)) {
                    return false;
                }
                self.match_from(remaining, tail, predicates)
            }
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Recursive-descent parser for the pattern grammar.
struct Parser<'a> {
    /// Full pattern text, for error reporting.
    pattern: &'a str,
    /// Unconsumed input.
    rest: &'a str,
}

impl Parser<'_> {
    /// Fails with a reason referring to the full pattern.
    fn fail(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidPattern {
            pattern: self.pattern.to_string(),
            reason: reason.into(),
        }
    }

    /// Parses the whole pattern.
    fn parse(mut self) -> Result<PathPattern, ConfigError> {
        let mut steps: Vec<PatternStep> = Vec::new();
        if self.rest.is_empty() {
            return Err(self.fail("empty pattern"));
        }
        if !self.rest.starts_with('/') {
            return Err(self.fail("pattern must start with `/` or `//`"));
        }

        while !self.rest.is_empty() {
            if let Some(rest) = self.rest.strip_prefix("//") {
                self.rest = rest;
                // Collapse runs of skips produced by `////` and the like.
                if !matches!(
                    steps.last(),
                    Some(PatternStep {
                        test: NameTest::Skip,
                        ..
                    })
                ) {
                    steps.push(PatternStep {
                        test: NameTest::Skip,
                        is_attribute: false,
                        predicates: Vec::new(),
                    });
                }
            } else if let Some(rest) = self.rest.strip_prefix('/') {
                self.rest = rest;
            } else {
                return Err(self.fail("expected `/` between steps"));
            }
            steps.push(self.parse_step()?);
        }

        if let Some(position) = steps
            .iter()
            .position(|step| step.is_attribute)
            .filter(|&position| position != steps.len() - 1)
        {
            return Err(self.fail(format!(
                "attribute step at position {position} must be last"
            )));
        }
        if matches!(
            steps.last(),
            Some(PatternStep {
                test: NameTest::Skip,
                ..
            })
        ) {
            return Err(self.fail("pattern cannot end with `//`"));
        }

        Ok(PathPattern {
            steps,
            source: self.pattern.to_string(),
        })
    }

    /// Parses one step: name test plus trailing predicates.
    fn parse_step(&mut self) -> Result<PatternStep, ConfigError> {
        let is_attribute = if let Some(rest) = self.rest.strip_prefix('@') {
            self.rest = rest;
            true
        } else {
            false
        };

        let name_len = self
            .rest
            .find(['/', '['])
            .unwrap_or(self.rest.len());
        let raw_name = &self.rest[..name_len];
        if raw_name.is_empty() {
            return Err(self.fail("empty step name"));
        }
        self.rest = &self.rest[name_len..];

        let test = if raw_name == "*" {
            NameTest::Wildcard
        } else {
            NameTest::Name(QName::parse(raw_name))
        };

        let mut predicates = Vec::new();
        while self.rest.starts_with('[') {
            predicates.push(self.parse_predicate()?);
        }

        if is_attribute && !predicates.is_empty() {
            return Err(self.fail("attribute steps cannot carry predicates"));
        }

        Ok(PatternStep {
            test,
            is_attribute,
            predicates,
        })
    }

    /// Parses `[@a='v']`, `[@a!='v']` or `[not(@a='v')]`.
    fn parse_predicate(&mut self) -> Result<AttrPredicate, ConfigError> {
        let end = self
            .rest
            .find(']')
            .ok_or_else(|| self.fail("unterminated predicate"))?;
        let body = self.rest[1..end].trim();
        self.rest = &self.rest[end + 1..];

        let (negated, body) = match body.strip_prefix("not(").and_then(|b| b.strip_suffix(')')) {
            Some(inner) => (true, inner.trim()),
            None => (false, body),
        };

        let body = body
            .strip_prefix('@')
            .ok_or_else(|| self.fail("predicate must test an attribute"))?;

        let (name, op, value) = if let Some((name, value)) = body.split_once("!=") {
            (name, PredicateOp::Ne, value)
        } else if let Some((name, value)) = body.split_once('=') {
            (name, PredicateOp::Eq, value)
        } else {
            return Err(self.fail("predicate must compare with `=` or `!=`"));
        };

        let value = value.trim();
        let value = value
            .strip_prefix('\'')
            .and_then(|v| v.strip_suffix('\''))
            .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
            .ok_or_else(|| self.fail("predicate value must be quoted"))?;

        Ok(AttrPredicate {
            name: QName::parse(name.trim()),
            op,
            value: value.to_string(),
            negated,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn path_of(names: &[&str]) -> NodePath {
        let mut path = NodePath::new();
        for name in names {
            path.push(PathStep::element(QName::parse(name), vec![]));
        }
        path
    }

    #[test]
    fn anchored_path_matches_exactly() {
        let pattern = PathPattern::parse("/article/body").unwrap();
        assert!(pattern.matches(&path_of(&["article", "body"])));
        assert!(!pattern.matches(&path_of(&["article"])));
        assert!(!pattern.matches(&path_of(&["article", "body", "p"])));
        assert!(!pattern.matches(&path_of(&["other", "body"])));
        assert!(!pattern.has_wildcard());
    }

    #[test]
    fn skip_matches_any_depth() {
        let pattern = PathPattern::parse("//head").unwrap();
        assert!(pattern.matches(&path_of(&["head"])));
        assert!(pattern.matches(&path_of(&["a", "head"])));
        assert!(pattern.matches(&path_of(&["a", "b", "c", "head"])));
        assert!(!pattern.matches(&path_of(&["a", "head", "b"])));
        assert!(pattern.has_wildcard());
    }

    #[test]
    fn wildcard_consumes_exactly_one() {
        let pattern = PathPattern::parse("/a/*/c").unwrap();
        assert!(pattern.matches(&path_of(&["a", "b", "c"])));
        assert!(pattern.matches(&path_of(&["a", "x", "c"])));
        assert!(!pattern.matches(&path_of(&["a", "c"])));
        assert!(!pattern.matches(&path_of(&["a", "b", "b", "c"])));
    }

    #[test]
    fn interior_skip() {
        let pattern = PathPattern::parse("/doc//title").unwrap();
        assert!(pattern.matches(&path_of(&["doc", "title"])));
        assert!(pattern.matches(&path_of(&["doc", "section", "title"])));
        assert!(!pattern.matches(&path_of(&["other", "title"])));
    }

    #[test]
    fn consecutive_skips_collapse() {
        let pattern = PathPattern::parse("////p").unwrap();
        let skips = pattern
            .steps()
            .iter()
            .filter(|s| s.test == NameTest::Skip)
            .count();
        assert_eq!(skips, 1);
        assert!(pattern.matches(&path_of(&["a", "p"])));
    }

    #[test]
    fn skip_binds_to_closest_qualifying_element() {
        // With nested same-name elements the skip must stop at the first
        // match; the pattern still accepts the deeper path because the
        // trailing elements belong to the matched element's subtree in
        // prefix tests, but a full-path match requires the last element.
        let pattern = PathPattern::parse("//section/title").unwrap();
        assert!(pattern.matches(&path_of(&["doc", "section", "title"])));
        assert!(pattern.matches(&path_of(&["doc", "section", "section", "title"])));
        assert!(!pattern.matches(&path_of(&["doc", "section", "title", "b"])));
    }

    #[test]
    fn attribute_step() {
        let pattern = PathPattern::parse("/item/@cat").unwrap();
        let mut path = path_of(&["item"]);
        path.push(PathStep::attribute(QName::local("cat")));
        assert!(pattern.matches(&path));
        assert!(!pattern.matches(&path_of(&["item", "cat"])));
        assert!(pattern.targets_attribute());
    }

    #[test]
    fn predicates_gate_the_match() {
        let pattern = PathPattern::parse("//p[@rend='bold']").unwrap();

        let mut with_attr = NodePath::new();
        with_attr.push(PathStep::element(QName::local("doc"), vec![]));
        with_attr.push(PathStep::element(
            QName::local("p"),
            vec![(QName::local("rend"), "bold".into())],
        ));
        assert!(pattern.matches(&with_attr));

        let mut wrong_value = NodePath::new();
        wrong_value.push(PathStep::element(QName::local("doc"), vec![]));
        wrong_value.push(PathStep::element(
            QName::local("p"),
            vec![(QName::local("rend"), "italic".into())],
        ));
        assert!(!pattern.matches(&wrong_value));
        // The pre-filter ignores predicates: false positive allowed.
        assert!(pattern.matches_ignoring_predicates(&wrong_value));

        assert!(!pattern.matches(&path_of(&["doc", "p"])));
    }

    #[test]
    fn negated_and_ne_predicates() {
        let ne = PathPattern::parse("//p[@rend!='bold']").unwrap();
        let not = PathPattern::parse("//p[not(@rend='bold')]").unwrap();

        let plain = {
            let mut path = NodePath::new();
            path.push(PathStep::element(QName::local("p"), vec![]));
            path
        };
        let bold = {
            let mut path = NodePath::new();
            path.push(PathStep::element(
                QName::local("p"),
                vec![(QName::local("rend"), "bold".into())],
            ));
            path
        };

        assert!(ne.matches(&plain));
        assert!(!ne.matches(&bold));
        assert!(not.matches(&plain));
        assert!(!not.matches(&bold));
    }

    #[test]
    fn for_name_builds_descendant_pattern() {
        let pattern = PathPattern::for_name(&QName::local("title"), false);
        assert!(pattern.matches(&path_of(&["a", "b", "title"])));
        assert_eq!(pattern.last_name(), Some(&QName::local("title")));
        assert_eq!(pattern.source(), "//title");
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(PathPattern::parse("").is_err());
        assert!(PathPattern::parse("a/b").is_err());
        assert!(PathPattern::parse("/a//").is_err());
        assert!(PathPattern::parse("/a/[@x='1']").is_err());
        assert!(PathPattern::parse("/a[@x='1'").is_err());
        assert!(PathPattern::parse("/a[@x=1]").is_err());
        assert!(PathPattern::parse("/@x/b").is_err());
    }

    #[test]
    fn last_name_none_for_wildcard_tail() {
        let pattern = PathPattern::parse("/a/*").unwrap();
        assert!(pattern.last_name().is_none());
    }
}
