//! The compiled index configuration.
//!
//! Built once from a rule document and immutable afterwards. Rules with a
//! concrete last path component are indexed by that component for O(1)
//! average lookup; patterns whose last component is a wildcard go to a
//! linear list that is only scanned when needed.

use std::collections::{HashMap, HashSet};

use xtext_document::{NodePath, QName};

use crate::{
    analyzers::AnalyzerRegistry,
    error::ConfigError,
    rules::{IndexRule, RuleId},
    xconf,
};

/// Where reindexing must start after a structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReindexAnchor {
    /// Number of path steps from the root to the anchor element, inclusive.
    pub depth: usize,
}

/// A compiled set of index rules plus the registries they reference.
#[derive(Debug, Clone)]
pub struct IndexConfiguration {
    /// Rule arena; `RuleId` indexes into this.
    rules: Vec<IndexRule>,
    /// Rules indexed by the encoded last path component.
    by_key: HashMap<String, Vec<RuleId>>,
    /// Rules whose last component is a wildcard, in declaration order.
    wildcard: Vec<RuleId>,
    /// Declared analyzers.
    analyzers: AnalyzerRegistry,
    /// Elements that do not break a token (no separator inserted).
    inline: HashSet<String>,
    /// Elements whose content is excluded from extraction.
    ignore: HashSet<String>,
    /// The serialized rule document, kept for config hashing.
    source: String,
}

impl IndexConfiguration {
    /// Parses a configuration from a rule document element tree.
    pub fn parse(root: &xtext_document::Element) -> Result<Self, ConfigError> {
        xconf::parse(root)
    }

    /// Assembles a configuration from parsed parts. Used by the xconf
    /// parser and by tests that build configurations programmatically.
    pub(crate) fn assemble(
        rules: Vec<IndexRule>,
        analyzers: AnalyzerRegistry,
        inline: HashSet<String>,
        ignore: HashSet<String>,
        source: String,
    ) -> Self {
        let mut by_key: HashMap<String, Vec<RuleId>> = HashMap::new();
        let mut wildcard = Vec::new();
        for rule in &rules {
            match rule.pattern.last_name() {
                Some(name) => by_key.entry(name.encoded()).or_default().push(rule.id),
                None => wildcard.push(rule.id),
            }
        }
        Self {
            rules,
            by_key,
            wildcard,
            analyzers,
            inline,
            ignore,
            source,
        }
    }

    /// The rule arena, in declaration order.
    pub fn rules(&self) -> &[IndexRule] {
        &self.rules
    }

    /// Resolves a rule id.
    pub fn rule(&self, id: RuleId) -> &IndexRule {
        &self.rules[id.0]
    }

    /// The analyzer registry.
    pub fn analyzers(&self) -> &AnalyzerRegistry {
        &self.analyzers
    }

    /// The serialized rule document this configuration was built from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True if `name` marks an inline element.
    pub fn is_inline(&self, name: &QName) -> bool {
        self.inline.contains(&name.encoded())
    }

    /// True if `name` marks an ignored element.
    pub fn is_ignored(&self, name: &QName) -> bool {
        self.ignore.contains(&name.encoded())
    }

    /// True if any rule's last component is `name`, or wildcard rules
    /// exist. A false result guarantees no path ending in `name` matches.
    pub fn has_config(&self, name: &QName) -> bool {
        !self.wildcard.is_empty() || self.by_key.contains_key(&name.encoded())
    }

    /// Every rule whose pattern matches `path`, in declaration order.
    pub fn rules_for<'a>(&'a self, path: &NodePath) -> Vec<&'a IndexRule> {
        let Some(last) = path.last() else {
            return Vec::new();
        };
        let mut ids: Vec<RuleId> = Vec::new();
        if let Some(exact) = self.by_key.get(&last.name.encoded()) {
            ids.extend(exact.iter().copied());
        }
        ids.extend(self.wildcard.iter().copied());
        ids.sort_unstable();
        ids.iter()
            .map(|&id| self.rule(id))
            .filter(|rule| rule.pattern.matches(path))
            .collect()
    }

    /// Fast membership pre-filter: may report false positives (predicates
    /// are not rechecked), never false negatives.
    pub fn matches(&self, path: &NodePath) -> bool {
        let Some(last) = path.last() else {
            return false;
        };
        if let Some(exact) = self.by_key.get(&last.name.encoded())
            && exact
                .iter()
                .any(|&id| self.rule(id).pattern.matches_ignoring_predicates(path))
        {
            return true;
        }
        self.wildcard
            .iter()
            .any(|&id| self.rule(id).pattern.matches_ignoring_predicates(path))
    }

    /// True if any applicable rule carries expression-bearing fields or
    /// facets, in which case flushing must wait for a complete document.
    pub fn has_expression_rules(&self) -> bool {
        self.rules.iter().any(IndexRule::has_expressions)
    }

    /// Determines where reindexing must start for a change at `path`.
    ///
    /// A rule's indexed text is the concatenation of all matching
    /// descendant text, so a change below a rule's anchor reindexes from
    /// the anchor: the highest ancestor whose path matches a rule. For
    /// attribute-only changes, only rules flagged reindex-on-attribute-
    /// change are considered, and the anchor is the owning element.
    ///
    /// `include_self` controls whether the changed element's own step
    /// participates (true for insertions below the node, false when the
    /// node itself is being replaced).
    pub fn reindex_root(
        &self,
        path: &NodePath,
        is_attribute: bool,
        include_self: bool,
    ) -> Option<ReindexAnchor> {
        if is_attribute {
            return self.attribute_reindex_root(path);
        }

        let mut probe_len = path.len();
        if !include_self && probe_len > 0 {
            probe_len -= 1;
        }

        // Highest matching ancestor wins: shortest matching prefix.
        for len in 1..=probe_len {
            if self.matches(&path.prefix(len)) {
                return Some(ReindexAnchor { depth: len });
            }
        }
        None
    }

    /// Attribute-change variant: reindex from the owner element when a
    /// rule that depends on attributes matches the attribute's path or the
    /// owner's path.
    fn attribute_reindex_root(&self, path: &NodePath) -> Option<ReindexAnchor> {
        if path.len() < 2 {
            return None;
        }
        let owner = path.prefix(path.len() - 1);
        let depends = |candidate: &NodePath| {
            self.rules.iter().any(|rule| {
                rule.should_reindex_on_attribute_change() && {
                    // Predicates are exactly what changed, so they must not
                    // gate the decision to reindex.
                    rule.pattern.matches_ignoring_predicates(candidate)
                }
            })
        };
        if depends(path) || depends(&owner) {
            return Some(ReindexAnchor {
                depth: owner.len(),
            });
        }
        None
    }
}
