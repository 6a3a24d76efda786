//! Lowering of query descriptions to engine queries.
//!
//! Each AST node maps to one native query constructor. Wildcard and prefix
//! nodes become regular-expression queries; wildcard parts inside phrases
//! are expanded against the live term dictionary before the phrase is
//! built. Span semantics are approximated at the engine boundary: `near`
//! lowers to a slop phrase (plus the reversed pair when unordered), and
//! `first` lowers to its inner query while its position bound travels with
//! the translated query for enforcement during match correlation.

use std::collections::HashSet;

use levenshtein_automata::{Distance, LevenshteinAutomatonBuilder, SINK_STATE};
use tantivy::Searcher;
use tantivy::query::{
    AllQuery, BooleanQuery, BoostQuery, ConstScoreQuery, EmptyQuery, FuzzyTermQuery,
    Occur as EngineOccur, PhraseQuery, Query, RegexQuery, TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption, Term};
use tantivy_fst::Automaton;
use xtext_query::{Occur, PhrasePart, QueryKind, QueryNode, Rewrite};

use crate::{analyzer, error::IndexError, index::SearchIndex};

/// The engine's maximum fuzzy edit distance.
const MAX_FUZZY_DISTANCE: u8 = 2;

/// Upper bound on dictionary expansions of one wildcard.
const MAX_EXPANSIONS: usize = 128;

/// A lowered query plus the correlation-time constraints it carries.
pub struct TranslatedQuery {
    /// The engine query.
    pub query: Box<dyn Query>,
    /// Position bound from `first` nodes, enforced during correlation.
    pub first_bound: Option<u32>,
}

/// Terms a highlighter must look for, derived from the same description.
#[derive(Debug, Default)]
pub struct TermsOfInterest {
    /// Single terms to mark wherever they occur.
    pub terms: HashSet<String>,
    /// Phrase sequences; only complete contiguous occurrences are marked.
    pub phrases: Vec<Vec<String>>,
    /// Position bound from `first` nodes.
    pub first_bound: Option<u32>,
}

/// Wrapper implementing the fst automaton over a Levenshtein DFA.
struct LevenshteinDfa(levenshtein_automata::DFA);

impl Automaton for LevenshteinDfa {
    type State = u32;

    fn start(&self) -> Self::State {
        self.0.initial_state()
    }

    fn is_match(&self, state: &Self::State) -> bool {
        matches!(self.0.distance(*state), Distance::Exact(_))
    }

    fn can_match(&self, state: &Self::State) -> bool {
        *state != SINK_STATE
    }

    fn accept(&self, state: &Self::State, byte: u8) -> Self::State {
        self.0.transition(*state, byte)
    }
}

/// Compiles query descriptions against one index.
pub struct QueryTranslator<'a> {
    /// The index supplying fields, analyzers, and the term dictionary.
    index: &'a SearchIndex,
}

impl<'a> QueryTranslator<'a> {
    /// Creates a translator.
    pub fn new(index: &'a SearchIndex) -> Self {
        Self { index }
    }

    /// Lowers a description to an engine query against `default_key`.
    ///
    /// `default_rewrite` applies to multi-term nodes that carry no
    /// per-node override.
    pub fn translate(
        &self,
        searcher: &Searcher,
        node: &QueryNode,
        default_key: &str,
        default_rewrite: Rewrite,
    ) -> Result<TranslatedQuery, IndexError> {
        let mut first_bound = None;
        let query = self
            .lower(searcher, node, default_key, default_rewrite, &mut first_bound)?
            .unwrap_or_else(|| Box::new(EmptyQuery));
        Ok(TranslatedQuery { query, first_bound })
    }

    /// Resolves the content field for a key.
    fn field_for(&self, key: &str) -> Result<Field, IndexError> {
        self.index
            .schema()
            .content_field(key)
            .ok_or_else(|| IndexError::UnknownField(key.to_string()))
    }

    /// Resolves a node's effective key: its field override or the default.
    fn effective_key(&self, node: &QueryNode, default_key: &str) -> String {
        match &node.field {
            Some(name) => format!("field:{name}"),
            None => default_key.to_string(),
        }
    }

    /// Tokenizes text through the key's analyzer.
    fn tokenize(&self, key: &str, text: &str) -> Result<Vec<String>, IndexError> {
        let mut analyzer = self.index.analyzer_for_key(key)?;
        Ok(analyzer::tokenize(&mut analyzer, text))
    }

    /// Recursive lowering. Returns `None` for constructs that match
    /// nothing (e.g. text that analyzes to zero tokens).
    fn lower(
        &self,
        searcher: &Searcher,
        node: &QueryNode,
        default_key: &str,
        default_rewrite: Rewrite,
        first_bound: &mut Option<u32>,
    ) -> Result<Option<Box<dyn Query>>, IndexError> {
        let key = self.effective_key(node, default_key);
        let field = self.field_for(&key)?;

        let lowered: Option<Box<dyn Query>> = match &node.kind {
            QueryKind::Term(text) => {
                let tokens = self.tokenize(&key, text)?;
                self.term_sequence_query(field, &tokens, 0)
            }
            QueryKind::Phrase {
                literal,
                parts,
                slop,
            } => match literal {
                Some(text) => {
                    let tokens = self.tokenize(&key, text)?;
                    self.term_sequence_query(field, &tokens, *slop)
                }
                None => self.phrase_parts_query(searcher, field, &key, parts, *slop)?,
            },
            QueryKind::Wildcard(pattern) => {
                Some(self.regex_query(field, &wildcard_to_regex(pattern), pattern)?)
            }
            QueryKind::Prefix(prefix) => {
                let pattern = format!("{}.*", regex_escape(prefix));
                Some(self.regex_query(field, &pattern, prefix)?)
            }
            QueryKind::Fuzzy { value, max_edits } => {
                let tokens = self.tokenize(&key, value)?;
                let token = tokens.into_iter().next();
                token.map(|token| {
                    let distance = max_edits.unwrap_or(MAX_FUZZY_DISTANCE).min(MAX_FUZZY_DISTANCE);
                    let term = Term::from_field_text(field, &token);
                    Box::new(FuzzyTermQuery::new(term, distance, true)) as Box<dyn Query>
                })
            }
            QueryKind::Regex(pattern) => Some(self.regex_query(field, pattern, pattern)?),
            QueryKind::Bool {
                clauses,
                min_should,
            } => self.bool_query(
                searcher,
                clauses,
                *min_should,
                &key,
                default_rewrite,
                first_bound,
            )?,
            QueryKind::Near {
                parts,
                slop,
                ordered,
            } => self.near_query(searcher, field, &key, parts, *slop, *ordered)?,
            QueryKind::First { inner, end } => {
                *first_bound = Some(first_bound.map_or(*end, |bound| bound.max(*end)));
                self.lower(searcher, inner, &key, default_rewrite, first_bound)?
            }
        };

        let Some(mut query) = lowered else {
            return Ok(None);
        };

        let is_multi_term = matches!(
            node.kind,
            QueryKind::Wildcard(_)
                | QueryKind::Prefix(_)
                | QueryKind::Fuzzy { .. }
                | QueryKind::Regex(_)
        );
        let rewrite = node.rewrite.unwrap_or(default_rewrite);
        if is_multi_term && rewrite == Rewrite::ConstantScore {
            query = Box::new(ConstScoreQuery::new(query, 1.0));
        }
        if let Some(boost) = node.boost {
            query = Box::new(BoostQuery::new(query, boost));
        }
        Ok(Some(query))
    }

    /// Builds a term or phrase query from an analyzed token sequence.
    fn term_sequence_query(
        &self,
        field: Field,
        tokens: &[String],
        slop: u32,
    ) -> Option<Box<dyn Query>> {
        match tokens {
            [] => None,
            [token] => {
                let term = Term::from_field_text(field, token);
                Some(Box::new(TermQuery::new(
                    term,
                    IndexRecordOption::WithFreqsAndPositions,
                )))
            }
            _ => {
                let offsetted: Vec<(usize, Term)> = tokens
                    .iter()
                    .enumerate()
                    .map(|(position, token)| (position, Term::from_field_text(field, token)))
                    .collect();
                Some(Box::new(PhraseQuery::new_with_offset_and_slop(
                    offsetted, slop,
                )))
            }
        }
    }

    /// Builds a regex query, mapping engine rejection to a typed error.
    fn regex_query(
        &self,
        field: Field,
        pattern: &str,
        source: &str,
    ) -> Result<Box<dyn Query>, IndexError> {
        let query =
            RegexQuery::from_pattern(pattern, field).map_err(|e| IndexError::InvalidQueryPattern {
                pattern: source.to_string(),
                message: e.to_string(),
            })?;
        Ok(Box::new(query))
    }

    /// Builds a phrase from explicit parts, expanding wildcard parts
    /// against the live term dictionary.
    fn phrase_parts_query(
        &self,
        searcher: &Searcher,
        field: Field,
        key: &str,
        parts: &[PhrasePart],
        slop: u32,
    ) -> Result<Option<Box<dyn Query>>, IndexError> {
        let alternatives = self.part_alternatives(searcher, field, key, parts)?;
        self.alternation_query(field, &alternatives, slop)
    }

    /// Expands phrase parts into per-position alternative term lists.
    fn part_alternatives(
        &self,
        searcher: &Searcher,
        field: Field,
        key: &str,
        parts: &[PhrasePart],
    ) -> Result<Vec<Vec<String>>, IndexError> {
        let mut positions: Vec<Vec<String>> = Vec::new();
        for part in parts {
            match part {
                PhrasePart::Term(text) => {
                    // A part may analyze to several tokens; each occupies
                    // its own position with a single alternative.
                    for token in self.tokenize(key, text)? {
                        positions.push(vec![token]);
                    }
                }
                PhrasePart::Wildcard(pattern) => {
                    let expanded = expand_regex(
                        searcher,
                        field,
                        &wildcard_to_regex(pattern),
                        pattern,
                    )?;
                    if expanded.is_empty() {
                        // An unexpandable position can never match.
                        return Ok(vec![]);
                    }
                    positions.push(expanded);
                }
            }
        }
        Ok(positions)
    }

    /// Builds the OR-of-phrases query for per-position alternatives.
    fn alternation_query(
        &self,
        field: Field,
        positions: &[Vec<String>],
        slop: u32,
    ) -> Result<Option<Box<dyn Query>>, IndexError> {
        if positions.is_empty() {
            return Ok(None);
        }
        let expansions = cartesian(positions, MAX_EXPANSIONS).ok_or_else(|| {
            IndexError::InvalidQueryPattern {
                pattern: format!("{positions:?}"),
                message: format!("phrase expands to more than {MAX_EXPANSIONS} variants"),
            }
        })?;
        let mut variants: Vec<Box<dyn Query>> = Vec::new();
        for sequence in &expansions {
            if let Some(query) = self.term_sequence_query(field, sequence, slop) {
                variants.push(query);
            }
        }
        match variants.len() {
            0 => Ok(None),
            1 => Ok(variants.pop()),
            _ => Ok(Some(Box::new(BooleanQuery::new(
                variants
                    .into_iter()
                    .map(|query| (EngineOccur::Should, query))
                    .collect(),
            )))),
        }
    }

    /// Lowers a boolean node.
    fn bool_query(
        &self,
        searcher: &Searcher,
        clauses: &[xtext_query::BoolClause],
        min_should: Option<usize>,
        key: &str,
        default_rewrite: Rewrite,
        first_bound: &mut Option<u32>,
    ) -> Result<Option<Box<dyn Query>>, IndexError> {
        let mut lowered: Vec<(EngineOccur, Box<dyn Query>)> = Vec::new();
        let mut positives = 0usize;
        for clause in clauses {
            let Some(query) =
                self.lower(searcher, &clause.node, key, default_rewrite, first_bound)?
            else {
                continue;
            };
            let occur = match clause.occur {
                Occur::Must => EngineOccur::Must,
                Occur::Should => EngineOccur::Should,
                Occur::MustNot => EngineOccur::MustNot,
            };
            if occur != EngineOccur::MustNot {
                positives += 1;
            }
            lowered.push((occur, query));
        }
        if lowered.is_empty() {
            return Ok(None);
        }
        // Pure negation needs a base set to exclude from.
        if positives == 0 {
            lowered.push((EngineOccur::Must, Box::new(AllQuery)));
        }
        let query: Box<dyn Query> = match min_should {
            Some(min) => Box::new(BooleanQuery::with_minimum_required_clauses(lowered, min)),
            None => Box::new(BooleanQuery::new(lowered)),
        };
        Ok(Some(query))
    }

    /// Lowers a `near` node to a slop phrase over its flattened terms.
    fn near_query(
        &self,
        searcher: &Searcher,
        field: Field,
        key: &str,
        parts: &[QueryNode],
        slop: u32,
        ordered: bool,
    ) -> Result<Option<Box<dyn Query>>, IndexError> {
        let mut positions: Vec<Vec<String>> = Vec::new();
        self.flatten_near_parts(searcher, field, key, parts, &mut positions)?;

        if !ordered && positions.len() == 2 {
            // Unordered pair: accept both orders.
            let reversed: Vec<Vec<String>> =
                vec![positions[1].clone(), positions[0].clone()];
            let forward = self.alternation_query(field, &positions, slop)?;
            let backward = self.alternation_query(field, &reversed, slop)?;
            return Ok(match (forward, backward) {
                (Some(a), Some(b)) => Some(Box::new(BooleanQuery::new(vec![
                    (EngineOccur::Should, a),
                    (EngineOccur::Should, b),
                ]))),
                (one, None) | (None, one) => one,
            });
        }
        self.alternation_query(field, &positions, slop)
    }

    /// Flattens near parts (terms, wildcards, nested nears) into
    /// per-position alternatives.
    fn flatten_near_parts(
        &self,
        searcher: &Searcher,
        field: Field,
        key: &str,
        parts: &[QueryNode],
        positions: &mut Vec<Vec<String>>,
    ) -> Result<(), IndexError> {
        for part in parts {
            match &part.kind {
                QueryKind::Term(text) => {
                    for token in self.tokenize(key, text)? {
                        positions.push(vec![token]);
                    }
                }
                QueryKind::Wildcard(pattern) => {
                    let expanded = expand_regex(
                        searcher,
                        field,
                        &wildcard_to_regex(pattern),
                        pattern,
                    )?;
                    if !expanded.is_empty() {
                        positions.push(expanded);
                    }
                }
                QueryKind::Near { parts: nested, .. } => {
                    self.flatten_near_parts(searcher, field, key, nested, positions)?;
                }
                other => {
                    return Err(IndexError::Search(format!(
                        "unsupported construct inside <near>: {other:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Collects the terms a highlighter must look for.
    ///
    /// Negated clauses contribute nothing; multi-term nodes are expanded
    /// against the live dictionary so the exact indexed terms are marked.
    pub fn collect_terms(
        &self,
        searcher: &Searcher,
        node: &QueryNode,
        default_key: &str,
    ) -> Result<TermsOfInterest, IndexError> {
        let mut interest = TermsOfInterest::default();
        self.collect_into(searcher, node, default_key, &mut interest)?;
        Ok(interest)
    }

    /// Recursive collection behind [`collect_terms`].
    ///
    /// [`collect_terms`]: Self::collect_terms
    fn collect_into(
        &self,
        searcher: &Searcher,
        node: &QueryNode,
        default_key: &str,
        interest: &mut TermsOfInterest,
    ) -> Result<(), IndexError> {
        let key = self.effective_key(node, default_key);
        let field = self.field_for(&key)?;
        match &node.kind {
            QueryKind::Term(text) => {
                let tokens = self.tokenize(&key, text)?;
                push_sequence(interest, tokens);
            }
            QueryKind::Phrase {
                literal, parts, ..
            } => match literal {
                Some(text) => {
                    let tokens = self.tokenize(&key, text)?;
                    push_sequence(interest, tokens);
                }
                None => {
                    let positions = self.part_alternatives(searcher, field, &key, parts)?;
                    if let Some(expansions) = cartesian(&positions, MAX_EXPANSIONS) {
                        for sequence in expansions {
                            push_sequence(interest, sequence);
                        }
                    }
                }
            },
            QueryKind::Wildcard(pattern) => {
                interest.terms.extend(expand_regex(
                    searcher,
                    field,
                    &wildcard_to_regex(pattern),
                    pattern,
                )?);
            }
            QueryKind::Prefix(prefix) => {
                let pattern = format!("{}.*", regex_escape(prefix));
                interest
                    .terms
                    .extend(expand_regex(searcher, field, &pattern, prefix)?);
            }
            QueryKind::Regex(pattern) => {
                interest
                    .terms
                    .extend(expand_regex(searcher, field, pattern, pattern)?);
            }
            QueryKind::Fuzzy { value, max_edits } => {
                let tokens = self.tokenize(&key, value)?;
                if let Some(token) = tokens.into_iter().next() {
                    let distance =
                        max_edits.unwrap_or(MAX_FUZZY_DISTANCE).min(MAX_FUZZY_DISTANCE);
                    interest
                        .terms
                        .extend(expand_fuzzy(searcher, field, &token, distance));
                    interest.terms.insert(token);
                }
            }
            QueryKind::Bool { clauses, .. } => {
                for clause in clauses {
                    if clause.occur == Occur::MustNot {
                        continue;
                    }
                    self.collect_into(searcher, &clause.node, &key, interest)?;
                }
            }
            QueryKind::Near { parts, .. } => {
                // Near terms are marked individually; only phrases get
                // full-sequence confirmation.
                for part in parts {
                    self.collect_into(searcher, part, &key, interest)?;
                }
            }
            QueryKind::First { inner, end } => {
                interest.first_bound =
                    Some(interest.first_bound.map_or(*end, |bound| bound.max(*end)));
                self.collect_into(searcher, inner, &key, interest)?;
            }
        }
        Ok(())
    }
}

/// Adds an analyzed token sequence as a term or phrase of interest.
fn push_sequence(interest: &mut TermsOfInterest, tokens: Vec<String>) {
    match tokens.len() {
        0 => {}
        1 => {
            let mut tokens = tokens;
            if let Some(token) = tokens.pop() {
                interest.terms.insert(token);
            }
        }
        _ => interest.phrases.push(tokens),
    }
}

/// Streams the term dictionary of every segment through a regex automaton.
fn expand_regex(
    searcher: &Searcher,
    field: Field,
    pattern: &str,
    source: &str,
) -> Result<Vec<String>, IndexError> {
    let mut expanded: Vec<String> = Vec::new();
    for segment_reader in searcher.segment_readers() {
        let automaton =
            tantivy_fst::Regex::new(pattern).map_err(|e| IndexError::InvalidQueryPattern {
                pattern: source.to_string(),
                message: e.to_string(),
            })?;
        let inverted = segment_reader
            .inverted_index(field)
            .map_err(|e| IndexError::search(&e))?;
        let mut stream = inverted
            .terms()
            .search(automaton)
            .into_stream()
            .map_err(|e| IndexError::Search(e.to_string()))?;
        while stream.advance() {
            if let Ok(term) = core::str::from_utf8(stream.key()) {
                if !expanded.iter().any(|existing| existing == term) {
                    expanded.push(term.to_string());
                }
                if expanded.len() > MAX_EXPANSIONS {
                    return Err(IndexError::InvalidQueryPattern {
                        pattern: source.to_string(),
                        message: format!("expands to more than {MAX_EXPANSIONS} terms"),
                    });
                }
            }
        }
    }
    Ok(expanded)
}

/// Streams the term dictionary through a Levenshtein automaton.
fn expand_fuzzy(searcher: &Searcher, field: Field, term: &str, distance: u8) -> Vec<String> {
    let builder = LevenshteinAutomatonBuilder::new(distance, true);
    let mut expanded = Vec::new();
    for segment_reader in searcher.segment_readers() {
        let Ok(inverted) = segment_reader.inverted_index(field) else {
            continue;
        };
        let dfa = LevenshteinDfa(builder.build_dfa(term));
        let Ok(mut stream) = inverted.terms().search(dfa).into_stream() else {
            continue;
        };
        while stream.advance() {
            if let Ok(matched) = core::str::from_utf8(stream.key())
                && !expanded.iter().any(|existing| existing == matched)
            {
                expanded.push(matched.to_string());
            }
        }
    }
    expanded
}

/// Translates a `*`/`?` glob into an anchored regex.
fn wildcard_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 8);
    for ch in pattern.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex_escape_char(other)),
        }
    }
    regex
}

/// Escapes a whole string for literal use in a regex.
fn regex_escape(text: &str) -> String {
    text.chars().map(regex_escape_char).collect()
}

/// Escapes one character for literal use in a regex.
fn regex_escape_char(ch: char) -> String {
    if ch.is_ascii_alphanumeric() {
        ch.to_string()
    } else {
        format!("\\{ch}")
    }
}

/// Cartesian product of per-position alternatives, bounded by `limit`.
fn cartesian(positions: &[Vec<String>], limit: usize) -> Option<Vec<Vec<String>>> {
    let mut total = 1usize;
    for alternatives in positions {
        total = total.checked_mul(alternatives.len().max(1))?;
        if total > limit {
            return None;
        }
    }
    let mut sequences: Vec<Vec<String>> = vec![Vec::new()];
    for alternatives in positions {
        let mut next = Vec::with_capacity(sequences.len() * alternatives.len().max(1));
        for sequence in &sequences {
            for alternative in alternatives {
                let mut extended = sequence.clone();
                extended.push(alternative.clone());
                next.push(extended);
            }
        }
        sequences = next;
    }
    Some(sequences)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_translation() {
        assert_eq!(wildcard_to_regex("data*"), "data.*");
        assert_eq!(wildcard_to_regex("te?t"), "te.t");
        assert_eq!(wildcard_to_regex("a.b"), "a\\.b");
    }

    #[test]
    fn regex_escape_is_literal() {
        assert_eq!(regex_escape("a+b"), "a\\+b");
        assert_eq!(regex_escape("plain"), "plain");
    }

    #[test]
    fn cartesian_expansion() {
        let positions = vec![
            vec!["a".to_string()],
            vec!["b".to_string(), "c".to_string()],
        ];
        let expanded = cartesian(&positions, 10).unwrap();
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0], vec!["a", "b"]);
        assert_eq!(expanded[1], vec!["a", "c"]);
    }

    #[test]
    fn cartesian_respects_the_limit() {
        let many: Vec<String> = (0..20).map(|n| n.to_string()).collect();
        let positions = vec![many.clone(), many];
        assert!(cartesian(&positions, 100).is_none());
    }

    #[test]
    fn push_sequence_routes_by_length() {
        let mut interest = TermsOfInterest::default();
        push_sequence(&mut interest, vec![]);
        push_sequence(&mut interest, vec!["one".to_string()]);
        push_sequence(&mut interest, vec!["two".to_string(), "three".to_string()]);
        assert!(interest.terms.contains("one"));
        assert_eq!(interest.phrases.len(), 1);
    }
}
