//! The closed analyzer registry.
//!
//! Analyzers are declared in the rule document by `kind`, a closed set of
//! supported pipelines. Unknown names are a load-time [`ConfigError`]
//! rather than a runtime construction failure. A handful of well-known
//! legacy class names are accepted as aliases so existing rule documents
//! keep loading.

use std::collections::HashMap;

use crate::error::ConfigError;

/// A supported analyzer pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnalyzerKind {
    /// Tokenize on word boundaries, lowercase.
    Standard,
    /// Tokenize on whitespace only, keep case.
    Whitespace,
    /// The whole input is one token.
    Keyword,
    /// Tokenize on word boundaries, lowercase, no stemming cut-off changes.
    Lowercase,
    /// Tokenize, lowercase, and stem for a language.
    Stemmer {
        /// The stemming language, one of the supported language names.
        language: String,
    },
}

impl AnalyzerKind {
    /// Resolves a `kind` attribute value, with its optional `language`.
    pub fn from_kind(kind: &str, language: Option<&str>) -> Result<Self, ConfigError> {
        match kind {
            "standard" => Ok(Self::Standard),
            "whitespace" => Ok(Self::Whitespace),
            "keyword" => Ok(Self::Keyword),
            "lowercase" => Ok(Self::Lowercase),
            "stemmer" => {
                let language = language.unwrap_or("english");
                Ok(Self::Stemmer {
                    language: parse_stemmer_language(language)?.to_string(),
                })
            }
            other => Err(ConfigError::UnknownAnalyzer(other.to_string())),
        }
    }

    /// Maps a legacy `class` attribute value onto a kind.
    ///
    /// Only the class names that appeared in rule documents in the wild are
    /// recognized; anything else is an error.
    pub fn from_class_name(class: &str) -> Result<Self, ConfigError> {
        let simple = class.rsplit('.').next().unwrap_or(class);
        match simple {
            "StandardAnalyzer" => Ok(Self::Standard),
            "WhitespaceAnalyzer" => Ok(Self::Whitespace),
            "KeywordAnalyzer" => Ok(Self::Keyword),
            "SimpleAnalyzer" => Ok(Self::Lowercase),
            "EnglishAnalyzer" => Ok(Self::Stemmer {
                language: "english".to_string(),
            }),
            _ => Err(ConfigError::UnknownAnalyzer(class.to_string())),
        }
    }

    /// A stable string form, used for field registration and config hashing.
    pub fn key(&self) -> String {
        match self {
            Self::Standard => "standard".to_string(),
            Self::Whitespace => "whitespace".to_string(),
            Self::Keyword => "keyword".to_string(),
            Self::Lowercase => "lowercase".to_string(),
            Self::Stemmer { language } => format!("stemmer:{language}"),
        }
    }
}

/// The stemmer languages the engine supports.
const STEMMER_LANGUAGES: [&str; 18] = [
    "arabic",
    "danish",
    "dutch",
    "english",
    "finnish",
    "french",
    "german",
    "greek",
    "hungarian",
    "italian",
    "norwegian",
    "portuguese",
    "romanian",
    "russian",
    "spanish",
    "swedish",
    "tamil",
    "turkish",
];

/// Validates a stemmer language name, returning its canonical form.
pub fn parse_stemmer_language(name: &str) -> Result<&'static str, ConfigError> {
    let lower = name.to_lowercase();
    STEMMER_LANGUAGES
        .iter()
        .find(|&&candidate| candidate == lower)
        .copied()
        .ok_or_else(|| ConfigError::InvalidLanguage(name.to_string()))
}

/// Declared analyzers, keyed by id, plus the default.
#[derive(Debug, Clone)]
pub struct AnalyzerRegistry {
    /// Analyzers by declared id.
    by_id: HashMap<String, AnalyzerKind>,
    /// The analyzer used when a rule names none.
    default: AnalyzerKind,
}

impl AnalyzerRegistry {
    /// Creates a registry with the given default analyzer.
    pub fn new(default: AnalyzerKind) -> Self {
        Self {
            by_id: HashMap::new(),
            default,
        }
    }

    /// Declares an analyzer under an id.
    pub fn declare(&mut self, id: &str, kind: AnalyzerKind) -> Result<(), ConfigError> {
        if self.by_id.insert(id.to_string(), kind).is_some() {
            return Err(ConfigError::DuplicateAnalyzerId(id.to_string()));
        }
        Ok(())
    }

    /// Looks up a declared analyzer.
    pub fn get(&self, id: &str) -> Result<&AnalyzerKind, ConfigError> {
        self.by_id
            .get(id)
            .ok_or_else(|| ConfigError::UndeclaredAnalyzer(id.to_string()))
    }

    /// The default analyzer.
    pub fn default_kind(&self) -> &AnalyzerKind {
        &self.default
    }

    /// Resolves an optional analyzer id to a kind, falling back to the
    /// default.
    pub fn resolve(&self, id: Option<&str>) -> Result<&AnalyzerKind, ConfigError> {
        match id {
            Some(id) => self.get(id),
            None => Ok(&self.default),
        }
    }

    /// All declared (id, kind) pairs, in arbitrary order.
    pub fn declared(&self) -> impl Iterator<Item = (&str, &AnalyzerKind)> {
        self.by_id.iter().map(|(id, kind)| (id.as_str(), kind))
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new(AnalyzerKind::Stemmer {
            language: "english".to_string(),
        })
    }
}
