//! Construction of engine analyzers from configured kinds.
//!
//! The configuration layer validates analyzer kinds; this module maps each
//! kind onto a tantivy tokenizer pipeline:
//!
//! - `standard`: `SimpleTokenizer` + `LowerCaser` + `RemoveLongFilter`
//! - `lowercase`: same pipeline as `standard`
//! - `whitespace`: `WhitespaceTokenizer`, case preserved
//! - `keyword`: `RawTokenizer`, the whole input is one token
//! - `stemmer`: `standard` plus a language `Stemmer`

use tantivy::tokenizer::{
    Language, LowerCaser, RawTokenizer, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer,
    WhitespaceTokenizer,
};
use xtext_config::AnalyzerKind;

use crate::error::IndexError;

/// Maximum token length in bytes before filtering.
const MAX_TOKEN_LENGTH: usize = 40;

/// Maps a validated stemmer language name onto the engine's `Language`.
pub fn engine_language(name: &str) -> Result<Language, IndexError> {
    match name {
        "arabic" => Ok(Language::Arabic),
        "danish" => Ok(Language::Danish),
        "dutch" => Ok(Language::Dutch),
        "english" => Ok(Language::English),
        "finnish" => Ok(Language::Finnish),
        "french" => Ok(Language::French),
        "german" => Ok(Language::German),
        "greek" => Ok(Language::Greek),
        "hungarian" => Ok(Language::Hungarian),
        "italian" => Ok(Language::Italian),
        "norwegian" => Ok(Language::Norwegian),
        "portuguese" => Ok(Language::Portuguese),
        "romanian" => Ok(Language::Romanian),
        "russian" => Ok(Language::Russian),
        "spanish" => Ok(Language::Spanish),
        "swedish" => Ok(Language::Swedish),
        "tamil" => Ok(Language::Tamil),
        "turkish" => Ok(Language::Turkish),
        other => Err(IndexError::Config(
            xtext_config::ConfigError::InvalidLanguage(other.to_string()),
        )),
    }
}

/// Builds the analyzer pipeline for a configured kind.
pub fn build_analyzer(kind: &AnalyzerKind) -> Result<TextAnalyzer, IndexError> {
    let analyzer = match kind {
        AnalyzerKind::Standard | AnalyzerKind::Lowercase => {
            TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(LowerCaser)
                .filter(RemoveLongFilter::limit(MAX_TOKEN_LENGTH))
                .build()
        }
        AnalyzerKind::Whitespace => {
            TextAnalyzer::builder(WhitespaceTokenizer::default()).build()
        }
        AnalyzerKind::Keyword => TextAnalyzer::builder(RawTokenizer::default()).build(),
        AnalyzerKind::Stemmer { language } => {
            let language = engine_language(language)?;
            TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(LowerCaser)
                .filter(RemoveLongFilter::limit(MAX_TOKEN_LENGTH))
                .filter(Stemmer::new(language))
                .build()
        }
    };
    Ok(analyzer)
}

/// The tokenizer registration name for an analyzer kind.
///
/// Fields sharing a kind share the registered tokenizer.
pub fn tokenizer_name(kind: &AnalyzerKind) -> String {
    format!("xtext_{}", kind.key().replace(':', "_"))
}

/// Collects the token texts an analyzer produces for `text`.
pub fn tokenize(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while let Some(token) = stream.next() {
        tokens.push(token.text.clone());
    }
    tokens
}
