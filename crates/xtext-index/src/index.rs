//! The index handle.
//!
//! A [`SearchIndex`] ties together one physical engine index, the
//! configuration its schema was derived from, and the commit manager that
//! serializes writes. Indexing sessions and queries both go through it.

use std::{fs, path::Path, sync::Arc};

use tantivy::directory::MmapDirectory;
use tantivy::schema::Term;
use tantivy::tokenizer::TextAnalyzer;
use tantivy::Index;
use xtext_config::{IndexConfiguration, Settings};
use xtext_document::{DocId, Document};

use crate::{
    analyzer,
    commit::CommitManager,
    error::IndexError,
    eval::{Evaluator, PathEvaluator},
    schema::IndexSchema,
    session::{IndexingSession, ReindexMode},
};

/// One physical index plus the configuration it was derived from.
pub struct SearchIndex {
    /// The engine index handle.
    engine: Index,
    /// The active configuration.
    config: Arc<IndexConfiguration>,
    /// Schema derived from the configuration.
    schema: IndexSchema,
    /// Writer/reader lifecycle.
    commit: CommitManager,
    /// Expression evaluation capability.
    evaluator: Arc<dyn Evaluator>,
    /// Eager-flush threshold for buffered session text.
    buffer_limit: usize,
    /// Default result limit for queries.
    default_limit: usize,
}

impl SearchIndex {
    /// Opens or creates an index at `path` for a configuration.
    ///
    /// The schema is derived from the configuration, so an existing index
    /// must have been created from an equivalent configuration; callers
    /// compare stored configuration hashes before reopening.
    pub fn open(
        path: &Path,
        config: Arc<IndexConfiguration>,
        settings: &Settings,
    ) -> Result<Self, IndexError> {
        let schema = IndexSchema::for_configuration(&config)?;
        fs::create_dir_all(path)?;
        let dir = MmapDirectory::open(path).map_err(|e| {
            let err: tantivy::TantivyError = e.into();
            IndexError::open_index(path.to_path_buf(), &err)
        })?;
        let index = Index::open_or_create(dir, schema.schema().clone())
            .map_err(|e| IndexError::open_index(path.to_path_buf(), &e))?;
        Self::from_engine_index(index, schema, config, settings)
    }

    /// Creates a transient in-memory index. Used by tests and tooling.
    pub fn in_memory(
        config: Arc<IndexConfiguration>,
        settings: &Settings,
    ) -> Result<Self, IndexError> {
        let schema = IndexSchema::for_configuration(&config)?;
        let index = Index::create_in_ram(schema.schema().clone());
        Self::from_engine_index(index, schema, config, settings)
    }

    /// Shared construction once an engine index exists.
    fn from_engine_index(
        index: Index,
        schema: IndexSchema,
        config: Arc<IndexConfiguration>,
        settings: &Settings,
    ) -> Result<Self, IndexError> {
        schema.register_tokenizers(&index)?;
        let commit = CommitManager::new(&index)?;
        Ok(Self {
            engine: index,
            config,
            schema,
            commit,
            evaluator: Arc::new(PathEvaluator),
            buffer_limit: settings.settings.buffer_limit,
            default_limit: settings.settings.default_limit,
        })
    }

    /// The engine index handle.
    pub(crate) fn engine(&self) -> &Index {
        &self.engine
    }

    /// The active configuration.
    pub fn configuration(&self) -> &Arc<IndexConfiguration> {
        &self.config
    }

    /// The derived schema.
    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// The commit manager.
    pub fn commit_manager(&self) -> &CommitManager {
        &self.commit
    }

    /// The default result limit.
    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// The eager-flush threshold.
    pub fn buffer_limit(&self) -> usize {
        self.buffer_limit
    }

    /// The expression evaluation capability.
    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }

    /// Replaces the expression evaluator.
    pub fn set_evaluator(&mut self, evaluator: Arc<dyn Evaluator>) {
        self.evaluator = evaluator;
    }

    /// Starts an indexing session for one document-processing pass.
    pub fn session<'a>(
        &'a self,
        document: &'a Document,
        mode: ReindexMode,
    ) -> IndexingSession<'a> {
        IndexingSession::new(self, document, mode)
    }

    /// Builds the query/highlight analyzer for a content field key.
    pub fn analyzer_for_key(&self, key: &str) -> Result<TextAnalyzer, IndexError> {
        let kind = self
            .schema
            .analyzer_kind(key)
            .ok_or_else(|| IndexError::UnknownField(key.to_string()))?;
        analyzer::build_analyzer(kind)
    }

    /// Deletes every entry belonging to a document.
    pub fn remove_document(&self, doc: DocId) -> Result<(), IndexError> {
        self.commit.with_writer(|writer| {
            writer.delete_term(Term::from_field_u64(self.schema.doc_id, u64::from(doc.0)));
            Ok(())
        })
    }

    /// Deletes every entry keyed by a resource URI.
    ///
    /// Binary resources are not addressed by node id, so their entries are
    /// removed by URI term alone.
    pub fn remove_binary(&self, uri: &str) -> Result<(), IndexError> {
        self.commit.with_writer(|writer| {
            writer.delete_term(Term::from_field_text(self.schema.uri, uri));
            Ok(())
        })
    }

    /// Number of committed entries.
    pub fn num_entries(&self) -> Result<u64, IndexError> {
        self.commit.with_searcher(|searcher| Ok(searcher.num_docs()))
    }
}
