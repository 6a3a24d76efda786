//! Writer and reader lifecycle management.
//!
//! One [`CommitManager`] owns the single logical writer and the reader for
//! a physical index. Sessions borrow the writer through [`with_writer`],
//! which serializes access and marks the manager dirty; the writer itself
//! is never closed between sessions. [`commit`] is a no-op unless dirty and
//! runs the pre/post commit hooks around the engine commit. Readers are
//! refreshed on demand and handed out as immutable snapshots, so in-flight
//! queries are unaffected by concurrent commits.
//!
//! [`with_writer`]: CommitManager::with_writer
//! [`commit`]: CommitManager::commit

use std::sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher};

use crate::error::IndexError;

/// Heap size handed to the engine writer (50 MB).
const WRITER_HEAP_SIZE: usize = 50_000_000;

/// Hooks run around a real commit.
///
/// The default implementation does nothing; owners of auxiliary structures
/// flush them in `pre_commit`.
pub trait CommitHooks: Send + Sync {
    /// Runs before the engine commit.
    fn pre_commit(&self) -> Result<(), IndexError> {
        Ok(())
    }

    /// Runs after a successful engine commit.
    fn post_commit(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

/// The no-op hook set.
struct NoHooks;

impl CommitHooks for NoHooks {}

/// Owns the writer/reader pair of one physical index.
pub struct CommitManager {
    /// The single logical writer, serialized by the lock.
    writer: Mutex<IndexWriter>,
    /// Reader with manual reload; refreshed on demand.
    reader: IndexReader,
    /// True if uncommitted writes exist.
    dirty: AtomicBool,
    /// Commit hooks.
    hooks: Box<dyn CommitHooks>,
}

impl CommitManager {
    /// Creates a manager for an opened index.
    pub fn new(index: &Index) -> Result<Self, IndexError> {
        let writer = index
            .writer(WRITER_HEAP_SIZE)
            .map_err(|e| IndexError::write(&e))?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| IndexError::search(&e))?;
        Ok(Self {
            writer: Mutex::new(writer),
            reader,
            dirty: AtomicBool::new(false),
            hooks: Box::new(NoHooks),
        })
    }

    /// Replaces the commit hooks.
    pub fn set_hooks(&mut self, hooks: Box<dyn CommitHooks>) {
        self.hooks = hooks;
    }

    /// Runs `op` with exclusive access to the writer.
    ///
    /// The manager is marked dirty when `op` succeeds; releasing the writer
    /// never closes it.
    pub fn with_writer<T>(
        &self,
        op: impl FnOnce(&mut IndexWriter) -> Result<T, IndexError>,
    ) -> Result<T, IndexError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| IndexError::Write("writer lock poisoned".to_string()))?;
        let result = op(&mut writer)?;
        self.dirty.store(true, Ordering::SeqCst);
        Ok(result)
    }

    /// True if uncommitted writes exist.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Commits pending writes if any exist.
    ///
    /// Returns true if a real commit ran. Runs `pre_commit` before and
    /// `post_commit` after the engine commit, then refreshes the reader.
    pub fn commit(&self) -> Result<bool, IndexError> {
        if !self.is_dirty() {
            return Ok(false);
        }
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| IndexError::Commit("writer lock poisoned".to_string()))?;
        self.hooks.pre_commit()?;
        writer.commit().map_err(|e| IndexError::commit(&e))?;
        self.hooks.post_commit()?;
        self.dirty.store(false, Ordering::SeqCst);
        self.reader.reload().map_err(|e| IndexError::search(&e))?;
        Ok(true)
    }

    /// Discards uncommitted writes.
    pub fn rollback(&self) -> Result<(), IndexError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| IndexError::Commit("writer lock poisoned".to_string()))?;
        writer.rollback().map_err(|e| IndexError::commit(&e))?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Runs `op` against a refreshed, consistent searcher snapshot.
    ///
    /// The snapshot is released when `op` returns, even on error.
    pub fn with_searcher<T>(
        &self,
        op: impl FnOnce(&Searcher) -> Result<T, IndexError>,
    ) -> Result<T, IndexError> {
        self.reader.reload().map_err(|e| IndexError::search(&e))?;
        let searcher = self.reader.searcher();
        op(&searcher)
    }
}
