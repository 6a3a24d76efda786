//! Configuration hash for index versioning.
//!
//! The schema is derived from the rule document, so an index created under
//! one configuration cannot be reopened under another. A hash of
//! everything that affects indexing is stored beside the index; a mismatch
//! on open means the index must be rebuilt.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::{fs, io};

use siphasher::sip::SipHasher24;
use xtext_config::{IndexConfiguration, Settings};

/// Current schema version. Bump when entry field definitions change.
pub const SCHEMA_VERSION: u32 = 1;

/// Name of the stored hash file inside the index directory.
const HASH_FILENAME: &str = "config_hash";

/// The inputs that require a rebuild when they change.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct IndexingFingerprint {
    /// Schema version.
    pub schema_version: u32,
    /// The serialized rule document.
    pub rules: String,
    /// Stemming language of the default analyzer.
    pub stemmer: String,
}

impl IndexingFingerprint {
    /// Extracts the fingerprint of a configuration and settings pair.
    pub fn of(config: &IndexConfiguration, settings: &Settings) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            rules: config.source().to_string(),
            stemmer: settings.search.stemmer.clone(),
        }
    }

    /// The fingerprint as a 16-digit hex string.
    pub fn hash_string(&self) -> String {
        let mut hasher = SipHasher24::new();
        self.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

/// Computes the stored-hash value for a configuration.
pub fn compute_config_hash(config: &IndexConfiguration, settings: &Settings) -> String {
    IndexingFingerprint::of(config, settings).hash_string()
}

/// Path of the stored hash inside an index directory.
pub fn hash_path(index_dir: &Path) -> PathBuf {
    index_dir.join(HASH_FILENAME)
}

/// Writes the configuration hash beside the index.
pub fn write_config_hash(index_dir: &Path, hash: &str) -> io::Result<()> {
    fs::write(hash_path(index_dir), hash)
}

/// Reads the stored hash, or `None` if the index carries none.
pub fn read_stored_hash(index_dir: &Path) -> Option<String> {
    fs::read_to_string(hash_path(index_dir))
        .ok()
        .map(|content| content.trim().to_string())
}

/// True if the stored hash differs from the configuration's, meaning the
/// index must be rebuilt before use.
pub fn needs_rebuild(
    index_dir: &Path,
    config: &IndexConfiguration,
    settings: &Settings,
) -> bool {
    match read_stored_hash(index_dir) {
        Some(stored) => stored != compute_config_hash(config, settings),
        None => true,
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use xtext_document::{DocId, parse_document};

    use super::*;

    fn config(xml: &str) -> Arc<IndexConfiguration> {
        let doc = parse_document(DocId(0), "/conf", xml).unwrap();
        Arc::new(IndexConfiguration::parse(&doc.root).unwrap())
    }

    #[test]
    fn same_inputs_same_hash() {
        let settings = Settings::default();
        let a = compute_config_hash(&config(r#"<fulltext><text qname="p"/></fulltext>"#), &settings);
        let b = compute_config_hash(&config(r#"<fulltext><text qname="p"/></fulltext>"#), &settings);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn rule_change_changes_hash() {
        let settings = Settings::default();
        let a = compute_config_hash(&config(r#"<fulltext><text qname="p"/></fulltext>"#), &settings);
        let b = compute_config_hash(
            &config(r#"<fulltext><text qname="head"/></fulltext>"#),
            &settings,
        );
        assert_ne!(a, b);
    }

    #[test]
    fn stemmer_change_changes_hash() {
        let config = config(r#"<fulltext><text qname="p"/></fulltext>"#);
        let english = Settings::default();
        let mut german = Settings::default();
        german.search.stemmer = "german".to_string();
        assert_ne!(
            compute_config_hash(&config, &english),
            compute_config_hash(&config, &german)
        );
    }

    #[test]
    fn stored_hash_round_trip_and_rebuild_detection() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = config(r#"<fulltext><text qname="p"/></fulltext>"#);
        let settings = Settings::default();

        assert!(needs_rebuild(temp.path(), &config, &settings));

        let hash = compute_config_hash(&config, &settings);
        write_config_hash(temp.path(), &hash).unwrap();
        assert_eq!(read_stored_hash(temp.path()).as_deref(), Some(hash.as_str()));
        assert!(!needs_rebuild(temp.path(), &config, &settings));

        let mut changed = Settings::default();
        changed.search.stemmer = "french".to_string();
        assert!(needs_rebuild(temp.path(), &config, &changed));
    }
}
