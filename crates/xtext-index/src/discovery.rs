//! Document discovery for directory-based collections.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Finds the XML documents under `root`, sorted by path.
///
/// Hidden directories (including the local index directory) are skipped.
pub fn discover_documents(root: &Path) -> Vec<PathBuf> {
    let mut documents: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || entry
                    .file_name()
                    .to_str()
                    .is_none_or(|name| !name.starts_with('.'))
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        })
        .collect();
    documents.sort();
    documents
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    #[test]
    fn finds_xml_files_recursively_and_sorted() {
        let temp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("b.xml"), "<b/>").unwrap();
        fs::write(temp.path().join("sub/a.xml"), "<a/>").unwrap();
        fs::write(temp.path().join("notes.txt"), "skip").unwrap();

        let found = discover_documents(temp.path());
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("b.xml"));
        assert!(found[1].ends_with("sub/a.xml"));
    }

    #[test]
    fn hidden_directories_are_skipped() {
        let temp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".xtext-index")).unwrap();
        fs::write(temp.path().join(".xtext-index/stray.xml"), "<x/>").unwrap();
        fs::write(temp.path().join("real.xml"), "<x/>").unwrap();

        let found = discover_documents(temp.path());
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("real.xml"));
    }
}
