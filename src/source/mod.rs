use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;
use walkdir::WalkDir;

/// A source of new drop files. The ingestion core never depends on where the
/// files physically live; a local directory stands in during tests and a
/// transfer-protocol client can satisfy the same contract in production.
pub trait FileSource {
    /// Lists candidate file identifiers, filtered and deterministically sorted.
    fn list(&self) -> io::Result<Vec<String>>;

    /// Fetches the raw bytes for one identifier.
    fn fetch(&self, id: &str) -> io::Result<Vec<u8>>;

    /// Acknowledges a fully consumed file upstream. Local sources have
    /// nothing to acknowledge.
    fn ack(&self, _id: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Local-directory adapter: walks the drop directory recursively, keeps files
/// whose extension is in the accepted set, and drops anything matching an
/// exclude pattern.
pub struct LocalDirSource {
    root: PathBuf,
    extensions: Vec<String>,
    excludes: Vec<glob::Pattern>,
}

impl LocalDirSource {
    pub fn new(
        root: impl Into<PathBuf>,
        extensions: &[String],
        exclude_patterns: &[String],
    ) -> Result<Self, glob::PatternError> {
        let mut excludes = Vec::with_capacity(exclude_patterns.len());
        for pattern in exclude_patterns {
            let raw = pattern.trim();
            if raw.is_empty() {
                continue;
            }
            excludes.push(glob::Pattern::new(raw)?);
        }
        Ok(Self {
            root: root.into(),
            extensions: extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            excludes,
        })
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.excludes.iter().any(|p| p.matches_path(path)) {
            return false;
        }
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|accepted| *accepted == ext)
            })
    }
}

impl FileSource for LocalDirSource {
    fn list(&self) -> io::Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("drop directory `{}` does not exist", self.root.display()),
            ));
        }

        let mut out = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .map(|entry| entry.path().to_path_buf())
            .filter(|path| path.is_file() && self.accepts(path))
            .map(|path| path.to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        out.sort();
        info!("found {} candidate files under {}", out.len(), self.root.display());
        Ok(out)
    }

    fn fetch(&self, id: &str) -> io::Result<Vec<u8>> {
        fs::read(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn lists_only_accepted_extensions_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("b.csv"), "x").expect("seed");
        fs::write(dir.path().join("a.json"), "x").expect("seed");
        fs::write(dir.path().join("c.txt"), "x").expect("seed");

        let source = LocalDirSource::new(
            dir.path(),
            &["csv".to_string(), ".json".to_string()],
            &[],
        )
        .expect("valid source");
        let ids = source.list().expect("list");
        assert_eq!(ids.len(), 2);
        assert!(ids[0].ends_with("a.json"));
        assert!(ids[1].ends_with("b.csv"));
    }

    #[test]
    fn honors_exclude_patterns() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("keep.csv"), "x").expect("seed");
        fs::write(dir.path().join("ignore.csv"), "x").expect("seed");

        let source = LocalDirSource::new(
            dir.path(),
            &["csv".to_string()],
            &["**/ignore*".to_string()],
        )
        .expect("valid source");
        let ids = source.list().expect("list");
        assert_eq!(ids.len(), 1);
        assert!(ids[0].ends_with("keep.csv"));
    }

    #[test]
    fn fetch_returns_file_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.csv");
        fs::write(&path, b"payload").expect("seed");

        let source = LocalDirSource::new(dir.path(), &[], &[]).expect("valid source");
        let bytes = source.fetch(&path.to_string_lossy()).expect("fetch");
        assert_eq!(bytes, b"payload");
    }

    #[test]
    fn missing_drop_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source =
            LocalDirSource::new(dir.path().join("absent"), &[], &[]).expect("valid source");
        assert!(source.list().is_err());
    }
}
