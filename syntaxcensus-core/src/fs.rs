//! Filesystem abstractions for analyzing local checkouts.

use std::path::{Path, PathBuf};

use crate::domain::{FileEntry, RepositoryRecord};
use crate::error::{Result, SourceError};
use crate::source::{BoxFuture, ContentSource, SourceResult};

/// Abstraction over filesystem access for testability.
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem {
    /// List all files reachable from the root path.
    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>>;
    /// Size of a file in bytes.
    fn file_size(&self, path: &Path) -> Result<u64>;
    /// Read a file into a string.
    fn read_to_string(&self, path: &Path) -> Result<String>;
}

/// Default filesystem implementation backed by `std::fs`.
#[derive(Debug, Default, Clone)]
pub struct StdFileSystem;

impl StdFileSystem {
    /// Create a new standard filesystem adapter.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for StdFileSystem {
    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if is_hidden(&path) {
                    continue;
                }
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Content source over checkouts stored as `<root>/<full_name>`.
#[derive(Debug, Clone)]
pub struct LocalContent<F: FileSystem> {
    fs: F,
    root: PathBuf,
}

impl<F: FileSystem> LocalContent<F> {
    /// Serve checkouts below `root`.
    pub fn new(fs: F, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    /// Directory holding the checkout of `record`.
    pub fn checkout_dir(&self, record: &RepositoryRecord) -> PathBuf {
        self.root.join(&record.full_name)
    }

    fn tree(&self, record: &RepositoryRecord) -> SourceResult<Vec<FileEntry>> {
        let dir = self.checkout_dir(record);
        let files = self
            .fs
            .list_files(&dir)
            .map_err(|err| local_error(&dir, err))?;
        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let Ok(relative) = file.strip_prefix(&dir) else {
                continue;
            };
            let size = self.fs.file_size(&file).map_err(|err| local_error(&file, err))?;
            entries.push(FileEntry {
                path: to_slash_path(relative),
                size,
            });
        }
        Ok(entries)
    }

    fn content(&self, record: &RepositoryRecord, path: &str) -> Option<String> {
        let file = self.checkout_dir(record).join(path);
        match self.fs.read_to_string(&file) {
            Ok(contents) => Some(contents),
            Err(err) => {
                log::debug!("skipping unreadable file {}: {err}", file.display());
                None
            }
        }
    }
}

impl<F: FileSystem + Send + Sync> ContentSource for LocalContent<F> {
    fn fetch_file_tree<'a>(
        &'a self,
        record: &'a RepositoryRecord,
    ) -> BoxFuture<'a, SourceResult<Vec<FileEntry>>> {
        Box::pin(async move { self.tree(record) })
    }

    fn fetch_file_content<'a>(
        &'a self,
        record: &'a RepositoryRecord,
        path: &'a str,
    ) -> BoxFuture<'a, SourceResult<Option<String>>> {
        Box::pin(async move { Ok(self.content(record, path)) })
    }
}

fn local_error(path: &Path, err: crate::error::CensusError) -> SourceError {
    match err {
        crate::error::CensusError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            SourceError::NotFound
        }
        other => SourceError::Transport(format!("{}: {other}", path.display())),
    }
}

fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
