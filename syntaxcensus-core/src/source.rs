//! Collaborator seams for discovery and content retrieval.

use std::future::Future;
use std::pin::Pin;

use crate::domain::{FileEntry, RepositoryRecord};
use crate::error::SourceError;

/// Boxed future returned by collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type for collaborator calls.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Finds candidate repositories and fetches their manifests.
pub trait DiscoverySource: Send + Sync {
    /// Run one discovery query. Zero results is `Ok(vec![])`.
    fn discover<'a>(&'a self, query: &'a str) -> BoxFuture<'a, SourceResult<Vec<RepositoryRecord>>>;

    /// Fetch a manifest file; `SourceError::NotFound` when absent.
    fn fetch_manifest<'a>(
        &'a self,
        identity: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, SourceResult<String>>;
}

/// Lists and reads files of a repository.
pub trait ContentSource: Send + Sync {
    /// List every file in the repository.
    fn fetch_file_tree<'a>(
        &'a self,
        record: &'a RepositoryRecord,
    ) -> BoxFuture<'a, SourceResult<Vec<FileEntry>>>;

    /// Read one file; `Ok(None)` when the file cannot be retrieved as text.
    fn fetch_file_content<'a>(
        &'a self,
        record: &'a RepositoryRecord,
        path: &'a str,
    ) -> BoxFuture<'a, SourceResult<Option<String>>>;
}
