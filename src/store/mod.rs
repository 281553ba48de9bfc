//! Artifact storage behind a narrow read / conditional-write interface.
//!
//! | Backend | Module | Revision marker |
//! |---------|--------|-----------------|
//! | GitHub contents API | [`github`] | blob `sha` |
//! | Local directory | [`local`] | SHA-256 of the content |
//! | Dry run decorator | [`dry_run`] | placeholder |
//!
//! Reads return `Ok(None)` for an absent file. Writes without a revision
//! create; writes with one overwrite only if it is still current, otherwise
//! they fail with [`StoreError::Conflict`].

pub mod dry_run;
pub mod github;
pub mod local;
#[cfg(test)]
pub(crate) mod memory;

use crate::error::StoreError;
use std::fmt;

/// Opaque token identifying the stored version of a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(pub String);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file as it currently exists in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub content: Vec<u8>,
    pub revision: Revision,
}

/// Read-modify-write access to published artifacts.
pub trait RemoteStore {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    async fn read(&self, path: &str) -> Result<Option<StoredFile>, StoreError>;

    /// Create (`revision == None`) or conditionally overwrite a file and
    /// return its new revision.
    async fn write(
        &self,
        path: &str,
        content: &[u8],
        revision: Option<&Revision>,
        message: &str,
    ) -> Result<Revision, StoreError>;
}

impl<T: RemoteStore> RemoteStore for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn read(&self, path: &str) -> Result<Option<StoredFile>, StoreError> {
        (**self).read(path).await
    }

    async fn write(
        &self,
        path: &str,
        content: &[u8],
        revision: Option<&Revision>,
        message: &str,
    ) -> Result<Revision, StoreError> {
        (**self).write(path, content, revision, message).await
    }
}

/// Reject empty, absolute or traversing store paths.
pub fn validate_path(path: &str) -> Result<&str, StoreError> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if invalid {
        Err(StoreError::InvalidPath(path.to_string()))
    } else {
        Ok(path)
    }
}
