//! Directory-backed store, for publishing into a checked-out repository or a
//! static web root. The revision marker is the SHA-256 of the file content.

use super::{RemoteStore, Revision, StoredFile, validate_path};
use crate::error::StoreError;
use crate::utils::ensure_writable_dir;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, instrument};

#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    name: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = format!("local:{}", root.display());
        Self { root, name }
    }

    /// Like [`LocalStore::new`], but fail up front if `root` cannot be
    /// created or written to.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(root);
        ensure_writable_dir(&store.root)
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
        Ok(store)
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(validate_path(path)?))
    }
}

/// Lowercase hex SHA-256 of `content`.
pub fn content_revision(content: &[u8]) -> Revision {
    Revision(format!("{:x}", Sha256::digest(content)))
}

impl RemoteStore for LocalStore {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(level = "info", skip(self), fields(store = %self.name))]
    async fn read(&self, path: &str) -> Result<Option<StoredFile>, StoreError> {
        let full = self.resolve(path)?;
        match fs::read(&full).await {
            Ok(content) => {
                let revision = content_revision(&content);
                debug!(bytes = content.len(), %revision, "Read artifact");
                Ok(Some(StoredFile { content, revision }))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(level = "info", skip(self, content), fields(store = %self.name, bytes = content.len()))]
    async fn write(
        &self,
        path: &str,
        content: &[u8],
        revision: Option<&Revision>,
        message: &str,
    ) -> Result<Revision, StoreError> {
        let full = self.resolve(path)?;
        let current = self.read(path).await?.map(|f| f.revision);
        if current.as_ref() != revision {
            debug!(?current, expected = ?revision, "Revision mismatch");
            return Err(StoreError::Conflict {
                path: path.to_string(),
            });
        }

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Write beside the target and rename so readers never see a torn file.
        let staging = full.with_extension("partial");
        fs::write(&staging, content).await?;
        fs::rename(&staging, &full).await?;

        let revision = content_revision(content);
        info!(%revision, commit_message = message, "Wrote artifact");
        Ok(revision)
    }
}
