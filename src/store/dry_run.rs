//! A store decorator that reads for real and only pretends to write.

use super::{RemoteStore, Revision, StoredFile};
use crate::error::StoreError;
use tracing::{info, instrument};

/// Revision returned for every skipped write.
pub const DRY_RUN_REVISION: &str = "dry-run";

#[derive(Debug)]
pub struct DryRunStore<S> {
    inner: S,
}

impl<S: RemoteStore> DryRunStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: RemoteStore> RemoteStore for DryRunStore<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn read(&self, path: &str) -> Result<Option<StoredFile>, StoreError> {
        self.inner.read(path).await
    }

    #[instrument(level = "info", skip(self, content), fields(store = %self.inner.name()))]
    async fn write(
        &self,
        path: &str,
        content: &[u8],
        revision: Option<&Revision>,
        message: &str,
    ) -> Result<Revision, StoreError> {
        info!(
            bytes = content.len(),
            overwrite = revision.is_some(),
            commit_message = message,
            "Dry run; write skipped"
        );
        Ok(Revision(DRY_RUN_REVISION.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn test_reads_pass_through_and_writes_are_dropped() {
        let inner = MemoryStore::with_files([("data/a.json", b"{}".to_vec())]);
        let store = DryRunStore::new(inner);

        assert!(store.read("data/a.json").await.unwrap().is_some());
        let rev = store.write("data/b.json", b"x", None, "m").await.unwrap();
        assert_eq!(rev.0, DRY_RUN_REVISION);

        assert!(store.read("data/b.json").await.unwrap().is_none());
        assert!(store.inner.writes().is_empty());
    }
}
