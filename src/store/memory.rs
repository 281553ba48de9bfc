//! In-memory store for tests. Records every write it accepts.

use super::{RemoteStore, Revision, StoredFile, validate_path};
use crate::error::StoreError;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// One accepted write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WriteCall {
    pub(crate) path: String,
    pub(crate) content: Vec<u8>,
    pub(crate) revision: Option<Revision>,
}

pub(crate) struct MemoryStore {
    files: RefCell<HashMap<String, StoredFile>>,
    writes: RefCell<Vec<WriteCall>>,
    next_revision: Cell<u32>,
    forced_conflicts: Cell<u32>,
    pub(crate) reads: Cell<u32>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::with_files(Vec::<(&str, Vec<u8>)>::new())
    }

    /// Pre-populate files; revisions are `seed-0`, `seed-1`, …
    pub(crate) fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, Vec<u8>)>) -> Self {
        let files = files
            .into_iter()
            .enumerate()
            .map(|(i, (path, content))| {
                let path = validate_path(path)
                    .unwrap_or_else(|_| panic!("MemoryStore::with_files: invalid path {path}"));
                (
                    path.to_string(),
                    StoredFile {
                        content,
                        revision: Revision(format!("seed-{i}")),
                    },
                )
            })
            .collect();
        Self {
            files: RefCell::new(files),
            writes: RefCell::new(Vec::new()),
            next_revision: Cell::new(1),
            forced_conflicts: Cell::new(0),
            reads: Cell::new(0),
        }
    }

    /// Make the next `n` writes fail with a conflict, as if another writer
    /// got there first.
    pub(crate) fn fail_next_writes(&self, n: u32) {
        self.forced_conflicts.set(n);
    }

    pub(crate) fn writes(&self) -> Vec<WriteCall> {
        self.writes.borrow().clone()
    }

    pub(crate) fn writes_to(&self, path: &str) -> Vec<WriteCall> {
        self.writes
            .borrow()
            .iter()
            .filter(|w| w.path == path)
            .cloned()
            .collect()
    }

    pub(crate) fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(path).map(|f| f.content.clone())
    }
}

impl RemoteStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read(&self, path: &str) -> Result<Option<StoredFile>, StoreError> {
        self.reads.set(self.reads.get() + 1);
        Ok(self.files.borrow().get(validate_path(path)?).cloned())
    }

    async fn write(
        &self,
        path: &str,
        content: &[u8],
        revision: Option<&Revision>,
        _message: &str,
    ) -> Result<Revision, StoreError> {
        let path = validate_path(path)?;
        let conflict = || StoreError::Conflict {
            path: path.to_string(),
        };

        let forced = self.forced_conflicts.get();
        if forced > 0 {
            self.forced_conflicts.set(forced - 1);
            return Err(conflict());
        }

        let mut files = self.files.borrow_mut();
        let current = files.get(path).map(|f| &f.revision);
        if current != revision {
            return Err(conflict());
        }

        let n = self.next_revision.get();
        self.next_revision.set(n + 1);
        let new_revision = Revision(format!("rev-{n}"));
        files.insert(
            path.to_string(),
            StoredFile {
                content: content.to_vec(),
                revision: new_revision.clone(),
            },
        );
        self.writes.borrow_mut().push(WriteCall {
            path: path.to_string(),
            content: content.to_vec(),
            revision: revision.cloned(),
        });
        Ok(new_revision)
    }
}
