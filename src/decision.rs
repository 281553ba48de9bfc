//! Whether an artifact needs to be written.
//!
//! JSON records are compared structurally against what is already stored, so
//! re-running for the same date and content is a no-op. Images are always
//! rewritten: rendering is not byte-stable across runs and a stale image is
//! worse than a redundant commit.

use crate::models::{PublishableRecord, strip_timestamps};
use crate::store::{Revision, StoredFile};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Stored content is equivalent; do nothing.
    Skip,
    /// Write, overwriting `revision` if present, creating otherwise.
    Write { revision: Option<Revision> },
}

impl Decision {
    /// The revision to write against; `None` for a create or a skip.
    pub fn into_revision(self) -> Option<Revision> {
        match self {
            Decision::Skip => None,
            Decision::Write { revision } => revision,
        }
    }
}

/// Decide for a JSON record given whatever is currently stored at its path.
///
/// Content is compared as JSON values with `createdAt` and `updatedAt`
/// removed, so key order and timestamps never force a write.
///
/// # Arguments
///
/// * `candidate` - The freshly transformed record
/// * `existing` - The stored file at the record's path, if any
///
/// # Returns
///
/// * `Write { revision: None }` when nothing is stored
/// * `Skip` when the stored record is equivalent
/// * `Write { revision: Some(..) }` otherwise, including unparseable content
///
/// # Examples
///
/// ```ignore
/// assert_eq!(decide_json(&record, None), Decision::Write { revision: None });
/// ```
pub fn decide_json(candidate: &PublishableRecord, existing: Option<&StoredFile>) -> Decision {
    let Some(existing) = existing else {
        debug!(date = %candidate.date, "No existing record; creating");
        return Decision::Write { revision: None };
    };

    let stored: Value = match serde_json::from_slice(&existing.content) {
        Ok(mut value) => {
            strip_timestamps(&mut value);
            value
        }
        Err(e) => {
            warn!(date = %candidate.date, error = %e, "Existing record is not valid JSON; overwriting");
            return Decision::Write {
                revision: Some(existing.revision.clone()),
            };
        }
    };

    if stored == candidate.content_value() {
        Decision::Skip
    } else {
        Decision::Write {
            revision: Some(existing.revision.clone()),
        }
    }
}

/// Images are always written; the existing revision is carried for overwrite.
pub fn decide_image(existing: Option<&StoredFile>) -> Decision {
    Decision::Write {
        revision: existing.map(|f| f.revision.clone()),
    }
}

/// The `createdAt` of a stored record, if it has one.
pub fn existing_created_at(existing: Option<&StoredFile>) -> Option<String> {
    let value: Value = serde_json::from_slice(&existing?.content).ok()?;
    value.get("createdAt")?.as_str().map(str::to_string)
}
