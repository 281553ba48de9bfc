//! The idempotent publish pipeline.
//!
//! One run, strictly in order, aborting on the first failure:
//!
//! 1. fetch the upstream digest (bounded retry)
//! 2. validate it under the configured policy
//! 3. apply the date gate
//! 4. archive it to the local cache, if configured
//! 5. transform it into the published JSON record
//! 6. write the record unless an equivalent one is already stored
//! 7. render the image and always overwrite it
//!
//! Writes use compare-and-swap: a stale revision marker makes the store
//! report a conflict, and the step re-reads and decides again, up to
//! [`CAS_ROUNDS`] times.

use crate::config::Config;
use crate::decision::{Decision, decide_image, decide_json, existing_created_at};
use crate::error::{PipelineError, StoreError};
use crate::fetch::{DigestSource, fetch_digest};
use crate::models::{DigestRecord, PublishableRecord};
use crate::outputs::json as cache;
use crate::render::ImageRenderer;
use crate::retry::{RetryPolicy, retry};
use crate::store::{RemoteStore, Revision};
use crate::transform::transform;
use crate::utils::timestamp;
use crate::validate::{check_date, validate};
use chrono::{DateTime, FixedOffset};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Read-decide-write rounds per artifact before a conflict is fatal.
pub const CAS_ROUNDS: u32 = 3;

/// What happened to the JSON record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonOutcome {
    /// An equivalent record was already stored.
    Unchanged,
    Created(Revision),
    Updated(Revision),
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub date: String,
    pub json: JsonOutcome,
    pub image_revision: Revision,
    pub image_bytes: usize,
}

pub struct Pipeline<'a, F, R, S> {
    config: &'a Config,
    source: F,
    renderer: R,
    store: S,
}

impl<'a, F, R, S> Pipeline<'a, F, R, S>
where
    F: DigestSource,
    R: ImageRenderer,
    S: RemoteStore,
{
    pub fn new(config: &'a Config, source: F, renderer: R, store: S) -> Self {
        Self {
            config,
            source,
            renderer,
            store,
        }
    }

    /// Execute one run. `now` fixes "today" and the write timestamps.
    #[instrument(level = "info", skip_all, fields(store = %self.store.name()))]
    pub async fn run(&self, now: DateTime<FixedOffset>) -> Result<RunReport, PipelineError> {
        let t0 = Instant::now();
        let today = now.date_naive();

        let raw = fetch_digest(&self.source, &self.config.fetch_retry).await?;
        let record = validate(raw, self.config.policy, today).inspect_err(|e| {
            warn!(missing = ?e.missing_fields(), error = %e, "Upstream digest rejected");
        })?;
        check_date(&record, self.config.date_gate.expected(today))?;
        info!(date = %record.date, items = record.news_items.len(), "Digest accepted");

        if let Some(dir) = &self.config.cache_dir {
            archive(&record, dir).await;
        }

        let candidate = transform(&record, &self.config.targets);
        let stamp = timestamp(&now);
        let json = self.publish_json(&candidate, &stamp).await?;

        let png = self.renderer.render(&record).await?;
        let image_revision = self.publish_image(&record.date, &png).await?;

        info!(
            date = %record.date,
            json = ?json,
            image_bytes = png.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Run complete"
        );
        Ok(RunReport {
            date: record.date,
            json,
            image_revision,
            image_bytes: png.len(),
        })
    }

    async fn publish_json(&self, candidate: &PublishableRecord, stamp: &str) -> Result<JsonOutcome, StoreError> {
        let path = self.config.targets.json_path(&candidate.date);
        retry(&cas_policy(), "publish record", StoreError::is_conflict, |round| {
            self.publish_json_once(&path, candidate, stamp, round)
        })
        .await
    }

    #[instrument(level = "debug", skip(self, candidate, stamp))]
    async fn publish_json_once(
        &self,
        path: &str,
        candidate: &PublishableRecord,
        stamp: &str,
        round: u32,
    ) -> Result<JsonOutcome, StoreError> {
        let existing = self.store.read(path).await?;
        let revision = match decide_json(candidate, existing.as_ref()) {
            Decision::Skip => {
                info!(path, "Record unchanged; skipping write");
                return Ok(JsonOutcome::Unchanged);
            }
            Decision::Write { revision } => revision,
        };

        let record = candidate
            .clone()
            .stamped(existing_created_at(existing.as_ref()), stamp);
        let body = record.to_pretty_json().map_err(|source| StoreError::Encode {
            path: path.to_string(),
            source,
        })?;
        let message = match revision {
            Some(_) => format!("Update digest for {}", candidate.date),
            None => format!("Add digest for {}", candidate.date),
        };

        let new_revision = self.store.write(path, &body, revision.as_ref(), &message).await?;
        Ok(match revision {
            Some(_) => {
                info!(path, %new_revision, "Record updated");
                JsonOutcome::Updated(new_revision)
            }
            None => {
                info!(path, %new_revision, "Record created");
                JsonOutcome::Created(new_revision)
            }
        })
    }

    async fn publish_image(&self, date: &str, png: &[u8]) -> Result<Revision, StoreError> {
        let path = self.config.targets.image_path(date);
        let message = format!("Update digest image for {date}");
        retry(&cas_policy(), "publish image", StoreError::is_conflict, |round| {
            let (path, message) = (&path, &message);
            async move {
                let existing = self.store.read(path).await?;
                let revision = decide_image(existing.as_ref()).into_revision();
                debug!(path, round, overwrite = revision.is_some(), "Writing image");
                self.store.write(path, png, revision.as_ref(), message).await
            }
        })
        .await
    }
}

fn cas_policy() -> RetryPolicy {
    RetryPolicy::fixed(CAS_ROUNDS, Duration::ZERO)
}

/// Best-effort local archive; failures are logged, never fatal.
async fn archive(record: &DigestRecord, dir: &Path) {
    match cache::read_record(dir, &record.date).await {
        Ok(Some(cached)) if &cached == record => {
            debug!(date = %record.date, "Upstream unchanged since the last cached run");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Could not read cached record"),
    }
    if let Err(e) = cache::write_record(record, dir).await {
        warn!(error = %e, dir = %dir.display(), "Failed to cache digest record; continuing");
    }
}
