//! Local JSON archive of validated digests.
//!
//! One file per date, overwritten on every run:
//! ```text
//! cache_dir/
//! ├── 2024-01-01.json
//! └── 2024-01-02.json
//! ```

use crate::models::DigestRecord;
use crate::utils::ensure_writable_dir;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// Write `record` to `{cache_dir}/{date}.json` and return the path.
#[instrument(level = "info", skip_all, fields(cache_dir = %cache_dir.display(), date = %record.date))]
pub async fn write_record(
    record: &DigestRecord,
    cache_dir: &Path,
) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
    let json = serde_json::to_vec_pretty(record)?;
    ensure_writable_dir(cache_dir).await?;

    let path = cache_dir.join(format!("{}.json", record.date));
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Cached digest record");
    Ok(path)
}

/// Read a previously cached record, if any.
pub async fn read_record(
    cache_dir: &Path,
    date: &str,
) -> Result<Option<DigestRecord>, Box<dyn Error + Send + Sync>> {
    let path = cache_dir.join(format!("{date}.json"));
    match fs::read(&path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
