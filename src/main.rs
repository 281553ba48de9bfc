//! # Daily Digest
//!
//! Fetches the daily news digest from an upstream JSON API, validates it,
//! and publishes two artifacts per day to a content store: a normalized JSON
//! record and a PNG rendering of it produced by headless Chrome.
//!
//! Runs are idempotent. The JSON record is only written when its content
//! changed; the image is always refreshed. Writes are compare-and-swap, so
//! concurrent runs cannot silently clobber each other.
//!
//! ## Usage
//!
//! ```sh
//! GITHUB_TOKEN=... daily_digest --repo octo/digest --require-today
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetch**: GET the upstream envelope with bounded retry
//! 2. **Validate**: strict or lenient checks, then the optional date gate
//! 3. **Transform**: add the public image and source URLs
//! 4. **Publish JSON**: skip when unchanged, else create or update
//! 5. **Render and publish image**: always overwrite

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod decision;
mod error;
mod fetch;
mod models;
mod outputs;
mod pipeline;
mod render;
mod retry;
mod store;
mod transform;
mod utils;
mod validate;

use cli::Cli;
use config::{Config, StoreConfig};
use error::PipelineError;
use fetch::HttpSource;
use pipeline::{JsonOutcome, Pipeline, RunReport};
use render::ChromeRenderer;
use store::dry_run::DryRunStore;
use store::github::GitHubStore;
use store::local::LocalStore;
use store::RemoteStore;
use utils::{ensure_writable_dir, now_in};

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "daily_digest starting up");

    let args = Cli::parse();
    debug!(config = ?args.config, repo = ?args.repo, local_root = ?args.local_root, dry_run = args.dry_run, "Parsed CLI arguments");

    let result = run(args).await;
    let elapsed = start_time.elapsed();
    match result {
        Ok(report) => {
            let json = match &report.json {
                JsonOutcome::Unchanged => "unchanged".to_string(),
                JsonOutcome::Created(rev) => format!("created {rev}"),
                JsonOutcome::Updated(rev) => format!("updated {rev}"),
            };
            info!(
                date = %report.date,
                json = %json,
                image = %report.image_revision,
                secs = elapsed.as_secs(),
                millis = elapsed.subsec_millis(),
                "Execution complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(
                error = %e,
                secs = elapsed.as_secs(),
                millis = elapsed.subsec_millis(),
                "Execution failed"
            );
            ExitCode::FAILURE
        }
    }
}

#[instrument(level = "debug", skip_all)]
async fn run(args: Cli) -> Result<RunReport, PipelineError> {
    let config = Config::from_cli(args)?;
    info!(
        endpoint = %config.upstream.endpoint,
        policy = ?config.policy,
        gate = ?config.date_gate,
        dry_run = config.dry_run,
        "Configuration resolved"
    );

    // Early check: a cache dir we cannot write to only costs us the cache
    if let Some(dir) = &config.cache_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            warn!(path = %dir.display(), error = %e, "Cache directory is not writable; records will not be cached");
        }
    }

    let source = HttpSource::new(&config.upstream)?;
    let renderer = ChromeRenderer::new(config.render.clone())?;

    match &config.store {
        StoreConfig::GitHub(github) => {
            info!(repo = %format!("{}/{}", github.owner, github.repo), branch = %github.branch, "Publishing to GitHub");
            let store = GitHubStore::new(github)?;
            publish(&config, source, renderer, store).await
        }
        StoreConfig::Local { root } => {
            info!(root = %root.display(), "Publishing to local directory");
            let store = if config.dry_run {
                LocalStore::new(root.clone())
            } else {
                LocalStore::open(root.clone()).await.inspect_err(|e| {
                    error!(path = %root.display(), error = %e, "Local store root is not writable");
                })?
            };
            publish(&config, source, renderer, store).await
        }
    }
}

async fn publish<S: RemoteStore>(
    config: &Config,
    source: HttpSource,
    renderer: ChromeRenderer,
    store: S,
) -> Result<RunReport, PipelineError> {
    let now = now_in(config.utc_offset);
    if config.dry_run {
        Pipeline::new(config, source, renderer, DryRunStore::new(store))
            .run(now)
            .await
    } else {
        Pipeline::new(config, source, renderer, store).run(now).await
    }
}
