//! Command-line interface definitions.
//!
//! Every option can also come from an environment variable or the optional
//! YAML file given with `--config`. Defaults are applied in
//! [`Config::resolve`](crate::config::Config::resolve), not here, so that a
//! value from the file is not shadowed by a CLI default.

use crate::retry::Backoff;
use crate::validate::ValidationPolicy;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Retry delay growth, as selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

impl BackoffKind {
    /// Exponential growth is capped at eight times the base delay.
    pub fn to_backoff(self, base: std::time::Duration) -> Backoff {
        match self {
            BackoffKind::Fixed => Backoff::Fixed,
            BackoffKind::Exponential => Backoff::Exponential {
                max: base.saturating_mul(8),
            },
        }
    }
}

/// Fetch the daily digest, render it and publish both artifacts.
///
/// # Examples
///
/// ```sh
/// # Publish to GitHub (token and repository from the environment)
/// GITHUB_TOKEN=... GITHUB_REPOSITORY=octo/digest daily_digest
///
/// # Only publish once upstream has rolled over to today
/// daily_digest --require-today
///
/// # Publish into a local directory and see what would change
/// daily_digest --local-root ./site --public-base-url https://digest.example.com --dry-run
/// ```
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional YAML config file; flags and environment take precedence
    #[arg(short, long, env = "DIGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Upstream digest API endpoint
    #[arg(long, env = "DIGEST_ENDPOINT")]
    pub endpoint: Option<String>,

    /// GitHub access token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Target repository as `owner/name`
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repo: Option<String>,

    /// Target branch [default: main]
    #[arg(long, env = "GITHUB_BRANCH")]
    pub branch: Option<String>,

    /// GitHub API base URL [default: https://api.github.com]
    #[arg(long, env = "GITHUB_API_URL")]
    pub github_api: Option<String>,

    /// Store directory for JSON records [default: data]
    #[arg(long, env = "DIGEST_JSON_DIR")]
    pub json_dir: Option<String>,

    /// Store directory for images [default: images]
    #[arg(long, env = "DIGEST_IMAGE_DIR")]
    pub image_dir: Option<String>,

    /// Publish into this directory instead of GitHub
    #[arg(long, env = "DIGEST_LOCAL_ROOT")]
    pub local_root: Option<PathBuf>,

    /// Public URL prefix the store is served from
    #[arg(long, env = "DIGEST_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Validation policy for the upstream payload [default: strict]
    #[arg(long, env = "DIGEST_VALIDATION", value_enum)]
    pub policy: Option<ValidationPolicy>,

    /// Only publish if upstream's date equals this date (YYYY-MM-DD)
    #[arg(long, conflicts_with = "require_today")]
    pub expect_date: Option<NaiveDate>,

    /// Only publish if upstream's date is today in the publishing timezone
    #[arg(long)]
    pub require_today: bool,

    /// Publishing timezone as hours east of UTC [default: 8]
    #[arg(long, env = "DIGEST_UTC_OFFSET", allow_hyphen_values = true)]
    pub utc_offset_hours: Option<i32>,

    /// Keep a local copy of every validated digest here
    #[arg(long, env = "DIGEST_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Custom HTML template for the image
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Chrome/Chromium binary to use
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Run Chrome without its sandbox (needed in some containers)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Render deadline in seconds [default: 30]
    #[arg(long)]
    pub render_timeout_secs: Option<u64>,

    /// Upstream request timeout in seconds [default: 10]
    #[arg(long)]
    pub fetch_timeout_secs: Option<u64>,

    /// Upstream fetch attempts, including the first [default: 3]
    #[arg(long)]
    pub fetch_attempts: Option<u32>,

    /// Delay between fetch attempts in seconds [default: 2]
    #[arg(long)]
    pub fetch_delay_secs: Option<u64>,

    /// Delay growth between fetch attempts [default: fixed]
    #[arg(long, value_enum)]
    pub fetch_backoff: Option<BackoffKind>,

    /// Random extra delay per retry, in milliseconds [default: 0]
    #[arg(long)]
    pub fetch_jitter_ms: Option<u64>,

    /// Read and decide, but do not write anything to the store
    #[arg(long)]
    pub dry_run: bool,
}
