//! Startup configuration.
//!
//! Values are layered: command-line flag or environment variable (via
//! [`Cli`]), then the optional YAML file, then built-in defaults. The result
//! is validated once; components receive their part of [`Config`] in their
//! constructors and never read the environment themselves.
//!
//! ```yaml
//! # digest.yaml
//! repo: octo/digest
//! branch: main
//! json_dir: data
//! image_dir: images
//! policy: lenient
//! utc_offset_hours: 8
//! ```

use crate::cli::{BackoffKind, Cli};
use crate::error::ConfigError;
use crate::fetch::UpstreamConfig;
use crate::models::Targets;
use crate::render::RenderConfig;
use crate::retry::RetryPolicy;
use crate::store::github::{DEFAULT_API_BASE, GitHubConfig};
use crate::validate::ValidationPolicy;
use chrono::{FixedOffset, NaiveDate};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_ENDPOINT: &str = "https://60s.viki.moe/v2/60s";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_JSON_DIR: &str = "data";
pub const DEFAULT_IMAGE_DIR: &str = "images";
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 8;
const DEFAULT_REFERER: &str = "https://60s.viki.moe/";
const STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// The YAML file layer. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub endpoint: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub github_api: Option<String>,
    pub json_dir: Option<String>,
    pub image_dir: Option<String>,
    pub local_root: Option<PathBuf>,
    pub public_base_url: Option<String>,
    pub policy: Option<ValidationPolicy>,
    pub require_today: Option<bool>,
    pub utc_offset_hours: Option<i32>,
    pub cache_dir: Option<PathBuf>,
    pub template: Option<PathBuf>,
    pub chrome_path: Option<PathBuf>,
    pub no_sandbox: Option<bool>,
    pub render_timeout_secs: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
    pub fetch_attempts: Option<u32>,
    pub fetch_delay_secs: Option<u64>,
    pub fetch_backoff: Option<BackoffKind>,
    pub fetch_jitter_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file_err = |reason: String| ConfigError::File {
            path: path.display().to_string(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| file_err(e.to_string()))?;
        serde_yaml::from_str(&text).map_err(|e| file_err(e.to_string()))
    }
}

/// Where artifacts are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    GitHub(GitHubConfig),
    Local { root: PathBuf },
}

/// Which upstream date is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateGate {
    Off,
    Today,
    Exactly(NaiveDate),
}

impl DateGate {
    /// The concrete expected date, given today's date.
    pub fn expected(self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            DateGate::Off => None,
            DateGate::Today => Some(today),
            DateGate::Exactly(date) => Some(date),
        }
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub fetch_retry: RetryPolicy,
    pub policy: ValidationPolicy,
    pub date_gate: DateGate,
    pub utc_offset: FixedOffset,
    pub targets: Targets,
    pub store: StoreConfig,
    pub render: RenderConfig,
    pub cache_dir: Option<PathBuf>,
    pub dry_run: bool,
}

impl Config {
    /// Load the file named by `--config`, if any, and resolve.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => {
                info!(path = %path.display(), "Loading config file");
                FileConfig::load(path)?
            }
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    /// Merge the CLI/env layer over the file layer over defaults.
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let endpoint = cli
            .endpoint
            .or(file.endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let endpoint = url::Url::parse(&endpoint)
            .map_err(|e| ConfigError::Invalid {
                key: "endpoint",
                reason: e.to_string(),
            })?
            .to_string();

        let branch = cli
            .branch
            .or(file.branch)
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        let json_dir = cli
            .json_dir
            .or(file.json_dir)
            .unwrap_or_else(|| DEFAULT_JSON_DIR.to_string());
        let image_dir = cli
            .image_dir
            .or(file.image_dir)
            .unwrap_or_else(|| DEFAULT_IMAGE_DIR.to_string());
        let repo = cli.repo.or(file.repo);
        let local_root = cli.local_root.or(file.local_root);

        let (store, default_public) = match local_root {
            Some(root) => (StoreConfig::Local { root }, None),
            None => {
                let repo = repo.ok_or(ConfigError::Missing("repo"))?;
                let (owner, name) = split_repo(&repo)?;
                let token = cli
                    .github_token
                    .filter(|t| !t.trim().is_empty())
                    .ok_or(ConfigError::Missing("github_token"))?;
                let public = format!("https://raw.githubusercontent.com/{owner}/{name}/{branch}");
                let github = GitHubConfig {
                    api_base: cli
                        .github_api
                        .or(file.github_api)
                        .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                    token,
                    owner: owner.to_string(),
                    repo: name.to_string(),
                    branch: branch.clone(),
                    timeout: STORE_TIMEOUT,
                };
                (StoreConfig::GitHub(github), Some(public))
            }
        };

        let public_base_url = cli
            .public_base_url
            .or(file.public_base_url)
            .or(default_public)
            .ok_or(ConfigError::Missing("public_base_url"))?;
        let public_base_url = public_base_url.trim_end_matches('/').to_string();
        let targets = Targets {
            json_base_url: join_url(&public_base_url, &json_dir),
            image_base_url: join_url(&public_base_url, &image_dir),
            json_dir,
            image_dir,
        };

        let hours = cli
            .utc_offset_hours
            .or(file.utc_offset_hours)
            .unwrap_or(DEFAULT_UTC_OFFSET_HOURS);
        let utc_offset = hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::Invalid {
                key: "utc_offset_hours",
                reason: format!("{hours} is outside -23..=23"),
            })?;

        let date_gate = match (cli.expect_date, cli.require_today || file.require_today.unwrap_or(false)) {
            (Some(date), _) => DateGate::Exactly(date),
            (None, true) => DateGate::Today,
            (None, false) => DateGate::Off,
        };

        let fetch_delay = Duration::from_secs(cli.fetch_delay_secs.or(file.fetch_delay_secs).unwrap_or(2));
        let fetch_retry = RetryPolicy {
            max_attempts: cli.fetch_attempts.or(file.fetch_attempts).unwrap_or(3),
            delay: fetch_delay,
            backoff: cli
                .fetch_backoff
                .or(file.fetch_backoff)
                .unwrap_or(BackoffKind::Fixed)
                .to_backoff(fetch_delay),
            jitter: Duration::from_millis(cli.fetch_jitter_ms.or(file.fetch_jitter_ms).unwrap_or(0)),
        };
        if fetch_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "fetch_attempts",
                reason: "must be at least 1".to_string(),
            });
        }

        let upstream = UpstreamConfig {
            endpoint,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            referer: DEFAULT_REFERER.to_string(),
            timeout: Duration::from_secs(cli.fetch_timeout_secs.or(file.fetch_timeout_secs).unwrap_or(10)),
        };

        let render = RenderConfig {
            template: cli.template.or(file.template),
            chrome_path: cli.chrome_path.or(file.chrome_path),
            timeout: Duration::from_secs(cli.render_timeout_secs.or(file.render_timeout_secs).unwrap_or(30)),
            sandbox: !(cli.no_sandbox || file.no_sandbox.unwrap_or(false)),
            ..RenderConfig::default()
        };

        let config = Config {
            upstream,
            fetch_retry,
            policy: cli.policy.or(file.policy).unwrap_or_default(),
            date_gate,
            utc_offset,
            targets,
            store,
            render,
            cache_dir: cli.cache_dir.or(file.cache_dir),
            dry_run: cli.dry_run,
        };
        debug!(?config, "Resolved configuration");
        Ok(config)
    }
}

fn split_repo(repo: &str) -> Result<(&str, &str), ConfigError> {
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(ConfigError::Invalid {
            key: "repo",
            reason: format!("expected `owner/name`, got `{repo}`"),
        }),
    }
}

fn join_url(base: &str, dir: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{dir}")
    }
}
