//! Error types for every stage of the publish pipeline.
//!
//! Each stage owns its own error enum so callers can tell a transient upstream
//! hiccup from a broken payload or a lost-update conflict. [`PipelineError`]
//! wraps them all for the top-level run.

use std::time::Duration;

/// Failure to retrieve the digest from the upstream API.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The server answered with a non-success HTTP status.
    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },

    /// The envelope carried a non-200 `code`.
    #[error("upstream reported code {code}: {message}")]
    Upstream { code: i64, message: String },

    /// Connection, TLS, timeout or body read failure.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The body was not the JSON we expected.
    #[error("upstream payload is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("upstream payload has no `data` object")]
    MissingData,
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Status { .. } | FetchError::Upstream { .. } | FetchError::Transport(_)
        )
    }
}

/// The upstream payload is malformed or incomplete.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Strict policy only. Every missing field is named, and a malformed
    /// `news` is reported alongside them.
    #[error("{}", describe_rejection(.missing, *.news_malformed))]
    Rejected {
        missing: Vec<&'static str>,
        news_malformed: bool,
    },

    #[error("invalid date `{0}`, expected YYYY-MM-DD")]
    InvalidDate(String),
}

impl ValidationError {
    /// Names of the missing fields, empty for date format errors.
    pub fn missing_fields(&self) -> &[&'static str] {
        match self {
            ValidationError::Rejected { missing, .. } => missing,
            ValidationError::InvalidDate(_) => &[],
        }
    }
}

fn describe_rejection(missing: &[&'static str], news_malformed: bool) -> String {
    let mut parts = Vec::new();
    if news_malformed {
        parts.push("`news` must be an array of strings".to_string());
    }
    if !missing.is_empty() {
        parts.push(format!("missing required fields: {}", missing.join(", ")));
    }
    parts.join("; ")
}

/// Upstream has not published the expected day yet (or has moved past it).
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("upstream digest is dated {actual}, expected {expected}")]
pub struct DateMismatchError {
    pub expected: String,
    pub actual: String,
}

/// Failure to produce the PNG.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render did not finish within {0:?}")]
    Timeout(Duration),

    /// The page settled its completion promise with an error.
    #[error("page reported a render failure: {0}")]
    Page(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("template is missing the `{0}` placeholder")]
    Template(&'static str),

    #[error("render task aborted: {0}")]
    Aborted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not serialize record for the page: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure talking to the artifact store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The revision marker was stale, or a create hit an existing file.
    #[error("revision conflict on `{path}`")]
    Conflict { path: String },

    #[error("store returned HTTP {status} for `{path}`: {message}")]
    Status {
        status: u16,
        path: String,
        message: String,
    },

    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected store response: {0}")]
    Decode(String),

    #[error("could not encode `{path}`: {source}")]
    Encode {
        path: String,
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid store path `{0}`")]
    InvalidPath(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Startup configuration is incomplete or malformed.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("could not read config file `{path}`: {reason}")]
    File { path: String, reason: String },
}

/// Any failure that aborts a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    DateMismatch(#[from] DateMismatchError),

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("publish failed: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_retryable_classification() {
        assert!(FetchError::Status { status: 502 }.is_retryable());
        assert!(
            FetchError::Upstream {
                code: 500,
                message: "busy".into()
            }
            .is_retryable()
        );
        assert!(!FetchError::MissingData.is_retryable());

        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!FetchError::Decode(decode).is_retryable());
    }

    #[test]
    fn test_rejection_message_names_each_field() {
        let err = ValidationError::Rejected {
            missing: vec!["tip", "lunarDate"],
            news_malformed: false,
        };
        assert_eq!(err.to_string(), "missing required fields: tip, lunarDate");
        assert_eq!(err.missing_fields(), &["tip", "lunarDate"]);
        assert!(ValidationError::InvalidDate("x".into()).missing_fields().is_empty());
    }

    #[test]
    fn test_rejection_message_combines_shape_and_missing() {
        let err = ValidationError::Rejected {
            missing: vec!["tip"],
            news_malformed: true,
        };
        assert_eq!(
            err.to_string(),
            "`news` must be an array of strings; missing required fields: tip"
        );
    }

    #[test]
    fn test_conflict_detection() {
        let conflict = StoreError::Conflict {
            path: "data/2024-01-01.json".into(),
        };
        assert!(conflict.is_conflict());
        assert!(!StoreError::Decode("nope".into()).is_conflict());
    }
}
