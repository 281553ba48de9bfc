//! Upstream payload validation and the date gate.
//!
//! Two explicit policies, selected once in configuration:
//!
//! | Field | Strict | Lenient |
//! |-------|--------|---------|
//! | `date` | required | today |
//! | `news` | required array of strings | empty, non-strings dropped |
//! | `lunar_date` | required | [`LUNAR_DATE_PLACEHOLDER`] |
//! | `tip` | required | [`TIP_PLACEHOLDER`] |
//!
//! A present `date` must be `YYYY-MM-DD` under both policies.

use crate::error::{DateMismatchError, ValidationError};
use crate::models::{DigestRecord, RawDigest};
use crate::utils::{format_date, parse_date};
use chrono::NaiveDate;
use clap::ValueEnum;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const LUNAR_DATE_PLACEHOLDER: &str = "农历信息暂缺";
pub const TIP_PLACEHOLDER: &str = "今日暂无微语";

/// How to treat missing or malformed fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Reject the payload, naming every missing field.
    #[default]
    Strict,
    /// Substitute defaults and carry on.
    Lenient,
}

/// Turn a raw upstream digest into a [`DigestRecord`].
///
/// # Arguments
///
/// * `raw` - The upstream `data` object
/// * `policy` - Strict rejects incomplete payloads, lenient fills them in
/// * `today` - The lenient default for a missing date
///
/// # Returns
///
/// The record, or [`ValidationError::Rejected`] naming every missing field
/// (strict only), or [`ValidationError::InvalidDate`] under either policy.
///
/// # Examples
///
/// ```ignore
/// let record = validate(raw, ValidationPolicy::Lenient, today)?;
/// assert!(!record.tip.is_empty());
/// ```
pub fn validate(
    raw: RawDigest,
    policy: ValidationPolicy,
    today: NaiveDate,
) -> Result<DigestRecord, ValidationError> {
    let date = non_empty(raw.date);
    let tip = non_empty(raw.tip);
    let lunar_date = non_empty(raw.lunar_date);
    let news = raw.news.map(news_items);

    if let Some(d) = &date {
        if parse_date(d).is_none() {
            return Err(ValidationError::InvalidDate(d.clone()));
        }
    }

    let record = match policy {
        ValidationPolicy::Strict => {
            let mut missing = Vec::new();
            let mut news_malformed = false;
            if date.is_none() {
                missing.push("date");
            }
            let news_items = match news {
                Some(NewsShape::NotArray) => {
                    news_malformed = true;
                    None
                }
                Some(NewsShape::Items { skipped, .. }) if skipped > 0 => {
                    news_malformed = true;
                    None
                }
                Some(NewsShape::Items { items, .. }) if !items.is_empty() => Some(items),
                _ => {
                    missing.push("newsItems");
                    None
                }
            };
            if lunar_date.is_none() {
                missing.push("lunarDate");
            }
            if tip.is_none() {
                missing.push("tip");
            }
            if news_malformed || !missing.is_empty() {
                return Err(ValidationError::Rejected {
                    missing,
                    news_malformed,
                });
            }

            DigestRecord {
                date: date.unwrap_or_default(),
                news_items: news_items.unwrap_or_default(),
                tip: tip.unwrap_or_default(),
                lunar_date: lunar_date.unwrap_or_default(),
                source_url: non_empty(raw.link),
                cover_url: non_empty(raw.cover),
                image_url: non_empty(raw.image),
            }
        }
        ValidationPolicy::Lenient => {
            let news_items = match news {
                Some(NewsShape::Items { items, skipped }) => {
                    if skipped > 0 {
                        warn!(skipped, "Dropped non-string news entries");
                    }
                    items
                }
                Some(NewsShape::NotArray) => {
                    warn!("Upstream `news` is not an array; using an empty list");
                    Vec::new()
                }
                None => Vec::new(),
            };
            DigestRecord {
                date: date.unwrap_or_else(|| {
                    warn!(%today, "Upstream `date` missing; defaulting to today");
                    format_date(today)
                }),
                news_items,
                tip: tip.unwrap_or_else(|| TIP_PLACEHOLDER.to_string()),
                lunar_date: lunar_date.unwrap_or_else(|| LUNAR_DATE_PLACEHOLDER.to_string()),
                source_url: non_empty(raw.link),
                cover_url: non_empty(raw.cover),
                image_url: non_empty(raw.image),
            }
        }
    };

    debug!(date = %record.date, items = record.news_items.len(), ?policy, "Validated digest");
    Ok(record)
}

/// Fail when an expected date is set and the record carries another one.
pub fn check_date(record: &DigestRecord, expected: Option<NaiveDate>) -> Result<(), DateMismatchError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let expected = format_date(expected);
    if record.date == expected {
        Ok(())
    } else {
        Err(DateMismatchError {
            expected,
            actual: record.date.clone(),
        })
    }
}

enum NewsShape {
    NotArray,
    /// Trimmed non-blank strings, plus how many non-string entries were seen.
    Items { items: Vec<String>, skipped: usize },
}

fn news_items(value: Value) -> NewsShape {
    let Value::Array(entries) = value else {
        return NewsShape::NotArray;
    };
    let mut skipped = 0;
    let items = entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(s.trim().to_string()),
            _ => {
                skipped += 1;
                None
            }
        })
        .filter(|s| !s.is_empty())
        .collect();
    NewsShape::Items { items, skipped }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
