//! Data models for the daily digest and its published artifacts.
//!
//! - [`RawEnvelope`] / [`RawDigest`]: the upstream payload, every field optional
//! - [`DigestRecord`]: a validated digest for one calendar date
//! - [`PublishableRecord`]: the JSON document committed to the store
//!
//! Persisted field names are camelCase to match the published JSON API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The upstream response envelope.
///
/// ```json
/// { "code": 200, "message": "ok", "data": { "date": "2024-01-01", "news": [...] } }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct RawEnvelope {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<RawDigest>,
}

/// The `data` object as the upstream API sends it.
///
/// Nothing is trusted at this point: `news` is kept as a raw JSON value so the
/// validator can tell "missing" from "not an array".
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RawDigest {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub news: Option<Value>,
    #[serde(default)]
    pub tip: Option<String>,
    #[serde(default)]
    pub lunar_date: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// A validated digest. Constructed fresh on every run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestRecord {
    /// Calendar date in `YYYY-MM-DD` form, the primary key.
    pub date: String,
    /// Headlines in display order.
    pub news_items: Vec<String>,
    pub tip: String,
    pub lunar_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    /// Upstream's own image link. Never republished as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// The JSON document written to `{json_dir}/{date}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishableRecord {
    pub date: String,
    pub news_items: Vec<String>,
    pub tip: String,
    pub lunar_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Always `{image_base_url}/{date}.png`.
    pub image_url: String,
    /// Canonical read URL of this record.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// JSON keys excluded from the content comparison.
pub const TIMESTAMP_KEYS: [&str; 2] = ["createdAt", "updatedAt"];

impl PublishableRecord {
    /// Stamp write timestamps, keeping the original creation time if known.
    pub fn stamped(mut self, created_at: Option<String>, now: &str) -> Self {
        self.created_at = Some(created_at.unwrap_or_else(|| now.to_string()));
        self.updated_at = Some(now.to_string());
        self
    }

    /// The record as a JSON value with the timestamp keys removed.
    pub fn content_value(&self) -> Value {
        // Serializing a plain struct of strings cannot fail.
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        strip_timestamps(&mut value);
        value
    }

    /// Pretty JSON with a trailing newline, as committed to the store.
    pub fn to_pretty_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Remove `createdAt` / `updatedAt` from a JSON object in place.
pub fn strip_timestamps(value: &mut Value) {
    if let Value::Object(map) = value {
        for key in TIMESTAMP_KEYS {
            map.remove(key);
        }
    }
}

/// Where artifacts live in the store and where they are read back from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    /// Store directory for JSON records, e.g. `data`.
    pub json_dir: String,
    /// Store directory for images, e.g. `images`.
    pub image_dir: String,
    /// Public URL prefix for JSON records (no trailing slash).
    pub json_base_url: String,
    /// Public URL prefix for images (no trailing slash).
    pub image_base_url: String,
}

impl Targets {
    pub fn json_path(&self, date: &str) -> String {
        join_path(&self.json_dir, &format!("{date}.json"))
    }

    pub fn image_path(&self, date: &str) -> String {
        join_path(&self.image_dir, &format!("{date}.png"))
    }
}

fn join_path(dir: &str, file: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{dir}/{file}")
    }
}
