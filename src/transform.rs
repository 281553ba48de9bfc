//! Derive the published JSON document from a validated digest.
//!
//! The transform is pure: the upstream cover is dropped, the image URL is
//! rewritten to point at our own copy, and a `source` attribution to the
//! record's canonical URL is added. Timestamps are stamped later, at write time.

use crate::models::{DigestRecord, PublishableRecord, Targets};

/// Build the record to publish.
///
/// # Arguments
///
/// * `record` - A validated digest
/// * `targets` - Store directories and the public URLs they are served from
///
/// # Returns
///
/// A [`PublishableRecord`] without timestamps, whose `imageUrl` and `source`
/// point at `{image_base_url}/{date}.png` and `{json_base_url}/{date}.json`.
///
/// # Examples
///
/// ```ignore
/// let published = transform(&record, &targets);
/// assert_eq!(published.image_url, "https://example.com/images/2024-01-01.png");
/// ```
pub fn transform(record: &DigestRecord, targets: &Targets) -> PublishableRecord {
    let base = |url: &str| url.trim_end_matches('/').to_string();
    PublishableRecord {
        date: record.date.clone(),
        news_items: record.news_items.clone(),
        tip: record.tip.clone(),
        lunar_date: record.lunar_date.clone(),
        source_url: record.source_url.clone(),
        image_url: format!("{}/{}.png", base(&targets.image_base_url), record.date),
        source: format!("{}/{}.json", base(&targets.json_base_url), record.date),
        created_at: None,
        updated_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> Targets {
        Targets {
            json_dir: "data".to_string(),
            image_dir: "images".to_string(),
            json_base_url: "https://raw.example.com/o/r/main/data/".to_string(),
            image_base_url: "https://raw.example.com/o/r/main/images".to_string(),
        }
    }

    fn record() -> DigestRecord {
        DigestRecord {
            date: "2024-01-01".to_string(),
            news_items: vec!["one".to_string(), "two".to_string()],
            tip: "tip".to_string(),
            lunar_date: "lunar".to_string(),
            source_url: Some("https://example.com/a".to_string()),
            cover_url: Some("https://cdn.example.com/cover.png".to_string()),
            image_url: Some("https://cdn.example.com/theirs.png".to_string()),
        }
    }

    #[test]
    fn test_rewrites_image_and_adds_source() {
        let out = transform(&record(), &targets());
        assert_eq!(out.image_url, "https://raw.example.com/o/r/main/images/2024-01-01.png");
        assert_eq!(out.source, "https://raw.example.com/o/r/main/data/2024-01-01.json");
        assert_eq!(out.source_url.as_deref(), Some("https://example.com/a"));
    }

    #[test]
    fn test_cover_is_not_republished() {
        let json = serde_json::to_string(&transform(&record(), &targets())).unwrap();
        assert!(!json.contains("cover"));
        assert!(!json.contains("theirs.png"));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let a = transform(&record(), &targets()).to_pretty_json().unwrap();
        let b = transform(&record(), &targets()).to_pretty_json().unwrap();
        assert_eq!(a, b);
    }
}
