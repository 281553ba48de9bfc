//! Filling the page template.
//!
//! The template carries one placeholder, [`DATA_PLACEHOLDER`], inside a
//! `<script type="application/json">` block. The record is embedded there as
//! JSON and the page script builds the DOM with `textContent`, so no HTML
//! escaping happens on this side. The page must expose `window.digestRendered`,
//! a promise that settles once with `"ok"` or `"error: <reason>"`, and an
//! element with id [`CAPTURE_SELECTOR`].

use crate::error::RenderError;
use crate::models::DigestRecord;

pub const DATA_PLACEHOLDER: &str = "{{DIGEST_JSON}}";
pub const CAPTURE_SELECTOR: &str = "#digest";

/// The template shipped with the binary.
pub const BUILTIN_TEMPLATE: &str = include_str!("../../templates/digest.html");

/// Substitute the record into `template`.
pub fn fill(template: &str, record: &DigestRecord) -> Result<String, RenderError> {
    if !template.contains(DATA_PLACEHOLDER) {
        return Err(RenderError::Template(DATA_PLACEHOLDER));
    }
    let json = serde_json::to_string(record)?;
    // `</script>` inside the data would end the block early.
    let json = json.replace("</", "<\\/");
    Ok(template.replace(DATA_PLACEHOLDER, &json))
}
