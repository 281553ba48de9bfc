//! Digest image rendering.
//!
//! [`ImageRenderer`] is the seam the pipeline depends on. [`ChromeRenderer`]
//! is the production implementation: it fills an HTML template with the
//! record and screenshots it in headless Chrome.

pub mod chrome;
pub mod template;

pub use chrome::{ChromeRenderer, RenderConfig};

use crate::error::RenderError;
use crate::models::DigestRecord;

/// Produces PNG bytes for a digest.
pub trait ImageRenderer {
    async fn render(&self, record: &DigestRecord) -> Result<Vec<u8>, RenderError>;
}

impl<T: ImageRenderer> ImageRenderer for &T {
    async fn render(&self, record: &DigestRecord) -> Result<Vec<u8>, RenderError> {
        (**self).render(record).await
    }
}
