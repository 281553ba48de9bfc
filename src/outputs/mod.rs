//! Local outputs written alongside the published artifacts.
//!
//! - [`json`]: the on-disk archive of validated digests, one file per date

pub mod json;
