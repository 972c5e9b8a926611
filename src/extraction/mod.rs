//! Archive expansion
//!
//! Books arrive as zip archives, sometimes with further zips inside them. This
//! module expands whole archives, pulls single members out for metadata probing,
//! and expands nested archives found inside an installed tree.

mod nested;
mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

// Re-exports
pub use nested::{expand_nested_zips, find_zips};
pub use zip::ZipExtractor;
