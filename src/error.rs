//! Error types for the resolution pipeline.
//!
//! Superseded (stale) results are deliberately not represented here: they
//! are discarded inside the slot with a debug log and never surfaced. Every
//! other failure ends up as a published value marked missing plus one error
//! notification, never as a panic across the async boundary.

use thiserror::Error;

/// Failures a resolution attempt can produce.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The input text could not be turned into a resource locator. Surfaced
    /// synchronously; the slot's value is left unchanged.
    #[error("malformed resource locator `{input}`: {reason}")]
    MalformedDescriptor { input: String, reason: String },

    /// Reading or materializing the resource bytes failed.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Fetching a remote resource failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// No decoder recognized the content.
    #[error("no decoder recognized the content of `{0}`")]
    Decode(String),

    /// Producing the bounded preview image failed.
    #[error(transparent)]
    Scale(#[from] preview_scale::ScaleError),
}
