//! # Preview Pipeline Library
//!
//! Point at a resource (a local file or a remote URL) and obtain, without
//! blocking the caller, a locally cached copy, a decoded preview image
//! fitted into a bounded box, and a human-readable description. Several
//! resolutions may be in flight concurrently; only the outcome of the
//! latest request for a slot is ever surfaced.
//!
//! ## Architecture
//!
//! The library is organized leaf-first:
//! - `descriptor`: immutable resource locators (URI plus optional name)
//! - `value`: resource values and their derived artifacts
//! - `decoder`: the pluggable decoder chain with fallback
//! - `fetch`: the byte-fetching seam (HTTP implementation included)
//! - `slot`: the asynchronous resolution controller, one per editable
//!   resource position
//! - `collection`: ordered, de-duplicated value collections with
//!   diff-based change notification
//!
//! Scaling lives in the companion `preview-scale` crate.
//!
//! ## Ordering guarantee
//!
//! Publication order is not completion order. Each submit bumps a per-slot
//! generation counter; a finished resolution publishes only if its
//! generation is still current, so the final observed value always matches
//! the most recently submitted descriptor and every submit produces at most
//! one observable transition.
//!
//! ## Example
//!
//! ```rust,no_run
//! use preview_pipeline::{ResourceDescriptor, Slot, SlotEvent, Submission};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let slot = Slot::for_any_resource();
//! slot.set_icon_bounds(64, 64);
//! let mut events = slot.subscribe();
//!
//! let descriptor = ResourceDescriptor::parse("https://example.com/cat.png")?;
//! if let Submission::Scheduled(unit) = slot.submit(Some(descriptor)) {
//!     unit.await?;
//! }
//! while let Ok(event) = events.try_recv() {
//!     if let SlotEvent::ValueChanged { new: Some(value), .. } = event {
//!         println!("{}", value.description().unwrap_or("no description"));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod decoder;
pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod slot;
pub mod value;

pub use collection::{ListEvent, ValueList};
pub use decoder::{
    ChainSnapshot, Decoder, DecoderChain, ExtensionDecoder, PlaceholderDecoder, SniffDecoder,
};
pub use descriptor::ResourceDescriptor;
pub use error::ResolveError;
pub use fetch::{Fetcher, HttpFetcher};
pub use slot::{IconBounds, Slot, SlotBuilder, SlotEvent, SlotStatus, Submission};
pub use value::{size_string, LocalFile, ResourceValue};
