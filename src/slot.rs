//! The asynchronous resolution slot.
//!
//! A [`Slot`] is one logical editable resource position. Submitting a
//! descriptor either applies it synchronously (empty, name-only and
//! same-URI submits) or dispatches exactly one resolution unit: an
//! independent task that materializes the bytes locally, runs the decoder
//! chain, scales the preview icon and fills in name and description.
//!
//! Every submit bumps the slot's generation counter. When a unit completes
//! it re-checks the counter under the slot lock: a mismatch means the unit
//! was superseded and its result is discarded without a notification. Only
//! the result matching the newest generation is ever published, so the
//! final observed value always corresponds to the most recently submitted
//! descriptor, independent of completion order. Superseded units are not
//! preempted; they run to completion and their output is dropped, which
//! bounds wasted work to one stale unit per rapid resubmission.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use tempfile::TempPath;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;

use preview_scale::scale_to_fit;

use crate::decoder::{
    missing_image, ChainSnapshot, Decoder, DecoderChain, ExtensionDecoder, PlaceholderDecoder,
    SniffDecoder,
};
use crate::descriptor::ResourceDescriptor;
use crate::error::ResolveError;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::value::{LocalFile, ResourceValue};

/// Bounding box the preview icon is fitted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconBounds {
    pub width: u32,
    pub height: u32,
}

impl Default for IconBounds {
    fn default() -> Self {
        Self {
            width: 50,
            height: 50,
        }
    }
}

/// Notifications a slot publishes to its subscribers.
#[derive(Debug, Clone)]
pub enum SlotEvent {
    /// A resolution unit was dispatched for this descriptor. Informational;
    /// collaborators typically show a busy indicator.
    Loading { descriptor: ResourceDescriptor },
    /// A resolution failed; a value marked missing was still published.
    Error { message: String },
    /// The slot's value transitioned. Fired at most once per submit and
    /// never for superseded results.
    ValueChanged {
        old: Option<ResourceValue>,
        new: Option<ResourceValue>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Idle,
    Resolving,
}

/// Outcome of [`Slot::submit`].
#[derive(Debug)]
pub enum Submission {
    /// The descriptor was applied synchronously (empty, name-only or
    /// same-URI fast path); no asynchronous work was started.
    Applied(Option<ResourceValue>),
    /// A resolution unit was dispatched; the outcome arrives through the
    /// event channel. The handle completes when the unit has finished,
    /// whether its result was published or discarded.
    Scheduled(JoinHandle<()>),
}

struct SlotState {
    generation: u64,
    pending: Option<u64>,
    value: Option<ResourceValue>,
    bounds: IconBounds,
}

struct Shared {
    chain: Arc<DecoderChain>,
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<SlotState>,
    events: broadcast::Sender<SlotEvent>,
}

/// One logical editable resource position.
pub struct Slot {
    shared: Arc<Shared>,
}

impl Slot {
    pub fn builder() -> SlotBuilder {
        SlotBuilder::new()
    }

    /// Slot that previews known image file types and reports anything else
    /// as missing.
    pub fn for_images() -> Self {
        Self::builder()
            .with_decoder(ExtensionDecoder::default())
            .build()
    }

    /// Slot that previews image files by extension or content and falls
    /// back to a generic-document bitmap for everything else.
    pub fn for_any_resource() -> Self {
        Self::builder()
            .with_decoder(ExtensionDecoder::default())
            .with_decoder(SniffDecoder)
            .with_fallback(PlaceholderDecoder::default())
            .build()
    }

    /// The slot's current value.
    pub fn value(&self) -> Option<ResourceValue> {
        lock(&self.shared.state).value.clone()
    }

    pub fn status(&self) -> SlotStatus {
        if lock(&self.shared.state).pending.is_some() {
            SlotStatus::Resolving
        } else {
            SlotStatus::Idle
        }
    }

    pub fn icon_bounds(&self) -> IconBounds {
        lock(&self.shared.state).bounds
    }

    /// Set the preview bounding box. Units capture the box at dispatch, so
    /// the change applies to resolutions submitted afterwards.
    pub fn set_icon_bounds(&self, width: u32, height: u32) {
        lock(&self.shared.state).bounds = IconBounds { width, height };
    }

    /// The slot's decoder chain, for registering and removing decoders at
    /// runtime.
    pub fn chain(&self) -> &Arc<DecoderChain> {
        &self.shared.chain
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SlotEvent> {
        self.shared.events.subscribe()
    }

    /// Clear the slot. Equivalent to submitting an empty descriptor.
    pub fn clear(&self) -> Submission {
        self.submit(None)
    }

    /// Submit a descriptor for resolution.
    ///
    /// Empty descriptors, descriptors without a URI and descriptors whose
    /// URI matches the current value are applied synchronously and returned
    /// immediately; a change notification fires only if the value actually
    /// changed. Anything else dispatches one asynchronous resolution unit
    /// and returns without blocking; the outcome arrives as events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, descriptor: Option<ResourceDescriptor>) -> Submission {
        let mut state = lock(&self.shared.state);
        // Every submit supersedes whatever is in flight, including the
        // synchronous fast paths.
        state.generation += 1;
        state.pending = None;

        let descriptor = descriptor.filter(|d| !d.is_empty());

        let Some(descriptor) = descriptor else {
            let old = state.value.take();
            if old.is_some() {
                let _ = self.shared.events.send(SlotEvent::ValueChanged {
                    old,
                    new: None,
                });
            }
            return Submission::Applied(None);
        };

        let current_uri = state.value.as_ref().and_then(|v| v.uri().cloned());
        match descriptor.uri().cloned() {
            Some(uri) if Some(&uri) != current_uri.as_ref() => {
                let generation = state.generation;
                state.pending = Some(generation);
                let bounds = state.bounds;
                drop(state);

                let snapshot = self.shared.chain.snapshot();
                let _ = self.shared.events.send(SlotEvent::Loading {
                    descriptor: descriptor.clone(),
                });
                let shared = Arc::clone(&self.shared);
                let handle = tokio::spawn(async move {
                    let outcome =
                        resolve_unit(&shared, snapshot, descriptor, uri, bounds).await;
                    publish(&shared, generation, outcome);
                });
                Submission::Scheduled(handle)
            }
            _ => {
                // Name-only or same-URI submit: merge synchronously, keep
                // every loaded artifact.
                let old = state.value.clone();
                let mut value = state
                    .value
                    .take()
                    .unwrap_or_else(|| ResourceValue::new(descriptor.clone()));
                if let Some(name) = descriptor.name() {
                    value.set_name(Some(name.to_string()));
                }
                let changed = old.as_ref() != Some(&value);
                state.value = Some(value.clone());
                if changed {
                    let _ = self.shared.events.send(SlotEvent::ValueChanged {
                        old,
                        new: Some(value.clone()),
                    });
                }
                Submission::Applied(Some(value))
            }
        }
    }
}

/// Fluent construction for slots, mirroring how the decoder presets above
/// are assembled.
pub struct SlotBuilder {
    chain: Arc<DecoderChain>,
    bounds: IconBounds,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl Default for SlotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotBuilder {
    pub fn new() -> Self {
        Self {
            chain: Arc::new(DecoderChain::new()),
            bounds: IconBounds::default(),
            fetcher: None,
        }
    }

    /// Share an existing chain instead of the builder's own. Call before
    /// registering decoders; registrations always target the current chain.
    pub fn with_chain(mut self, chain: Arc<DecoderChain>) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_decoder(self, decoder: impl Decoder + 'static) -> Self {
        self.chain.register(Arc::new(decoder));
        self
    }

    pub fn with_prioritized_decoder(self, decoder: impl Decoder + 'static, priority: i32) -> Self {
        self.chain.register_with_priority(Arc::new(decoder), priority);
        self
    }

    pub fn with_fallback(self, decoder: impl Decoder + 'static) -> Self {
        self.chain.set_fallback(Some(Arc::new(decoder)));
        self
    }

    pub fn icon_bounds(mut self, width: u32, height: u32) -> Self {
        self.bounds = IconBounds { width, height };
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn build(self) -> Slot {
        let (events, _) = broadcast::channel(32);
        Slot {
            shared: Arc::new(Shared {
                chain: self.chain,
                fetcher: self
                    .fetcher
                    .unwrap_or_else(|| Arc::new(HttpFetcher::new())),
                state: Mutex::new(SlotState {
                    generation: 0,
                    pending: None,
                    value: None,
                    bounds: self.bounds,
                }),
                events,
            }),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct UnitOutcome {
    value: ResourceValue,
    error: Option<ResolveError>,
}

/// One asynchronous attempt to turn a descriptor into a resource value.
/// Always terminates in a value; failures ride along as an optional error.
async fn resolve_unit(
    shared: &Shared,
    snapshot: ChainSnapshot,
    descriptor: ResourceDescriptor,
    uri: Url,
    bounds: IconBounds,
) -> UnitOutcome {
    let mut value = ResourceValue::new(descriptor);
    let mut error: Option<ResolveError> = None;

    // Materialize the bytes locally. Local paths are aliased directly;
    // remote bytes stream into a fresh temp file owned by the value.
    let bytes: Option<Vec<u8>> = match value.descriptor().local_path() {
        Some(path) => match tokio::fs::read(&path).await {
            Ok(bytes) => {
                value.set_local_file(Some(LocalFile::Existing(path)));
                Some(bytes)
            }
            Err(e) => {
                error = Some(e.into());
                None
            }
        },
        None => match shared.fetcher.fetch(&uri).await {
            Ok(bytes) => match materialize(&bytes).await {
                Ok(temp) => {
                    value.set_local_file(Some(LocalFile::Temporary(Arc::new(temp))));
                    Some(bytes)
                }
                Err(e) => {
                    error = Some(e);
                    None
                }
            },
            Err(e) => {
                error = Some(e);
                None
            }
        },
    };
    if let Some(bytes) = &bytes {
        value.set_byte_size(Some(bytes.len() as u64));
    }

    // Decode and scale are CPU-bound; keep them off the async workers.
    let work_snapshot = snapshot.clone();
    let work_uri = uri.clone();
    let decoded = tokio::task::spawn_blocking(move || {
        let image = bytes
            .as_deref()
            .and_then(|b| work_snapshot.resolve_image(&work_uri, b));
        let missing = image.is_none();
        let base = image.unwrap_or_else(|| missing_image(bounds.width, bounds.height));
        let icon = scale_to_fit(&base, bounds.width, bounds.height);
        (base, missing, icon)
    })
    .await;

    match decoded {
        Ok((base, missing, icon)) => {
            value.set_missing(missing);
            if !missing {
                value.set_image(Some(Arc::new(base)));
            } else if error.is_none() {
                error = Some(ResolveError::Decode(value.label()));
            }
            match icon {
                Ok(icon) => value.set_icon(Some(Arc::new(icon))),
                Err(e) => {
                    if error.is_none() {
                        error = Some(e.into());
                    }
                }
            }
        }
        Err(e) => {
            // A panicking decoder must not take the pipeline down; the
            // value is published as missing instead.
            tracing::error!(error = %e, "decode task failed");
            value.set_missing(true);
            if error.is_none() {
                error = Some(ResolveError::Decode(value.label()));
            }
        }
    }

    // Name and description go through the same snapshot the image did.
    if value.name().is_none() {
        if let Some(name) = snapshot.resolve_name(&uri) {
            value.set_name(Some(name));
        }
    }
    let description = snapshot.resolve_description(&value);
    value.set_description(description);

    UnitOutcome { value, error }
}

/// Generation check-and-set. The state lock is held across the event sends
/// so publications and synchronous submits cannot interleave.
fn publish(shared: &Shared, generation: u64, outcome: UnitOutcome) {
    let mut state = lock(&shared.state);
    if state.generation != generation {
        tracing::debug!(
            generation,
            current = state.generation,
            "discarding superseded resolution result"
        );
        return;
    }
    if state.pending == Some(generation) {
        state.pending = None;
    }
    let old = state.value.replace(outcome.value.clone());
    if let Some(error) = &outcome.error {
        tracing::warn!(error = %error, "resolution completed with failure");
        let _ = shared.events.send(SlotEvent::Error {
            message: format!(
                "unable to load preview for {}: {}",
                outcome.value.label(),
                error
            ),
        });
    }
    let _ = shared.events.send(SlotEvent::ValueChanged {
        old,
        new: Some(outcome.value),
    });
}

async fn materialize(bytes: &[u8]) -> Result<TempPath, ResolveError> {
    let owned = bytes.to_vec();
    let temp = tokio::task::spawn_blocking(move || -> std::io::Result<TempPath> {
        let mut file = tempfile::Builder::new().prefix("preview-").tempfile()?;
        file.write_all(&owned)?;
        file.flush()?;
        Ok(file.into_temp_path())
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(temp)
}
