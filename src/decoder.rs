//! Pluggable decoder chain.
//!
//! A chain is an ordered list of decoders plus one optional fallback. Image,
//! name and description resolution each walk the list in priority order and
//! short-circuit on the first decoder that answers; the fallback is
//! consulted last. Decoders receive the already-fetched bytes, so they stay
//! synchronous, side-effect-free and fast.
//!
//! Registration is safe concurrently with in-flight resolutions: readers
//! work on a [`ChainSnapshot`] taken when a resolution starts, so changes
//! only affect resolutions started afterwards.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use url::Url;

use crate::descriptor::last_uri_segment;
use crate::value::{size_string, ResourceValue};

/// One pluggable content handler. All methods default to "not mine, ask the
/// next one"; implement whichever capabilities the handler has.
pub trait Decoder: Send + Sync {
    /// Try to decode a preview image from the fetched bytes. `None` passes
    /// the request on to the next decoder in the chain.
    fn decode(&self, _uri: &Url, _bytes: &[u8]) -> Option<DynamicImage> {
        None
    }

    /// Display name for the resource, `None` to defer.
    fn name_for(&self, _uri: &Url) -> Option<String> {
        None
    }

    /// Detailed description of a loaded value, `None` to defer.
    fn describe(&self, _value: &ResourceValue) -> Option<String> {
        None
    }
}

struct Entry {
    priority: i32,
    seq: u64,
    decoder: Arc<dyn Decoder>,
}

#[derive(Default)]
struct ChainInner {
    entries: Vec<Entry>,
    fallback: Option<Arc<dyn Decoder>>,
    next_seq: u64,
}

/// Ordered, read-mostly registry of decoders plus one optional fallback.
#[derive(Default)]
pub struct DecoderChain {
    inner: RwLock<ChainInner>,
}

impl DecoderChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder at the default priority (0). Decoders of equal
    /// priority keep their registration order.
    pub fn register(&self, decoder: Arc<dyn Decoder>) {
        self.register_with_priority(decoder, 0);
    }

    /// Register a decoder at an explicit priority; lower priorities are
    /// consulted first.
    pub fn register_with_priority(&self, decoder: Arc<dyn Decoder>, priority: i32) {
        let mut inner = write_lock(&self.inner);
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.push(Entry {
            priority,
            seq,
            decoder,
        });
        inner.entries.sort_by_key(|e| (e.priority, e.seq));
    }

    /// Remove a previously registered decoder (matched by identity).
    /// Resolutions already in flight keep their snapshot.
    pub fn unregister(&self, decoder: &Arc<dyn Decoder>) {
        let mut inner = write_lock(&self.inner);
        inner.entries.retain(|e| !Arc::ptr_eq(&e.decoder, decoder));
    }

    /// Set or clear the fallback decoder consulted after every registered
    /// decoder has passed.
    pub fn set_fallback(&self, fallback: Option<Arc<dyn Decoder>>) {
        write_lock(&self.inner).fallback = fallback;
    }

    /// Immutable view of the current registration state. Resolution units
    /// capture one snapshot at dispatch and use it throughout.
    pub fn snapshot(&self) -> ChainSnapshot {
        let inner = read_lock(&self.inner);
        ChainSnapshot {
            decoders: inner.entries.iter().map(|e| Arc::clone(&e.decoder)).collect(),
            fallback: inner.fallback.clone(),
        }
    }

    pub fn resolve_image(&self, uri: &Url, bytes: &[u8]) -> Option<DynamicImage> {
        self.snapshot().resolve_image(uri, bytes)
    }

    pub fn resolve_name(&self, uri: &Url) -> Option<String> {
        self.snapshot().resolve_name(uri)
    }

    pub fn resolve_description(&self, value: &ResourceValue) -> Option<String> {
        self.snapshot().resolve_description(value)
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Frozen view of a chain: the decoder list and fallback as they were when
/// the snapshot was taken.
#[derive(Clone)]
pub struct ChainSnapshot {
    decoders: Vec<Arc<dyn Decoder>>,
    fallback: Option<Arc<dyn Decoder>>,
}

impl ChainSnapshot {
    /// First decoder producing an image wins; the fallback is tried last.
    /// `None` means the caller must substitute the broken-image placeholder.
    pub fn resolve_image(&self, uri: &Url, bytes: &[u8]) -> Option<DynamicImage> {
        for decoder in &self.decoders {
            if let Some(image) = decoder.decode(uri, bytes) {
                return Some(image);
            }
        }
        self.fallback.as_ref().and_then(|f| f.decode(uri, bytes))
    }

    pub fn resolve_name(&self, uri: &Url) -> Option<String> {
        for decoder in &self.decoders {
            if let Some(name) = decoder.name_for(uri) {
                return Some(name);
            }
        }
        self.fallback.as_ref().and_then(|f| f.name_for(uri))
    }

    pub fn resolve_description(&self, value: &ResourceValue) -> Option<String> {
        for decoder in &self.decoders {
            if let Some(description) = decoder.describe(value) {
                return Some(description);
            }
        }
        self.fallback.as_ref().and_then(|f| f.describe(value))
    }
}

fn uri_extension(uri: &Url) -> Option<String> {
    let path = uri.path();
    let segment = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Decodes resources whose URI carries a known image file extension, using
/// the formats the `image` crate ships.
pub struct ExtensionDecoder {
    extensions: HashSet<String>,
}

impl Default for ExtensionDecoder {
    fn default() -> Self {
        Self::with_extensions(["jpg", "jpeg", "gif", "tif", "tiff", "png", "bmp", "webp"])
    }
}

impl ExtensionDecoder {
    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.into().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn matches(&self, uri: &Url) -> bool {
        uri_extension(uri).is_some_and(|ext| self.extensions.contains(&ext))
    }
}

impl Decoder for ExtensionDecoder {
    fn decode(&self, uri: &Url, bytes: &[u8]) -> Option<DynamicImage> {
        if !self.matches(uri) {
            return None;
        }
        match image::load_from_memory(bytes) {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::debug!(uri = %uri, error = %e, "extension matched but decode failed");
                None
            }
        }
    }

    fn name_for(&self, uri: &Url) -> Option<String> {
        last_uri_segment(uri)
    }

    fn describe(&self, value: &ResourceValue) -> Option<String> {
        let uri = value.uri()?;
        if !self.matches(uri) {
            return None;
        }
        let mut buf = String::new();
        if let Some(image) = value.image() {
            buf.push_str(&format!("{}x{}px", image.width(), image.height()));
        }
        if let Some(size) = value.byte_size() {
            if !buf.is_empty() {
                buf.push_str("; ");
            }
            buf.push_str(&size_string(size));
        }
        if buf.is_empty() {
            None
        } else {
            Some(buf)
        }
    }
}

/// Decodes by sniffing the content's magic bytes, ignoring the extension.
#[derive(Default)]
pub struct SniffDecoder;

impl Decoder for SniffDecoder {
    fn decode(&self, uri: &Url, bytes: &[u8]) -> Option<DynamicImage> {
        let format = image::guess_format(bytes).ok()?;
        match image::load_from_memory_with_format(bytes, format) {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::debug!(uri = %uri, ?format, error = %e, "sniffed format failed to decode");
                None
            }
        }
    }

    fn name_for(&self, uri: &Url) -> Option<String> {
        last_uri_segment(uri)
    }

    fn describe(&self, value: &ResourceValue) -> Option<String> {
        let image = value.image()?;
        let mut buf = format!("{}x{}px", image.width(), image.height());
        if let Some(size) = value.byte_size() {
            buf.push_str("; ");
            buf.push_str(&size_string(size));
        }
        Some(buf)
    }
}

/// Always yields a generated generic-document bitmap. Intended as the chain
/// fallback so unrecognized content still gets a preview.
pub struct PlaceholderDecoder {
    image: Arc<DynamicImage>,
}

impl Default for PlaceholderDecoder {
    fn default() -> Self {
        Self {
            image: Arc::new(placeholder_image(64, 64)),
        }
    }
}

impl Decoder for PlaceholderDecoder {
    fn decode(&self, _uri: &Url, _bytes: &[u8]) -> Option<DynamicImage> {
        Some((*self.image).clone())
    }

    fn name_for(&self, uri: &Url) -> Option<String> {
        last_uri_segment(uri)
    }

    fn describe(&self, value: &ResourceValue) -> Option<String> {
        value.byte_size().map(size_string)
    }
}

const INK: Rgba<u8> = Rgba([40, 40, 40, 255]);
const PAPER: Rgba<u8> = Rgba([245, 245, 245, 255]);

/// "Broken image" placeholder substituted when the whole chain, fallback
/// included, produced nothing: a black diagonal cross on a transparent
/// background.
pub(crate) fn missing_image(width: u32, height: u32) -> DynamicImage {
    let width = width.max(8);
    let height = height.max(8);
    let mut img = RgbaImage::new(width, height);
    let gap = (width.min(height) / 5).max(1);
    let (x0, y0) = (gap, gap);
    let (x1, y1) = (width - 1 - gap, height - 1 - gap);
    let steps = (x1 - x0).max(y1 - y0).max(1);
    for i in 0..=steps {
        let x = x0 + (x1 - x0) * i / steps;
        let y = y0 + (y1 - y0) * i / steps;
        img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        img.put_pixel(x, y1 + y0 - y, Rgba([0, 0, 0, 255]));
    }
    DynamicImage::ImageRgba8(img)
}

/// Generic-document bitmap for the placeholder decoder: a bordered page
/// with a few text lines.
fn placeholder_image(width: u32, height: u32) -> DynamicImage {
    let width = width.max(16);
    let height = height.max(16);
    let mut img = RgbaImage::new(width, height);
    let margin_x = width / 6;
    let margin_y = height / 10;
    let (left, right) = (margin_x, width - 1 - margin_x);
    let (top, bottom) = (margin_y, height - 1 - margin_y);
    for y in top..=bottom {
        for x in left..=right {
            let edge = x == left || x == right || y == top || y == bottom;
            img.put_pixel(x, y, if edge { INK } else { PAPER });
        }
    }
    // Text lines across the page body.
    let line_gap = ((bottom - top) / 6).max(2);
    let mut y = top + line_gap;
    while y + line_gap < bottom {
        for x in (left + 3)..=(right.saturating_sub(3)) {
            img.put_pixel(x, y, Rgba([150, 150, 150, 255]));
        }
        y += line_gap;
    }
    DynamicImage::ImageRgba8(img)
}
