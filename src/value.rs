//! Resource values: the container for one resolution attempt and the
//! artifacts derived from it.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use tempfile::TempPath;
use url::Url;

use crate::descriptor::ResourceDescriptor;

/// Filesystem home of a resource's bytes.
#[derive(Debug, Clone)]
pub enum LocalFile {
    /// The descriptor already named a local file; nothing was copied.
    Existing(PathBuf),
    /// Remote bytes materialized into a temp file. The file is removed when
    /// the last clone of the owning value is dropped; the OS temp directory
    /// is the backstop for abnormal shutdown.
    Temporary(Arc<TempPath>),
}

impl LocalFile {
    pub fn path(&self) -> &Path {
        match self {
            LocalFile::Existing(p) => p,
            LocalFile::Temporary(t) => t,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, LocalFile::Temporary(_))
    }
}

/// One resolution attempt and its derived artifacts.
///
/// Only the descriptor comes from the caller; image, icon, local file,
/// byte size and description are filled by the resolution unit. Identity is
/// defined solely by the descriptor (URI and name): two values pointing at
/// the same locator are the same logical value regardless of load state, so
/// artifacts never participate in equality or hashing.
///
/// Artifacts are `Arc`-shared, keeping the clones that flow through event
/// channels cheap.
#[derive(Debug, Clone, Default)]
pub struct ResourceValue {
    descriptor: ResourceDescriptor,
    image: Option<Arc<DynamicImage>>,
    icon: Option<Arc<DynamicImage>>,
    local_file: Option<LocalFile>,
    byte_size: Option<u64>,
    description: Option<String>,
    missing: bool,
}

impl ResourceValue {
    pub fn new(descriptor: ResourceDescriptor) -> Self {
        Self {
            descriptor,
            ..Self::default()
        }
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    pub fn uri(&self) -> Option<&Url> {
        self.descriptor.uri()
    }

    pub fn name(&self) -> Option<&str> {
        self.descriptor.name()
    }

    pub(crate) fn set_name(&mut self, name: Option<String>) {
        self.descriptor = match (self.descriptor.uri().cloned(), name) {
            (Some(uri), Some(name)) => ResourceDescriptor::new(uri).with_name(name),
            (Some(uri), None) => ResourceDescriptor::new(uri),
            (None, Some(name)) => ResourceDescriptor::named_only(name),
            (None, None) => ResourceDescriptor::default(),
        };
    }

    /// Decoded full-size bitmap; absent before loading or when every
    /// decoder passed.
    pub fn image(&self) -> Option<&Arc<DynamicImage>> {
        self.image.as_ref()
    }

    pub fn set_image(&mut self, image: Option<Arc<DynamicImage>>) {
        self.image = image;
    }

    /// Preview bitmap fitted to the slot's bounding box.
    pub fn icon(&self) -> Option<&Arc<DynamicImage>> {
        self.icon.as_ref()
    }

    pub fn set_icon(&mut self, icon: Option<Arc<DynamicImage>>) {
        self.icon = icon;
    }

    pub fn local_file(&self) -> Option<&LocalFile> {
        self.local_file.as_ref()
    }

    pub fn set_local_file(&mut self, local_file: Option<LocalFile>) {
        self.local_file = local_file;
    }

    pub fn byte_size(&self) -> Option<u64> {
        self.byte_size
    }

    pub fn set_byte_size(&mut self, byte_size: Option<u64>) {
        self.byte_size = byte_size;
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    /// True iff no decoder produced an image and the broken-image
    /// placeholder was substituted.
    pub fn is_missing(&self) -> bool {
        self.missing
    }

    pub fn set_missing(&mut self, missing: bool) {
        self.missing = missing;
    }

    /// Structural emptiness of the underlying descriptor. Never any I/O.
    pub fn is_empty(&self) -> bool {
        self.descriptor.is_empty()
    }

    pub fn label(&self) -> String {
        self.descriptor.label()
    }
}

impl PartialEq for ResourceValue {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
    }
}

impl Eq for ResourceValue {}

impl Hash for ResourceValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.descriptor.hash(state);
    }
}

impl PartialOrd for ResourceValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceValue {
    /// Order by URI string with empty values sorting last; ties break on
    /// the display name.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let left = self.uri().map(Url::as_str);
                let right = other.uri().map(Url::as_str);
                left.cmp(&right).then_with(|| self.name().cmp(&other.name()))
            }
        }
    }
}

const KB: f64 = 1024.0;
const MB: f64 = KB * KB;

/// Human-readable byte size: `"812.00 Kb"`, `"1.50 Mb"`.
pub fn size_string(bytes: u64) -> String {
    let b = bytes as f64;
    if b > MB {
        format!("{:.2} Mb", b / MB)
    } else {
        format!("{:.2} Kb", b / KB)
    }
}
