//! Resource descriptors: immutable, user-supplied locators.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::ResolveError;

/// An immutable resource locator: an absolute URI plus an optional display
/// name. Two descriptors are equal iff URI and name are equal; either part
/// may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor {
    uri: Option<Url>,
    name: Option<String>,
}

impl ResourceDescriptor {
    pub fn new(uri: Url) -> Self {
        Self {
            uri: Some(uri),
            name: None,
        }
    }

    /// A descriptor carrying only a display name. Submitting one merges the
    /// name into the slot's current value synchronously; there is nothing
    /// to resolve.
    pub fn named_only(name: impl Into<String>) -> Self {
        Self {
            uri: None,
            name: Some(name.into()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parse user text into a descriptor. Text without a scheme is treated
    /// as a filesystem path and promoted to an absolute `file:` URI. Only
    /// the text is inspected; the filesystem is never consulted.
    pub fn parse(input: &str) -> Result<Self, ResolveError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        match Url::parse(trimmed) {
            Ok(uri) => Ok(Self::new(uri)),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let absolute = std::path::absolute(Path::new(trimmed)).map_err(|e| {
                    ResolveError::MalformedDescriptor {
                        input: trimmed.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                let uri = Url::from_file_path(&absolute).map_err(|()| {
                    ResolveError::MalformedDescriptor {
                        input: trimmed.to_string(),
                        reason: "not a representable file path".to_string(),
                    }
                })?;
                Ok(Self::new(uri))
            }
            Err(e) => Err(ResolveError::MalformedDescriptor {
                input: trimmed.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    pub fn uri(&self) -> Option<&Url> {
        self.uri.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Structural emptiness: neither a URI nor a non-blank name. Purely a
    /// field inspection, never any I/O.
    pub fn is_empty(&self) -> bool {
        self.uri.is_none() && self.name.as_deref().is_none_or(|n| n.trim().is_empty())
    }

    /// The local path this descriptor already denotes, if its URI uses the
    /// `file` scheme.
    pub fn local_path(&self) -> Option<PathBuf> {
        self.uri
            .as_ref()
            .filter(|u| u.scheme() == "file")
            .and_then(|u| u.to_file_path().ok())
    }

    /// Short human-readable handle for messages: the display name if set,
    /// else the URI's last segment, else the full URI.
    pub fn label(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        if let Some(uri) = &self.uri {
            return last_uri_segment(uri).unwrap_or_else(|| uri.to_string());
        }
        "<empty>".to_string()
    }
}

/// Last non-empty path segment of a URI, percent-decoded.
pub fn last_uri_segment(uri: &Url) -> Option<String> {
    let path = uri.path();
    let raw = path.rsplit('/').find(|s| !s.is_empty())?;
    Some(percent_decode_str(raw).decode_utf8_lossy().into_owned())
}
