//! Slash-separated locations in the store tree.

use crate::error::{Result, StoreError};

/// Characters a path segment may not contain.
const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']'];

/// An absolute location in the store, e.g. `/conversations/c1/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse a slash-separated path. Empty segments are ignored.
    pub fn parse(path: &str) -> Result<Self> {
        Self::root().join(path)
    }

    /// Append a relative, slash-separated path.
    pub fn join(&self, relative: &str) -> Result<Self> {
        let mut segments = self.segments.clone();
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            if segment.contains(FORBIDDEN) {
                return Err(StoreError::InvalidPath(relative.to_string()));
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Append a single segment taken verbatim (identifiers, generated keys).
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, `None` for the root.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if `self` equals `other` or lies above it.
    pub fn contains(&self, other: &StorePath) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// True if a write at one path can change the value observed at the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl std::fmt::Display for StorePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}
