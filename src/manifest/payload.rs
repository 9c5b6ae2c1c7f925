//! Inline-or-deferred label payloads.
//!
//! A payload is either held in memory or referenced by path and loaded on
//! first access through a [`PayloadLoader`]. The loaded value is cached, so a
//! deferred payload touches the file layer at most once.

use std::fmt;
use std::sync::OnceLock;

use crate::error::ManifestError;

/// Reads a payload of type `T` from a path (local file, `archive@entry`, URL).
///
/// This is the seam to the file-access layer; the engine never opens files
/// itself.
pub trait PayloadLoader<T> {
    fn load(&self, path: &str) -> Result<T, ManifestError>;
}

impl<T, F> PayloadLoader<T> for F
where
    F: Fn(&str) -> Result<T, ManifestError>,
{
    fn load(&self, path: &str) -> Result<T, ManifestError> {
        self(path)
    }
}

/// Label data that is either inline or loaded lazily from `path`.
#[derive(Clone)]
pub enum Payload<T> {
    Inline(T),
    Deferred { path: String, cache: OnceLock<T> },
}

impl<T> Payload<T> {
    pub fn inline(value: T) -> Self {
        Payload::Inline(value)
    }

    pub fn deferred(path: impl Into<String>) -> Self {
        Payload::Deferred {
            path: path.into(),
            cache: OnceLock::new(),
        }
    }

    /// The reference path of a deferred payload.
    pub fn path(&self) -> Option<&str> {
        match self {
            Payload::Inline(_) => None,
            Payload::Deferred { path, .. } => Some(path),
        }
    }

    /// Returns the value without loading, if it is available.
    pub fn get(&self) -> Option<&T> {
        match self {
            Payload::Inline(value) => Some(value),
            Payload::Deferred { cache, .. } => cache.get(),
        }
    }

    /// Returns the value, loading and caching it on first access.
    pub fn resolve(&self, loader: &dyn PayloadLoader<T>) -> Result<&T, ManifestError> {
        match self {
            Payload::Inline(value) => Ok(value),
            Payload::Deferred { path, cache } => {
                if let Some(value) = cache.get() {
                    return Ok(value);
                }
                let loaded = loader.load(path)?;
                Ok(cache.get_or_init(|| loaded))
            }
        }
    }
}

impl<T: PartialEq> PartialEq for Payload<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Payload::Inline(a), Payload::Inline(b)) => a == b,
            (Payload::Deferred { path: a, .. }, Payload::Deferred { path: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Payload<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Inline(value) => f.debug_tuple("Inline").field(value).finish(),
            Payload::Deferred { path, cache } => f
                .debug_struct("Deferred")
                .field("path", path)
                .field("loaded", &cache.get().is_some())
                .finish(),
        }
    }
}

/// A single-channel alpha mask, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MattingMask {
    width: u32,
    height: u32,
    values: Vec<u8>,
}

impl MattingMask {
    pub fn new(width: u32, height: u32, values: Vec<u8>) -> Result<Self, ManifestError> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(ManifestError::shape(
                "matting mask",
                format!(
                    "{}x{} mask needs {} values, got {}",
                    width,
                    height,
                    expected,
                    values.len()
                ),
            ));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    /// Value at column `x`, row `y`.
    pub fn at(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}
