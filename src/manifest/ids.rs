//! Source-side image identifiers.
//!
//! Documents identify images by either an integer or a string id. The key is
//! kept verbatim so export can write it back unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An image identifier as declared by a source document.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageKey {
    Int(u64),
    Str(String),
}

impl ImageKey {
    /// Returns the integer value, if this key is numeric.
    #[inline]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ImageKey::Int(id) => Some(*id),
            ImageKey::Str(_) => None,
        }
    }
}

impl fmt::Debug for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKey::Int(id) => write!(f, "ImageKey({})", id),
            ImageKey::Str(id) => write!(f, "ImageKey({:?})", id),
        }
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKey::Int(id) => write!(f, "{}", id),
            ImageKey::Str(id) => write!(f, "{}", id),
        }
    }
}

impl From<u64> for ImageKey {
    fn from(id: u64) -> Self {
        ImageKey::Int(id)
    }
}

impl From<usize> for ImageKey {
    fn from(id: usize) -> Self {
        ImageKey::Int(id as u64)
    }
}

impl From<&str> for ImageKey {
    fn from(id: &str) -> Self {
        ImageKey::Str(id.to_string())
    }
}

impl From<String> for ImageKey {
    fn from(id: String) -> Self {
        ImageKey::Str(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_equality() {
        assert_eq!(ImageKey::from(1u64), ImageKey::Int(1));
        assert_ne!(ImageKey::from(1u64), ImageKey::from("1"));
    }

    #[test]
    fn test_key_deserializes_untagged() {
        let keys: Vec<ImageKey> = serde_json::from_str(r#"[3, "img_7"]"#).expect("parse keys");
        assert_eq!(keys, vec![ImageKey::Int(3), ImageKey::Str("img_7".into())]);
        assert_eq!(keys[0].as_u64(), Some(3));
        assert_eq!(keys[1].as_u64(), None);
    }

    #[test]
    fn test_key_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ImageKey::from(1u64));
        set.insert(ImageKey::from("a"));
        set.insert(ImageKey::from(1u64)); // duplicate
        assert_eq!(set.len(), 2);
    }
}
