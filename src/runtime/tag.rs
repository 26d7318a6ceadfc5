//! Offset-addressed stream metadata
//!
//! A [`Tag`] rides alongside the items of one buffer, pinned to an absolute
//! stream offset. Producers attach tags, readers query them by offset range,
//! and the buffer prunes them once every reader has moved past.

use std::fmt;
use std::sync::Arc;

/// Value payload of a [`Tag`].
#[derive(Clone, Debug, PartialEq)]
pub enum TagValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TagValue::Bool(v) => write!(f, "{}", v),
            TagValue::Integer(v) => write!(f, "{}", v),
            TagValue::Float(v) => write!(f, "{}", v),
            TagValue::Text(v) => write!(f, "{:?}", v),
            TagValue::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Immutable metadata attached to one absolute stream offset.
///
/// The key is shared via `Arc<str>` so tags stay cheap to clone when a
/// reader copies them out of the buffer's collection.
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    /// Absolute item offset in the producing buffer's stream
    pub offset: u64,
    pub key: Arc<str>,
    pub value: TagValue,
}

impl Tag {
    pub fn new(offset: u64, key: impl Into<Arc<str>>, value: TagValue) -> Self {
        Self {
            offset,
            key: key.into(),
            value,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Tag[@{} {}={}]", self.offset, self.key, self.value)
    }
}
