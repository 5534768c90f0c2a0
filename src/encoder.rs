//! Encoding of (URI, time) labels into patterns.
//!
//! The encoder is the seam between the application's notion of a label and
//! the attribute namespace of the underlying scheme. The default encoder
//! tags every bound slot with the permission kind, so that decryption keys
//! and signing keys live in disjoint parts of the namespace and a key
//! delegated for one can never be used as the other.

use crate::pattern::Pattern;
use crate::time::{TimePath, MAX_TIME_LENGTH};
use crate::uri::UriPath;

/// The kind of key a pattern addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Decryption,
    Signing,
}

impl PatternKind {
    fn tag(self) -> u8 {
        match self {
            PatternKind::Decryption => 0,
            PatternKind::Signing => 1,
        }
    }
}

/// Maps a URI path, a time path, and a permission kind to a fixed-length
/// pattern.
pub trait PatternEncoder: Send + Sync {
    /// The length of every pattern this encoder produces.
    fn pattern_len(&self) -> usize;

    /// Encodes the label. The result always has [`pattern_len`] slots.
    ///
    /// [`pattern_len`]: PatternEncoder::pattern_len
    fn encode(&self, uri: &UriPath, time: &TimePath, kind: PatternKind) -> Pattern;
}

/// The default encoder: generic pattern encoding with a one-byte kind tag
/// prefixed to every bound slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultPatternEncoder {
    max_uri_length: usize,
}

impl DefaultPatternEncoder {
    /// Creates an encoder for URIs of up to `max_uri_length` components
    /// (including the terminator component of non-prefix URIs).
    pub fn new(max_uri_length: usize) -> Self {
        DefaultPatternEncoder { max_uri_length }
    }
}

impl PatternEncoder for DefaultPatternEncoder {
    fn pattern_len(&self) -> usize {
        self.max_uri_length + MAX_TIME_LENGTH
    }

    fn encode(&self, uri: &UriPath, time: &TimePath, kind: PatternKind) -> Pattern {
        let mut pattern = Pattern::new(self.pattern_len());
        Pattern::encode(uri, time, &mut pattern);
        for slot in pattern.slots_mut() {
            if let Some(bytes) = slot {
                bytes.insert(0, kind.tag());
            }
        }
        pattern
    }
}
