//! Patterns: the fixed-length slot vectors that label WKD-IBE ciphertexts
//! and secret keys.
//!
//! A pattern is a URI path followed by exactly [`MAX_TIME_LENGTH`] time
//! slots. A slot is either bound to an opaque byte string or free. A key
//! whose pattern leaves a slot free can decrypt any ciphertext regardless
//! of that slot's value; binding a slot pins it to one exact value. The
//! "matches" relation is therefore asymmetric: freer patterns match more
//! bound ones, never the other way around.

use std::fmt;

use bls12_381_plus::Scalar;
use sha3::{Digest, Sha3_256};

use crate::error::Result;
use crate::time::{TimeComponent, TimePath, MAX_TIME_LENGTH};
use crate::uri::{UriComponent, UriPath};
pub use crate::wkdibe::AttributeList;

/// A single pattern slot: `None` is free, `Some` is bound to exact bytes.
pub type Slot = Option<Vec<u8>>;

/// A component of a pattern, interpreted according to its slot index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternComponent {
    Uri(UriComponent),
    Time(TimeComponent),
}

impl fmt::Display for PatternComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternComponent::Uri(c) => fmt::Display::fmt(c, f),
            PatternComponent::Time(c) => fmt::Display::fmt(c, f),
        }
    }
}

/// Hashes opaque slot bytes into the scalar field, producing an attribute.
pub(crate) fn hash_to_scalar(bytes: &[u8]) -> Scalar {
    let mut okm = [0; 48];
    okm[..32].copy_from_slice(&Sha3_256::digest(bytes));
    Scalar::from_okm(&okm)
}

/// A fixed-length sequence of slots encoding a (URI, time) label.
///
/// The final [`MAX_TIME_LENGTH`] slots are time slots; everything before
/// them belongs to the URI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pattern(Vec<Slot>);

impl Pattern {
    /// Creates an all-free pattern with the given number of slots.
    pub fn new(length: usize) -> Pattern {
        Pattern(vec![None; length])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn slot(&self, index: usize) -> Option<&[u8]> {
        self.0[index].as_deref()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.0
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Slot] {
        &mut self.0
    }

    pub(crate) fn from_slots(slots: Vec<Slot>) -> Pattern {
        Pattern(slots)
    }

    /// Encodes a URI path and a time path into `into`. Panics if `into`
    /// has fewer than `uri.len() + MAX_TIME_LENGTH` slots.
    pub fn encode(uri: &UriPath, time: &TimePath, into: &mut Pattern) {
        assert!(
            into.len() >= uri.len() + MAX_TIME_LENGTH,
            "not enough space to encode pattern"
        );
        let boundary = into.len() - MAX_TIME_LENGTH;
        uri.encode_into(&mut into.0[..boundary]);
        time.encode_into(&mut into.0[boundary..]);
    }

    /// Decodes the pattern back into its URI and time paths. Only valid
    /// for patterns produced by [`Pattern::encode`], not for patterns a
    /// [`PatternEncoder`][crate::encoder::PatternEncoder] has tagged.
    pub fn decode(&self) -> Result<(UriPath, TimePath)> {
        assert!(
            self.len() >= MAX_TIME_LENGTH,
            "pattern is too short to be valid"
        );
        let boundary = self.len() - MAX_TIME_LENGTH;
        let uri = UriPath::decode_from(&self.0[..boundary])?;
        let time = TimePath::decode_from(&self.0[boundary..])?;
        Ok((uri, time))
    }

    /// Interprets the slot at `index` as a URI or time component. Returns
    /// `None` for free slots. Subject to the same caveat as
    /// [`Pattern::decode`].
    pub fn component(&self, index: usize) -> Option<Result<PatternComponent>> {
        let bytes = self.0[index].as_ref()?;
        Some(if index < self.len() - MAX_TIME_LENGTH {
            UriComponent::from_representation(bytes).map(PatternComponent::Uri)
        } else {
            TimeComponent::from_representation(bytes).map(PatternComponent::Time)
        })
    }

    /// The matching relation: every bound slot of `self` must be bound to
    /// the same bytes in `other`; free slots of `self` match anything.
    ///
    /// Panics if the patterns have different lengths; that is a contract
    /// violation, not a data error.
    pub fn matches(&self, other: &Pattern) -> bool {
        assert_eq!(
            self.len(),
            other.len(),
            "patterns must be the same length to check matching"
        );
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(p, q)| p.is_none() || p == q)
    }

    /// Hashes every bound slot to an attribute at its index.
    pub fn to_attrs(&self) -> AttributeList {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|bytes| (i, hash_to_scalar(bytes))))
            .collect()
    }

    /// Like [`Pattern::to_attrs`], but reuses attributes from `reference`
    /// wherever the corresponding slot is byte-identical, skipping the
    /// hash. Returns the attribute list and a flag that is `true` iff the
    /// two patterns agree on every slot, including freeness.
    ///
    /// Panics if the patterns have different lengths.
    pub fn to_attrs_with_reference(
        &self,
        reference: &Pattern,
        reference_attrs: &AttributeList,
    ) -> (AttributeList, bool) {
        assert_eq!(
            self.len(),
            reference.len(),
            "patterns must be the same length to share attributes"
        );
        let mut identical = true;
        let mut attrs = AttributeList::new();
        for (i, (slot, reference_slot)) in self.0.iter().zip(reference.0.iter()).enumerate() {
            if slot != reference_slot {
                identical = false;
            }
            let Some(bytes) = slot else { continue };
            let attr = if slot == reference_slot {
                match reference_attrs.get(&i) {
                    Some(&attr) => attr,
                    None => hash_to_scalar(bytes),
                }
            } else {
                hash_to_scalar(bytes)
            };
            attrs.insert(i, attr);
        }
        (attrs, identical)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_pattern(uri: &str) -> Pattern {
        let uri = UriPath::parse(uri).unwrap();
        let time = Utc.timestamp_opt(1564089385, 0).unwrap();
        let time = TimePath::from_timestamp(&time).unwrap();
        let mut pattern = Pattern::new(20);
        Pattern::encode(&uri, &time, &mut pattern);
        pattern
    }

    fn check_roundtrip(uri: &str, expected_time: &str) {
        let pattern = sample_pattern(uri);
        let (decoded_uri, decoded_time) = pattern.decode().unwrap();
        assert_eq!(decoded_uri.to_string(), uri);
        assert_eq!(decoded_time.to_string(), expected_time);
    }

    #[test]
    fn encode_decode() {
        check_roundtrip("a/b/c", "2019/7/5/25/4/21");
        check_roundtrip("a/b/c/*", "2019/7/5/25/4/21");
        check_roundtrip("a/+/c", "2019/7/5/25/4/21");
        check_roundtrip("a/+/c/*", "2019/7/5/25/4/21");
    }

    #[test]
    fn component_access() {
        let pattern = sample_pattern("a/b/c/*");
        assert_eq!(pattern.component(1).unwrap().unwrap().to_string(), "b");
        assert_eq!(pattern.component(18).unwrap().unwrap().to_string(), "4");
        assert!(pattern.component(10).is_none());
    }

    #[test]
    fn matching_is_asymmetric() {
        let prefix = sample_pattern("a/b/c/*");
        let full = sample_pattern("a/b/c");
        assert!(prefix.matches(&full));
        assert!(!full.matches(&prefix));
    }

    #[test]
    fn equal_patterns_match_both_ways() {
        let p = sample_pattern("a/+/c");
        let q = sample_pattern("a/+/c");
        assert_eq!(p, q);
        assert!(p.matches(&q));
        assert!(q.matches(&p));
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn matching_different_lengths_panics() {
        Pattern::new(19).matches(&Pattern::new(20));
    }

    #[test]
    fn attrs_skip_free_slots() {
        let pattern = sample_pattern("a/+/c");
        let attrs = pattern.to_attrs();
        assert!(attrs.contains_key(&0));
        assert!(!attrs.contains_key(&1));
        assert!(attrs.contains_key(&2));
        // terminator plus six time components
        assert_eq!(attrs.len(), 3 + 6);
    }

    #[test]
    fn reference_attrs_agree_with_fresh_hashing() {
        let p = sample_pattern("a/b/c");
        let later = Utc.timestamp_opt(1564089385 + 3600, 0).unwrap();
        let later = TimePath::from_timestamp(&later).unwrap();
        let mut q = Pattern::new(20);
        Pattern::encode(&UriPath::parse("a/b/c").unwrap(), &later, &mut q);

        let p_attrs = p.to_attrs();
        let (q_attrs, identical) = q.to_attrs_with_reference(&p, &p_attrs);
        assert!(!identical);
        assert_eq!(q_attrs, q.to_attrs());
    }

    #[test]
    fn reference_attrs_identical_flag() {
        let p = sample_pattern("a/b/c");
        let q = sample_pattern("a/b/c");
        let p_attrs = p.to_attrs();
        let (q_attrs, identical) = q.to_attrs_with_reference(&p, &p_attrs);
        assert!(identical);
        assert_eq!(q_attrs, p_attrs);
    }
}
