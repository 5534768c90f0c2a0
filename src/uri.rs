//! Representation and parsing of hierarchical resource URIs.
//!
//! A URI such as `a/b/c` names a single resource; `a/b/*` names the whole
//! subtree below `a/b`. A `+` segment leaves that level unspecified, to be
//! filled in by whoever the URI is delegated to. Internally a URI is a list
//! of positioned components; non-prefix URIs additionally carry a terminator
//! component so that holding `a/b` does not permit delegating `a/b/c`.

use std::fmt;

use crate::error::{Error, Result};
use crate::pattern::Slot;

/// The sentinel appended to non-prefix URIs to prevent further delegation.
pub const END_OF_URI_SYMBOL: &str = "$";

/// A single bound component of a [`UriPath`].
///
/// Carries its 0-indexed position within the URI alongside its name, so that
/// the same name at different depths hashes to different attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UriComponent {
    position: u8,
    name: String,
}

impl UriComponent {
    pub fn new(name: &str, position: u8) -> Self {
        UriComponent {
            position,
            name: name.to_owned(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> u8 {
        self.position
    }

    /// The byte representation used in pattern slots: the position byte
    /// followed by the component name.
    pub fn representation(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.name.len());
        bytes.push(self.position);
        bytes.extend_from_slice(self.name.as_bytes());
        bytes
    }

    pub(crate) fn from_representation(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::Marshal("URI component too short"));
        }
        let name = std::str::from_utf8(&bytes[1..])
            .map_err(|_| Error::Marshal("URI component name is not valid UTF-8"))?;
        Ok(UriComponent::new(name, bytes[0]))
    }
}

impl fmt::Display for UriComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A parsed URI or URI prefix.
///
/// Slots holding `None` correspond to `+` segments. The list ends with a
/// [`END_OF_URI_SYMBOL`] component unless the URI was a prefix (`.../*`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct UriPath(Vec<Option<UriComponent>>);

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != END_OF_URI_SYMBOL
}

impl UriPath {
    /// Parses a URI string such as `"a/b/c"`, `"a/+/c"` or `"a/b/*"`.
    ///
    /// Empty segments (from doubled or leading/trailing slashes) are
    /// dropped, as is conventional for topic strings.
    pub fn parse(uri: &str) -> Result<UriPath> {
        let segments: Vec<&str> = uri.split('/').filter(|s| !s.is_empty()).collect();
        UriPath::from_segments(&segments)
    }

    /// Builds a [`UriPath`] from already-split segments.
    pub fn from_segments(segments: &[&str]) -> Result<UriPath> {
        if segments.len() >= 256 {
            return Err(Error::InvalidUri("too many components".to_owned()));
        }
        let mut prefix = false;
        let mut components = Vec::with_capacity(segments.len() + 1);
        for (i, &segment) in segments.iter().enumerate() {
            if !valid_segment(segment) {
                return Err(Error::InvalidUri(format!(
                    "'{}' is not a valid URI component",
                    segment
                )));
            }
            if segment == "*" {
                if i == segments.len() - 1 {
                    prefix = true;
                } else {
                    return Err(Error::InvalidUri(
                        "wildcard '*' not allowed in middle of URI".to_owned(),
                    ));
                }
            } else if segment == "+" {
                components.push(None);
            } else {
                components.push(Some(UriComponent::new(segment, i as u8)));
            }
        }

        if !prefix {
            let terminator = UriComponent::new(END_OF_URI_SYMBOL, segments.len() as u8);
            components.push(Some(terminator));
        }

        Ok(UriPath(components))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn components(&self) -> &[Option<UriComponent>] {
        &self.0
    }

    /// Whether this path represents a URI prefix (parsed from `.../*`).
    pub fn is_prefix(&self) -> bool {
        !matches!(self.0.last(), Some(Some(c)) if c.name() == END_OF_URI_SYMBOL)
    }

    /// Writes this path into the URI portion of a pattern. Panics if `into`
    /// is shorter than the path.
    pub fn encode_into(&self, into: &mut [Slot]) {
        assert!(
            into.len() >= self.0.len(),
            "not enough space to encode URI path"
        );
        for (slot, component) in into.iter_mut().zip(self.0.iter()) {
            *slot = component.as_ref().map(UriComponent::representation);
        }
        for slot in into.iter_mut().skip(self.0.len()) {
            *slot = None;
        }
    }

    /// Reads a path back out of the URI portion of a pattern, trimming
    /// trailing free slots.
    pub fn decode_from(from: &[Slot]) -> Result<UriPath> {
        let len = from
            .iter()
            .rposition(|slot| slot.is_some())
            .map_or(0, |i| i + 1);
        let mut components = Vec::with_capacity(len);
        for slot in &from[..len] {
            components.push(match slot {
                Some(bytes) => Some(UriComponent::from_representation(bytes)?),
                None => None,
            });
        }
        Ok(UriPath(components))
    }

    /// Marshals this path: a count byte, then each component's
    /// representation terminated by `0xFF`. Free slots are zero-length.
    pub fn to_bytes(&self) -> Vec<u8> {
        let length: usize = self
            .0
            .iter()
            .map(|c| c.as_ref().map_or(0, |c| 1 + c.name().len()))
            .sum();
        let mut buf = Vec::with_capacity(1 + length + self.0.len());
        buf.push(self.0.len() as u8);
        for component in &self.0 {
            if let Some(component) = component {
                buf.extend_from_slice(&component.representation());
            }
            buf.push(0xff);
        }
        buf
    }

    /// Unmarshals a path previously produced by [`UriPath::to_bytes`].
    pub fn from_bytes(marshalled: &[u8]) -> Result<UriPath> {
        let &count = marshalled
            .first()
            .ok_or(Error::Marshal("URI path is empty"))?;
        let mut components = Vec::with_capacity(count as usize);
        let mut start = 1;
        for (i, &byte) in marshalled.iter().enumerate().skip(1) {
            if byte == 0xff {
                if start == i {
                    components.push(None);
                } else {
                    components.push(Some(UriComponent::from_representation(
                        &marshalled[start..i],
                    )?));
                }
                start = i + 1;
            }
        }
        if components.len() != count as usize {
            return Err(Error::Marshal("URI component count mismatch"));
        }
        Ok(UriPath(components))
    }
}

impl fmt::Display for UriPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("*");
        }
        let mut segments: Vec<&str> = self
            .0
            .iter()
            .map(|c| c.as_ref().map_or("+", |c| c.name()))
            .collect();
        if segments.last() == Some(&END_OF_URI_SYMBOL) {
            segments.pop();
        } else {
            segments.push("*");
        }
        f.write_str(&segments.join("/"))
    }
}
