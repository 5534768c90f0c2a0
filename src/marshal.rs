//! Deterministic binary encodings for patterns and delegations.
//!
//! Every marshalled object starts with a type byte, followed by
//! little-endian 32-bit lengths. Patterns are encoded sparsely: only bound
//! slots appear, each preceded by its index, so the mostly-free patterns of
//! broad delegations stay small.

use crate::delegate::Delegation;
use crate::error::{Error, Result};
use crate::pattern::{Pattern, Slot};
use crate::wkdibe::{Params, SecretKey};

const TYPE_PATTERN: u8 = 0x01;
const TYPE_DELEGATION: u8 = 0x02;

fn put_u32(buf: &mut Vec<u8>, value: usize) {
    buf.extend_from_slice(&(value as u32).to_le_bytes());
}

fn put_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(buf, bytes.len());
    buf.extend_from_slice(bytes);
}

struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn expect_type(&mut self, expected: u8) -> Result<()> {
        match self.take(1)? {
            [byte] if *byte == expected => Ok(()),
            _ => Err(Error::Marshal("unexpected type byte")),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.0.len() < n {
            return Err(Error::Marshal("input is truncated"));
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Ok(head)
    }

    fn u32(&mut self) -> Result<usize> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()) as usize)
    }

    fn take_prefixed(&mut self) -> Result<&'a [u8]> {
        let length = self.u32()?;
        self.take(length)
    }

    fn remaining(&self) -> usize {
        self.0.len()
    }
}

impl Pattern {
    /// Encodes this pattern into a byte vector.
    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1024);
        buf.push(TYPE_PATTERN);
        put_u32(&mut buf, self.len());

        let bound = |slot: &Slot| slot.as_deref().is_some_and(|bytes| !bytes.is_empty());
        let last = self
            .slots()
            .iter()
            .rposition(bound)
            .map_or(0, |index| index + 1);
        put_u32(&mut buf, last);

        for (index, slot) in self.slots()[..last].iter().enumerate() {
            if let Some(bytes) = slot {
                put_u32(&mut buf, index);
                put_prefixed(&mut buf, bytes);
            }
        }
        buf
    }

    /// Decodes a pattern previously encoded with [`Pattern::marshal`].
    pub fn unmarshal(marshalled: &[u8]) -> Result<Pattern> {
        let mut reader = Reader(marshalled);
        reader.expect_type(TYPE_PATTERN)?;

        let length = reader.u32()?;
        let last = reader.u32()?;
        if last > length || length > (1 << 16) {
            return Err(Error::Marshal("pattern bounds are inconsistent"));
        }

        let mut slots: Vec<Slot> = vec![None; length];
        let mut previous: Option<usize> = None;
        while previous.map_or(0, |i| i + 1) != last {
            let index = reader.u32()?;
            if index >= last || previous.is_some_and(|i| index <= i) {
                return Err(Error::Marshal("pattern slot indices are not increasing"));
            }
            let bytes = reader.take_prefixed()?;
            slots[index] = Some(bytes.to_vec());
            previous = Some(index);
        }
        Ok(Pattern::from_slots(slots))
    }
}

impl Delegation {
    /// Encodes this delegation into a byte vector.
    ///
    /// Panics if the pattern and key lists have different lengths.
    pub fn marshal(&self) -> Vec<u8> {
        assert_eq!(
            self.patterns.len(),
            self.keys.len(),
            "delegation patterns and keys must correspond pairwise"
        );

        let mut buf = Vec::with_capacity(4096);
        buf.push(TYPE_DELEGATION);
        put_prefixed(&mut buf, &self.hierarchy);
        put_prefixed(&mut buf, &self.params.to_bytes());
        put_u32(&mut buf, self.patterns.len());
        for (pattern, key) in self.patterns.iter().zip(self.keys.iter()) {
            put_prefixed(&mut buf, &pattern.marshal());
            put_prefixed(&mut buf, &key.to_bytes());
        }
        buf
    }

    /// Decodes a delegation previously encoded with
    /// [`Delegation::marshal`].
    pub fn unmarshal(marshalled: &[u8]) -> Result<Delegation> {
        let mut reader = Reader(marshalled);
        reader.expect_type(TYPE_DELEGATION)?;

        let hierarchy = reader.take_prefixed()?.to_vec();
        let params = Params::from_bytes(reader.take_prefixed()?)
            .ok_or(Error::Marshal("embedded params rejected"))?;

        let count = reader.u32()?;
        if count > reader.remaining() {
            return Err(Error::Marshal("delegation entry count is inconsistent"));
        }
        let mut patterns = Vec::with_capacity(count);
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            patterns.push(Pattern::unmarshal(reader.take_prefixed()?)?);
            keys.push(
                SecretKey::from_bytes(reader.take_prefixed()?)
                    .ok_or(Error::Marshal("embedded secret key rejected"))?,
            );
        }

        Ok(Delegation {
            hierarchy,
            params,
            patterns,
            keys,
        })
    }
}
