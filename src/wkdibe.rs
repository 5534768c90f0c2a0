//! The WKD-IBE primitive: wildcarded, key-delegable identity-based
//! encryption over BLS12-381.
//!
//! This is the construction of Abdalla, Kiltz and Neven built on the
//! Boneh–Boyen–Goh hierarchy, with identities generalized to *attribute
//! lists*: sparse maps from slot index to scalar. A ciphertext is encrypted
//! under an attribute list; a secret key carries one free-slot element per
//! unbound index and can be qualified down to any attribute list that
//! agrees with its bound slots. Qualification comes in two flavours:
//! [`qualify_key`] re-randomizes and produces a key safe to hand to
//! another party, while [`non_delegable_qualify_key`] skips the
//! re-randomization, which is far cheaper but makes the result unsafe to
//! delegate onward.
//!
//! Encryption cost is dominated by computing the attribute product
//! `g3 + Σ hᵢ·aᵢ`. [`prepare_attribute_list`] captures that product so it
//! can be reused, and [`adjust_prepared`] patches it when few slots change,
//! which is what makes encrypting along adjacent timestamps cheap.

use std::collections::BTreeMap;
use std::fmt;

use bls12_381_plus::{
    ff::Field,
    group::{Curve, Group},
    pairing, G1Affine, G2Affine, G2Projective, Gt, Scalar,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Attributes keyed by slot index. Scalars are `Copy`, so lists may freely
/// share values.
pub type AttributeList = BTreeMap<usize, Scalar>;

const G1_BYTES: usize = 48;
const G2_BYTES: usize = 96;
const GT_BYTES: usize = 576;

/// The marshalled length of a [`Ciphertext`], in bytes.
pub const CIPHERTEXT_BYTES: usize = GT_BYTES + G1_BYTES + G2_BYTES;

/// The length of the symmetric keys produced by [`hash_to_symmetric_key`].
pub const SYMMETRIC_KEY_BYTES: usize = 16;

/// Public parameters of a hierarchy.
///
/// The number of slots is fixed at [`setup`] and bounds the pattern length
/// the hierarchy supports.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    g: G1Affine,
    g1: G1Affine,
    g2: G2Affine,
    g3: G2Affine,
    hs: Vec<G2Affine>,
}

/// The master secret key, from which any slot pattern's key derives.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKey(G2Affine);

/// A secret key bound to the attributes it was generated or qualified
/// with. The `b` elements are what remains delegable: one per free slot.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKey {
    a0: G2Affine,
    a1: G1Affine,
    b: BTreeMap<usize, G2Affine>,
}

/// A WKD-IBE ciphertext: the encryption of a [`Gt`] element under an
/// attribute list.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    a: Gt,
    b: G1Affine,
    c: G2Affine,
}

/// The precomputed attribute product `g3 + Σ hᵢ·aᵢ` for one attribute
/// list, reusable across encryptions.
#[derive(Clone, PartialEq, Eq)]
pub struct PreparedAttributeList(G2Projective);

impl Params {
    /// The number of attribute slots this hierarchy supports.
    pub fn num_slots(&self) -> usize {
        self.hs.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + 2 * G1_BYTES + (2 + self.hs.len()) * G2_BYTES);
        buf.extend_from_slice(&(self.hs.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.g.to_compressed());
        buf.extend_from_slice(&self.g1.to_compressed());
        buf.extend_from_slice(&self.g2.to_compressed());
        buf.extend_from_slice(&self.g3.to_compressed());
        for h in &self.hs {
            buf.extend_from_slice(&h.to_compressed());
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Params> {
        if bytes.len() < 4 {
            return None;
        }
        let count = u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize;
        let expected = 4 + 2 * G1_BYTES + (2 + count) * G2_BYTES;
        if bytes.len() != expected {
            return None;
        }
        let mut cursor = Cursor(&bytes[4..]);
        let g = cursor.g1()?;
        let g1 = cursor.g1()?;
        let g2 = cursor.g2()?;
        let g3 = cursor.g2()?;
        let mut hs = Vec::with_capacity(count);
        for _ in 0..count {
            hs.push(cursor.g2()?);
        }
        Some(Params { g, g1, g2, g3, hs })
    }
}

impl SecretKey {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(G2_BYTES + G1_BYTES + 4 + self.b.len() * (4 + G2_BYTES));
        buf.extend_from_slice(&self.a0.to_compressed());
        buf.extend_from_slice(&self.a1.to_compressed());
        buf.extend_from_slice(&(self.b.len() as u32).to_le_bytes());
        for (&index, element) in &self.b {
            buf.extend_from_slice(&(index as u32).to_le_bytes());
            buf.extend_from_slice(&element.to_compressed());
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<SecretKey> {
        let mut cursor = Cursor(bytes);
        let a0 = cursor.g2()?;
        let a1 = cursor.g1()?;
        let count = cursor.u32()? as usize;
        let mut b = BTreeMap::new();
        for _ in 0..count {
            let index = cursor.u32()? as usize;
            b.insert(index, cursor.g2()?);
        }
        if !cursor.0.is_empty() {
            return None;
        }
        Some(SecretKey { a0, a1, b })
    }
}

impl Ciphertext {
    pub fn to_bytes(&self) -> [u8; CIPHERTEXT_BYTES] {
        let mut buf = [0u8; CIPHERTEXT_BYTES];
        buf[..GT_BYTES].copy_from_slice(&self.a.to_bytes());
        buf[GT_BYTES..GT_BYTES + G1_BYTES].copy_from_slice(&self.b.to_compressed());
        buf[GT_BYTES + G1_BYTES..].copy_from_slice(&self.c.to_compressed());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Ciphertext> {
        if bytes.len() != CIPHERTEXT_BYTES {
            return None;
        }
        let a = Option::from(Gt::from_bytes(bytes[..GT_BYTES].try_into().unwrap()))?;
        let mut cursor = Cursor(&bytes[GT_BYTES..]);
        let b = cursor.g1()?;
        let c = cursor.g2()?;
        Some(Ciphertext { a, b, c })
    }
}

struct Cursor<'a>(&'a [u8]);

impl Cursor<'_> {
    fn take(&mut self, n: usize) -> Option<&[u8]> {
        if self.0.len() < n {
            return None;
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Some(head)
    }

    fn u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn g1(&mut self) -> Option<G1Affine> {
        let bytes: [u8; G1_BYTES] = self.take(G1_BYTES)?.try_into().unwrap();
        Option::from(G1Affine::from_compressed(&bytes))
    }

    fn g2(&mut self) -> Option<G2Affine> {
        let bytes: [u8; G2_BYTES] = self.take(G2_BYTES)?.try_into().unwrap();
        Option::from(G2Affine::from_compressed(&bytes))
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(&bytes[..16])
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Params")
            .field(&fingerprint(&self.to_bytes()[4..]))
            .finish()
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MasterKey")
            .field(&fingerprint(&self.0.to_compressed()))
            .finish()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey")
            .field(&fingerprint(&self.to_bytes()))
            .finish()
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ciphertext")
            .field(&fingerprint(&self.to_bytes()))
            .finish()
    }
}

impl fmt::Debug for PreparedAttributeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PreparedAttributeList")
            .field(&fingerprint(&self.0.to_affine().to_compressed()))
            .finish()
    }
}

/// The attribute product `g3 + Σ hᵢ·aᵢ` at the heart of every operation.
fn attribute_product(params: &Params, attrs: &AttributeList) -> G2Projective {
    attrs
        .iter()
        .map(|(&index, attr)| params.hs[index] * attr)
        .sum::<G2Projective>()
        + params.g3
}

/// Sets a hierarchy up, returning its public parameters and master key.
pub fn setup<R: Rng>(mut rng: R, num_slots: usize) -> (Params, MasterKey) {
    let g = G1Affine::generator();
    let alpha = Scalar::random(&mut rng);
    let g1 = g * alpha;
    let g2 = G2Projective::random(&mut rng);
    let g3 = G2Projective::random(&mut rng);
    let hs = (0..num_slots)
        .map(|_| G2Projective::random(&mut rng))
        .map(Into::into)
        .collect();
    (
        Params {
            g,
            g1: g1.into(),
            g2: g2.into(),
            g3: g3.into(),
            hs,
        },
        MasterKey((g2 * alpha).into()),
    )
}

/// Generates a key for `attrs` from the master key. Slots absent from
/// `attrs` remain free: the key matches any value there and can be
/// qualified further down.
pub fn keygen<R: Rng>(
    rng: R,
    params: &Params,
    master: &MasterKey,
    attrs: &AttributeList,
) -> SecretKey {
    let r = Scalar::random(rng);
    SecretKey {
        a0: (master.0 + attribute_product(params, attrs) * r).into(),
        a1: (params.g * r).into(),
        b: (0..params.hs.len())
            .filter(|index| !attrs.contains_key(index))
            .map(|index| (index, (params.hs[index] * r).into()))
            .collect(),
    }
}

/// Derives a re-randomized key for `attrs` from a key whose bound slots
/// agree with `attrs`. The result remains delegable in the slots `attrs`
/// leaves free.
pub fn qualify_key<R: Rng>(
    rng: R,
    params: &Params,
    parent: &SecretKey,
    attrs: &AttributeList,
) -> SecretKey {
    let t = Scalar::random(rng);
    let mut a0 = G2Projective::from(parent.a0);
    for (index, attr) in attrs {
        if let Some(element) = parent.b.get(index) {
            a0 += element * attr;
        }
    }
    a0 += attribute_product(params, attrs) * t;
    SecretKey {
        a0: a0.into(),
        a1: (parent.a1 + params.g * t).into(),
        b: parent
            .b
            .iter()
            .filter(|(index, _)| !attrs.contains_key(index))
            .map(|(&index, element)| (index, (element + params.hs[index] * t).into()))
            .collect(),
    }
}

/// Derives a key for `attrs` from a key whose bound slots agree with
/// `attrs`, skipping re-randomization. Much cheaper than [`qualify_key`],
/// but the result is linkable to its parent and must not be delegated
/// onward. Slots outside `attrs` stay free and usable for further
/// non-delegable qualification.
pub fn non_delegable_qualify_key(
    _params: &Params,
    parent: &SecretKey,
    attrs: &AttributeList,
) -> SecretKey {
    let mut a0 = G2Projective::from(parent.a0);
    for (index, attr) in attrs {
        if let Some(element) = parent.b.get(index) {
            a0 += element * attr;
        }
    }
    SecretKey {
        a0: a0.into(),
        a1: parent.a1,
        b: parent
            .b
            .iter()
            .filter(|(index, _)| !attrs.contains_key(index))
            .map(|(&index, element)| (index, *element))
            .collect(),
    }
}

/// Precomputes the attribute product of `attrs` for reuse across
/// encryptions.
pub fn prepare_attribute_list(params: &Params, attrs: &AttributeList) -> PreparedAttributeList {
    PreparedAttributeList(attribute_product(params, attrs))
}

/// Patches a precomputed attribute product from `old` to `new`, touching
/// only the slots whose attributes differ.
pub fn adjust_prepared(
    prepared: &mut PreparedAttributeList,
    params: &Params,
    old: &AttributeList,
    new: &AttributeList,
) {
    for (&index, attr) in old {
        if new.get(&index) != Some(attr) {
            prepared.0 -= params.hs[index] * attr;
        }
    }
    for (&index, attr) in new {
        if old.get(&index) != Some(attr) {
            prepared.0 += params.hs[index] * attr;
        }
    }
}

/// Encrypts a group element under an attribute list.
pub fn encrypt<R: Rng>(
    rng: R,
    message: &Gt,
    params: &Params,
    attrs: &AttributeList,
) -> Ciphertext {
    encrypt_prepared(rng, message, params, &prepare_attribute_list(params, attrs))
}

/// Encrypts a group element using a precomputed attribute product.
pub fn encrypt_prepared<R: Rng>(
    rng: R,
    message: &Gt,
    params: &Params,
    prepared: &PreparedAttributeList,
) -> Ciphertext {
    let s = Scalar::random(rng);
    Ciphertext {
        a: pairing(&params.g1, &params.g2) * s + message,
        b: (params.g * s).into(),
        c: (prepared.0 * s).into(),
    }
}

/// Decrypts a ciphertext with a key qualified to exactly the ciphertext's
/// attribute list. A mismatched key yields a garbage group element, not an
/// error.
pub fn decrypt(ciphertext: &Ciphertext, key: &SecretKey) -> Gt {
    ciphertext.a + pairing(&key.a1, &ciphertext.c) - pairing(&ciphertext.b, &key.a0)
}

/// Hashes a group element into a symmetric key.
pub fn hash_to_symmetric_key(element: &Gt) -> [u8; SYMMETRIC_KEY_BYTES] {
    let mut key = [0; SYMMETRIC_KEY_BYTES];
    key.copy_from_slice(&Sha3_256::digest(element.to_bytes())[..SYMMETRIC_KEY_BYTES]);
    key
}
