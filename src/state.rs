//! The client engine: cached hybrid encryption and decryption.
//!
//! Every ciphertext is a WKD-IBE encapsulation of a fresh 16-byte symmetric
//! key followed by an AES-CTR encryption of the payload. The engine keeps a
//! bounded cache so that the expensive pairing work is paid once per state
//! transition: one encapsulation per (URI, pattern) change on the sending
//! side, one decapsulation per distinct encrypted key on the receiving
//! side. Everything else is symmetric-key work.

use aes::cipher::{KeyIvInit, StreamCipher};
use chrono::{DateTime, TimeZone};
use rand::{CryptoRng, Rng};
use tracing::debug;

use crate::cache::{
    decryption_entry_size, encryption_entry_size, hierarchy_entry_size, CacheKey, CacheValue,
    DecryptionEntry, EncryptionEntry, MemoryCache,
};
use crate::delegate::{self, Delegation, Permission};
use crate::encoder::{PatternEncoder, PatternKind};
use crate::error::{Error, Result};
use crate::pattern::Pattern;
use crate::store::KeyStoreReader;
use crate::time::TimePath;
use crate::uri::UriPath;
use crate::wkdibe;
use std::sync::Arc;

use bls12_381_plus::{ff::Field, group::Group, Gt, Scalar};

/// The length of the symmetric key encapsulated in every ciphertext.
pub use crate::wkdibe::SYMMETRIC_KEY_BYTES;

/// The length of the WKD-IBE encapsulation at the front of every
/// ciphertext.
pub const ENCRYPTED_KEY_BYTES: usize = wkdibe::CIPHERTEXT_BYTES;

/// The AES block length; the CTR IV occupies one block.
pub const BLOCK_BYTES: usize = 16;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

fn ctr_encrypt<R: Rng + CryptoRng>(
    mut rng: R,
    out: &mut [u8],
    message: &[u8],
    key: &[u8; SYMMETRIC_KEY_BYTES],
) {
    let (iv, body) = out.split_at_mut(BLOCK_BYTES);
    rng.fill_bytes(iv);
    body.copy_from_slice(message);
    let iv: &[u8; BLOCK_BYTES] = (&*iv).try_into().expect("IV is one block");
    let mut cipher = Aes128Ctr::new(key.into(), iv.into());
    cipher.apply_keystream(body);
}

fn ctr_decrypt(out: &mut [u8], encrypted: &[u8], key: &[u8; SYMMETRIC_KEY_BYTES]) {
    let (iv, body) = encrypted.split_at(BLOCK_BYTES);
    out.copy_from_slice(body);
    let iv: &[u8; BLOCK_BYTES] = iv.try_into().expect("IV is one block");
    let mut cipher = Aes128Ctr::new(key.into(), iv.into());
    cipher.apply_keystream(out);
}

/// The state a principal keeps in memory to accelerate encryption and
/// decryption.
///
/// All operations may run concurrently on a shared reference. The cache
/// capacity is a byte budget covering public parameters, per-URI
/// encryption state, and per-ciphertext decryption state together.
pub struct ClientState<K, E> {
    store: K,
    encoder: E,
    cache: MemoryCache,
}

impl<K: KeyStoreReader, E: PatternEncoder> ClientState<K, E> {
    /// Creates a client with the given key store, pattern encoder, and
    /// cache capacity in bytes.
    pub fn new(store: K, encoder: E, capacity: u64) -> Self {
        ClientState {
            store,
            encoder,
            cache: MemoryCache::new(capacity),
        }
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    fn params(&self, hierarchy: &[u8]) -> Result<Arc<wkdibe::Params>> {
        let value = self
            .cache
            .get_or_load(CacheKey::Hierarchy(hierarchy.to_vec()), |key| {
                let params = self.store.params_for_hierarchy(hierarchy)?;
                let size = hierarchy_entry_size(key, &params);
                Ok((CacheValue::Params(Arc::new(params)), size))
            })?;
        match value {
            CacheValue::Params(params) => Ok(params),
            _ => unreachable!("hierarchy key loaded a non-params value"),
        }
    }

    fn encryption_entry(&self, hierarchy: &[u8], uri: &UriPath) -> Result<Arc<EncryptionEntry>> {
        let key = CacheKey::Encryption {
            hierarchy: hierarchy.to_vec(),
            uri: uri.clone(),
        };
        let value = self.cache.get_or_load(key, |key| {
            let size = encryption_entry_size(key);
            Ok((CacheValue::Encryption(Arc::new(EncryptionEntry::default())), size))
        })?;
        match value {
            CacheValue::Encryption(entry) => Ok(entry),
            _ => unreachable!("encryption key loaded a non-encryption value"),
        }
    }

    fn decryption_entry(
        &self,
        hierarchy: &[u8],
        encapsulation: &[u8],
    ) -> Result<Arc<DecryptionEntry>> {
        let key = CacheKey::Decryption {
            hierarchy: hierarchy.to_vec(),
            encapsulation: encapsulation.to_vec(),
        };
        let value = self.cache.get_or_load(key, |key| {
            let size = decryption_entry_size(key);
            Ok((CacheValue::Decryption(Arc::new(DecryptionEntry::default())), size))
        })?;
        match value {
            CacheValue::Decryption(entry) => Ok(entry),
            _ => unreachable!("decryption key loaded a non-decryption value"),
        }
    }

    /// Encrypts a message sent on `uri` at `timestamp`.
    ///
    /// The timestamp should almost always be the current time. Any URI and
    /// time combination works, but moving chronologically on a single URI
    /// gives the best performance, because each hour's pattern is then one
    /// adjustment away from the previous one.
    pub fn encrypt<R: Rng + CryptoRng, Tz: TimeZone>(
        &self,
        rng: R,
        hierarchy: &[u8],
        uri: &str,
        timestamp: &DateTime<Tz>,
        message: &[u8],
    ) -> Result<Vec<u8>> {
        let uri_path = UriPath::parse(uri)?;
        let time_path = TimePath::from_timestamp(timestamp)?;
        let pattern = self
            .encoder
            .encode(&uri_path, &time_path, PatternKind::Decryption);
        self.encrypt_with_pattern(rng, hierarchy, &uri_path, &pattern, message)
    }

    /// Like [`ClientState::encrypt`], but with the URI already parsed and
    /// the pattern already encoded.
    pub fn encrypt_with_pattern<R: Rng + CryptoRng>(
        &self,
        mut rng: R,
        hierarchy: &[u8],
        uri_path: &UriPath,
        pattern: &Pattern,
        message: &[u8],
    ) -> Result<Vec<u8>> {
        let params = self.params(hierarchy)?;
        let entry = self.encryption_entry(hierarchy, uri_path)?;

        let mut out = vec![0u8; ENCRYPTED_KEY_BYTES + BLOCK_BYTES + message.len()];
        let mut key = [0u8; SYMMETRIC_KEY_BYTES];

        // Optimistically assume the pattern is unchanged since the last
        // encryption on this URI and a read lock suffices.
        let mut have_key = false;
        {
            let state = entry.state.read().unwrap();
            if state.pattern.as_ref() == Some(pattern) {
                key = state.key;
                let encrypted_key = state
                    .encrypted_key
                    .as_ref()
                    .expect("cached pattern implies cached encapsulation");
                out[..ENCRYPTED_KEY_BYTES].copy_from_slice(&encrypted_key.to_bytes());
                have_key = true;
            }
        }

        if !have_key {
            let mut guard = entry.state.write().unwrap();
            let state = &mut *guard;

            let mut update = false;
            let attrs = match &state.pattern {
                None => {
                    let attrs = pattern.to_attrs();
                    state.prepared = Some(wkdibe::prepare_attribute_list(&params, &attrs));
                    update = true;
                    attrs
                }
                Some(cached) => {
                    // Another writer may have filled the entry between our
                    // read unlock and write lock; re-compare before paying
                    // for an adjustment.
                    let (attrs, identical) = pattern.to_attrs_with_reference(cached, &state.attrs);
                    if !identical {
                        let prepared = state
                            .prepared
                            .as_mut()
                            .expect("cached pattern implies cached precomputation");
                        wkdibe::adjust_prepared(prepared, &params, &state.attrs, &attrs);
                        update = true;
                    }
                    attrs
                }
            };

            if update {
                debug!(uri = %uri_path, "pattern changed, re-encapsulating");
                state.pattern = Some(pattern.clone());
                state.attrs = attrs;

                let secret = Gt::generator() * Scalar::random(&mut rng);
                state.key = wkdibe::hash_to_symmetric_key(&secret);
                let prepared = state
                    .prepared
                    .as_ref()
                    .expect("precomputation set on every update path");
                state.encrypted_key =
                    Some(wkdibe::encrypt_prepared(&mut rng, &secret, &params, prepared));
            }

            key = state.key;
            let encrypted_key = state
                .encrypted_key
                .as_ref()
                .expect("entry is populated at this point");
            out[..ENCRYPTED_KEY_BYTES].copy_from_slice(&encrypted_key.to_bytes());
        }

        ctr_encrypt(rng, &mut out[ENCRYPTED_KEY_BYTES..], message, &key);
        Ok(out)
    }

    /// Decrypts a ciphertext produced by [`ClientState::encrypt`].
    ///
    /// The message's integrity (for example, its signature) must be
    /// verified *before* calling this. Otherwise an attacker can present a
    /// ciphertext under the wrong URI or time, causing an incorrect
    /// symmetric key to be cached and denying service to later legitimate
    /// messages reusing that encapsulation.
    pub fn decrypt<Tz: TimeZone>(
        &self,
        hierarchy: &[u8],
        uri: &str,
        timestamp: &DateTime<Tz>,
        encrypted: &[u8],
    ) -> Result<Vec<u8>> {
        if encrypted.len() < ENCRYPTED_KEY_BYTES + BLOCK_BYTES {
            return Err(Error::CiphertextTooShort);
        }
        let (encrypted_key, encrypted_message) = encrypted.split_at(ENCRYPTED_KEY_BYTES);
        self.decrypt_separated(hierarchy, uri, timestamp, encrypted_key, encrypted_message)
    }

    /// Like [`ClientState::decrypt`], but with the encapsulated key and
    /// the symmetric ciphertext in separate buffers.
    pub fn decrypt_separated<Tz: TimeZone>(
        &self,
        hierarchy: &[u8],
        uri: &str,
        timestamp: &DateTime<Tz>,
        encrypted_key: &[u8],
        encrypted_message: &[u8],
    ) -> Result<Vec<u8>> {
        let uri_path = UriPath::parse(uri)?;
        let time_path = TimePath::from_timestamp(timestamp)?;
        let pattern = self
            .encoder
            .encode(&uri_path, &time_path, PatternKind::Decryption);
        self.decrypt_with_pattern(hierarchy, &pattern, encrypted_key, encrypted_message)
    }

    /// Like [`ClientState::decrypt`], but with the pattern already formed,
    /// for callers that transmit the pattern alongside the message.
    pub fn decrypt_with_pattern(
        &self,
        hierarchy: &[u8],
        pattern: &Pattern,
        encrypted_key: &[u8],
        encrypted_message: &[u8],
    ) -> Result<Vec<u8>> {
        if encrypted_key.len() != ENCRYPTED_KEY_BYTES || encrypted_message.len() < BLOCK_BYTES {
            return Err(Error::CiphertextTooShort);
        }

        let entry = self.decryption_entry(hierarchy, encrypted_key)?;

        // Optimistically assume we have decapsulated this key before and a
        // read lock suffices.
        let mut key = [0u8; SYMMETRIC_KEY_BYTES];
        let mut have_key = false;
        {
            let cached = entry.key.read().unwrap();
            if let Some(cached) = *cached {
                key = cached;
                have_key = true;
            }
        }

        if !have_key {
            let mut cached = entry.key.write().unwrap();
            // Another thread may have decapsulated while we waited for the
            // write lock; check again before paying for pairings.
            match *cached {
                Some(existing) => key = existing,
                None => {
                    let ciphertext = wkdibe::Ciphertext::from_bytes(encrypted_key)
                        .ok_or(Error::MalformedCiphertext)?;
                    let (params, secret_key) = self
                        .store
                        .key_for_pattern(hierarchy, pattern)?
                        .ok_or(Error::NoKeyForPattern)?;
                    let qualified = wkdibe::non_delegable_qualify_key(
                        &params,
                        &secret_key,
                        &pattern.to_attrs(),
                    );
                    let secret = wkdibe::decrypt(&ciphertext, &qualified);
                    key = wkdibe::hash_to_symmetric_key(&secret);
                    *cached = Some(key);
                }
            }
        }

        let mut out = vec![0u8; encrypted_message.len() - BLOCK_BYTES];
        ctr_decrypt(&mut out, encrypted_message, &key);
        Ok(out)
    }

    /// Creates a delegation conveying `permissions` on `uri` for
    /// `[start, end]`, using this client's key store and encoder.
    pub fn delegate<Tz: TimeZone>(
        &self,
        hierarchy: &[u8],
        uri: &str,
        start: &DateTime<Tz>,
        end: &DateTime<Tz>,
        permissions: Permission,
    ) -> Result<Delegation> {
        delegate::delegate(
            &self.store,
            &self.encoder,
            hierarchy,
            uri,
            start,
            end,
            permissions,
        )
    }
}
