//! Client-side engine for the JEDI end-to-end encryption protocol.
//!
//! # ⚠️ Warning: Cryptographic Hazmat ☣️
//!
//! This crate is made for playing around with JEDI and for prototyping of
//! applications and protocols built on wildcarded identity-based
//! encryption. It has *not* been audited, it is *not* battle tested, and
//! *nobody* claims it to be secure.
//!
//! Use it at **your own risk** and if you know what you are doing!
//!
//! # Introduction
//!
//! JEDI (Joining Encryption and Delegation for IoT) provides end-to-end
//! encryption for decoupled, many-to-many communication such as
//! publish/subscribe. A sender labels each message with a hierarchical
//! topic URI and a timestamp; only receivers holding a delegation covering
//! that topic prefix and time range can decrypt. The broker relaying
//! messages never joins the protocol and learns nothing beyond traffic
//! patterns.
//!
//! Labels are encoded as *patterns*: fixed-length slot vectors in which
//! each slot is bound to a value or left free. The underlying WKD-IBE
//! scheme (see [`wkdibe`]) lets a key whose pattern leaves slots free
//! decrypt every ciphertext those slots could take, and lets key holders
//! delegate narrower keys without involving any authority.
//!
//! # Crate Structure
//!
//! [`ClientState`] is the heart of the crate: a concurrent engine exposing
//! [`encrypt`][ClientState::encrypt], [`decrypt`][ClientState::decrypt],
//! and [`delegate`][ClientState::delegate], built around a bounded LRU
//! cache that pays the expensive pairing operations once per label change
//! instead of once per message.
//!
//! The supporting pieces are each a module: [`uri`] and [`time`] define
//! the two halves of a label, [`timerange`] decomposes an interval into
//! the minimal set of time prefixes a delegation must cover, [`pattern`]
//! defines the slot vectors and their attribute lists, [`encoder`] maps
//! labels to patterns, and [`wkdibe`] implements the pairing-based scheme
//! itself on top of [`bls12_381_plus`].
//!
//! Applications plug in their own key storage through
//! [`KeyStoreReader`]; this crate deliberately ships none, since every
//! deployment already has its own way of moving keys around.
//!
//! # Example
//!
//! ```
//! use jedi::{ClientState, DefaultPatternEncoder};
//! # use jedi::{KeyStoreReader, Pattern, wkdibe};
//! # use jedi::error::Result;
//! # struct SingleHierarchyStore {
//! #     params: wkdibe::Params,
//! #     master: wkdibe::MasterKey,
//! # }
//! # impl KeyStoreReader for SingleHierarchyStore {
//! #     fn params_for_hierarchy(&self, _h: &[u8]) -> Result<wkdibe::Params> {
//! #         Ok(self.params.clone())
//! #     }
//! #     fn key_for_pattern(
//! #         &self,
//! #         _h: &[u8],
//! #         _p: &Pattern,
//! #     ) -> Result<Option<(wkdibe::Params, wkdibe::SecretKey)>> {
//! #         let key = wkdibe::keygen(
//! #             rand::thread_rng(),
//! #             &self.params,
//! #             &self.master,
//! #             &Default::default(),
//! #         );
//! #         Ok(Some((self.params.clone(), key)))
//! #     }
//! # }
//! # let (params, master) = wkdibe::setup(rand::thread_rng(), 20);
//! # let store = SingleHierarchyStore { params, master };
//!
//! let state = ClientState::new(store, DefaultPatternEncoder::new(14), 1 << 24);
//! let now = chrono::Utc::now();
//!
//! let message = b"the eagle has landed";
//! let encrypted = state
//!     .encrypt(rand::thread_rng(), b"site0", "buildings/a/floor2/temp", &now, message)
//!     .unwrap();
//! let decrypted = state
//!     .decrypt(b"site0", "buildings/a/floor2/temp", &now, &encrypted)
//!     .unwrap();
//! assert_eq!(decrypted, message);
//! ```

pub mod delegate;
pub mod encoder;
pub mod error;
pub mod pattern;
pub mod store;
pub mod time;
pub mod timerange;
pub mod uri;
pub mod wkdibe;

mod cache;
mod marshal;
mod state;

pub use delegate::{delegate, delegate_parsed, delegate_patterns, Delegation, Permission};
pub use encoder::{DefaultPatternEncoder, PatternEncoder, PatternKind};
pub use error::{Error, Result};
pub use pattern::{AttributeList, Pattern, PatternComponent};
pub use state::{ClientState, BLOCK_BYTES, ENCRYPTED_KEY_BYTES, SYMMETRIC_KEY_BYTES};
pub use store::KeyStoreReader;
pub use time::{TimeComponent, TimePath, TimePosition, MAX_TIME_LENGTH};
pub use timerange::time_range;
pub use uri::{UriComponent, UriPath};
