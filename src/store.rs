//! The read-only interface to the application's key store.

use crate::error::Result;
use crate::pattern::Pattern;
use crate::wkdibe::{Params, SecretKey};

/// A read-only view of the keys and public parameters a principal holds.
///
/// This crate ships no implementation: every application this protocol has
/// been applied to already has its own mechanism for exchanging and storing
/// keys, and lifts it to this interface. The engine reads through it when
/// encrypting, decrypting, and creating delegations.
///
/// Implementations that talk to slow or remote storage may fail a call to
/// honor a deadline; such failures surface as
/// [`Error::Backend`][crate::error::Error::Backend] and leave no partial
/// state in the engine's caches.
pub trait KeyStoreReader: Send + Sync {
    /// Retrieves the WKD-IBE public parameters of a hierarchy.
    fn params_for_hierarchy(&self, hierarchy: &[u8]) -> Result<Params>;

    /// Retrieves a secret key whose native pattern matches `pattern`,
    /// together with the parameters it belongs to, or `None` if no held
    /// key covers the pattern.
    fn key_for_pattern(
        &self,
        hierarchy: &[u8],
        pattern: &Pattern,
    ) -> Result<Option<(Params, SecretKey)>>;
}
