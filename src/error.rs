use thiserror::Error;

/// Errors surfaced by this crate.
///
/// Contract violations (for example, checking whether two patterns of
/// different lengths match) are not represented here; they panic.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid URI: {0}")]
    InvalidUri(String),
    #[error("invalid time: {0}")]
    InvalidTime(String),
    #[error("the encrypted key bytes do not parse as a WKD-IBE ciphertext")]
    MalformedCiphertext,
    #[error("the ciphertext is too short to contain an encrypted key and an IV")]
    CiphertextTooShort,
    #[error("no key held for the requested pattern: requisite delegation(s) not received")]
    NoKeyForPattern,
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("unmarshalling failed: {0}")]
    Marshal(&'static str),
}

impl Error {
    /// Wraps an arbitrary error reported by a key store or parameter source.
    pub fn backend<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        Error::Backend(Box::new(err))
    }
}

pub type Result<V, E = Error> = std::result::Result<V, E>;
