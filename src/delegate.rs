//! Construction of delegations: bundles of keys conveying permissions on a
//! URI or URI prefix over a time range.

use std::ops::{BitOr, BitOrAssign};

use chrono::{DateTime, TimeZone};
use tracing::debug;

use crate::encoder::{PatternEncoder, PatternKind};
use crate::error::{Error, Result};
use crate::pattern::Pattern;
use crate::store::KeyStoreReader;
use crate::time::TimePath;
use crate::timerange::time_range;
use crate::uri::UriPath;
use crate::wkdibe::{self, Params, SecretKey};

/// The kind of access a delegation grants. Permissions combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permission(u32);

impl Permission {
    pub const DECRYPT: Permission = Permission(0x1);
    pub const SIGN: Permission = Permission(0x2);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Permission) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Permission) -> Permission {
        Permission(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permission {
    fn bitor_assign(&mut self, rhs: Permission) {
        self.0 |= rhs.0;
    }
}

/// A bundle of non-delegable keys granting permissions.
///
/// Patterns and keys correspond pairwise: `keys[i]` is qualified to exactly
/// the attributes of `patterns[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub hierarchy: Vec<u8>,
    pub params: Params,
    pub patterns: Vec<Pattern>,
    pub keys: Vec<SecretKey>,
}

/// Creates a delegation conveying `permissions` on a URI or URI prefix for
/// the closed time range `[start, end]`.
pub fn delegate<K, E, Tz>(
    store: &K,
    encoder: &E,
    hierarchy: &[u8],
    uri: &str,
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
    permissions: Permission,
) -> Result<Delegation>
where
    K: KeyStoreReader + ?Sized,
    E: PatternEncoder + ?Sized,
    Tz: TimeZone,
{
    let uri_path = UriPath::parse(uri)?;
    let time_paths = time_range(start, end)?;
    delegate_parsed(store, encoder, hierarchy, &uri_path, &time_paths, permissions)
}

/// Creates a delegation conveying `permissions` on a URI for an explicit
/// set of time prefixes.
pub fn delegate_parsed<K, E>(
    store: &K,
    encoder: &E,
    hierarchy: &[u8],
    uri_path: &UriPath,
    time_paths: &[TimePath],
    permissions: Permission,
) -> Result<Delegation>
where
    K: KeyStoreReader + ?Sized,
    E: PatternEncoder + ?Sized,
{
    let decrypt = permissions.contains(Permission::DECRYPT);
    let sign = permissions.contains(Permission::SIGN);

    let mut num_patterns = time_paths.len();
    if decrypt && sign {
        num_patterns <<= 1;
    }
    let mut patterns = Vec::with_capacity(num_patterns);

    for (i, time_path) in time_paths.iter().enumerate() {
        if decrypt {
            patterns.push(encoder.encode(uri_path, time_path, PatternKind::Decryption));
        }
        if sign {
            patterns.push(encoder.encode(uri_path, time_path, PatternKind::Signing));
        }

        // Reorder every other pair for efficient delta compression.
        if decrypt && sign && i & 0x1 == 0x1 {
            let j = i << 1;
            patterns.swap(j, j + 1);
        }
    }

    delegate_patterns(store, hierarchy, patterns)
}

/// Creates a delegation granting exactly the provided patterns.
///
/// Panics if `patterns` is empty; delegating nothing is a programming
/// error.
pub fn delegate_patterns<K>(
    store: &K,
    hierarchy: &[u8],
    patterns: Vec<Pattern>,
) -> Result<Delegation>
where
    K: KeyStoreReader + ?Sized,
{
    assert!(!patterns.is_empty(), "a delegation must convey at least one pattern");

    let mut hierarchy_params: Option<Params> = None;
    let mut keys = Vec::with_capacity(patterns.len());
    for pattern in &patterns {
        let (params, key) = store
            .key_for_pattern(hierarchy, pattern)?
            .ok_or(Error::NoKeyForPattern)?;
        keys.push(wkdibe::non_delegable_qualify_key(
            &params,
            &key,
            &pattern.to_attrs(),
        ));
        if hierarchy_params.is_none() {
            hierarchy_params = Some(params);
        }
    }

    debug!(patterns = patterns.len(), "built delegation");
    Ok(Delegation {
        hierarchy: hierarchy.to_vec(),
        params: hierarchy_params.expect("at least one pattern was processed"),
        patterns,
        keys,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoder::DefaultPatternEncoder;
    use crate::state::test::{TestKeyStore, TEST_HIERARCHY, TEST_PATTERN_SIZE};
    use crate::time::MAX_TIME_LENGTH;
    use chrono::{TimeZone, Utc};

    fn check_delegation(uri: &str) {
        let store = TestKeyStore::new();
        let encoder = DefaultPatternEncoder::new(TEST_PATTERN_SIZE - MAX_TIME_LENGTH);
        let start = Utc.timestamp_opt(1565119330, 0).unwrap();
        let end = Utc.timestamp_opt(1565219330, 0).unwrap();

        let delegation = delegate(
            &store,
            &encoder,
            TEST_HIERARCHY,
            uri,
            &start,
            &end,
            Permission::DECRYPT | Permission::SIGN,
        )
        .unwrap();
        assert_eq!(delegation.patterns.len(), delegation.keys.len());

        let uri_path = UriPath::parse(uri).unwrap();
        let mut hour = start;
        while hour < end {
            let time_path = TimePath::from_timestamp(&hour).unwrap();
            for kind in [PatternKind::Decryption, PatternKind::Signing] {
                let target = encoder.encode(&uri_path, &time_path, kind);
                assert!(
                    delegation.patterns.iter().any(|p| p.matches(&target)),
                    "delegation lacks a key for {} ({:?})",
                    hour,
                    kind
                );
            }
            hour = hour + chrono::Duration::hours(1);
        }
    }

    #[test]
    fn covers_uri_prefix() {
        check_delegation("a/b/c/*");
    }

    #[test]
    fn covers_full_uri() {
        check_delegation("a/b/c/d");
    }

    #[test]
    fn interleaves_kinds_for_delta_compression() {
        let store = TestKeyStore::new();
        let encoder = DefaultPatternEncoder::new(TEST_PATTERN_SIZE - MAX_TIME_LENGTH);
        let uri_path = UriPath::parse("a/b").unwrap();
        let time_paths = vec![
            TimePath::from_quantities(&[2019, 7, 5, 25, 4, 21]).unwrap(),
            TimePath::from_quantities(&[2019, 7, 5, 25, 4, 22]).unwrap(),
            TimePath::from_quantities(&[2019, 7, 5, 25, 4, 23]).unwrap(),
        ];

        let delegation = delegate_parsed(
            &store,
            &encoder,
            TEST_HIERARCHY,
            &uri_path,
            &time_paths,
            Permission::DECRYPT | Permission::SIGN,
        )
        .unwrap();

        let expected_kinds = [
            PatternKind::Decryption,
            PatternKind::Signing,
            PatternKind::Signing,
            PatternKind::Decryption,
            PatternKind::Decryption,
            PatternKind::Signing,
        ];
        assert_eq!(delegation.patterns.len(), expected_kinds.len());
        for (pattern, expected) in delegation.patterns.iter().zip(expected_kinds) {
            let tag = pattern.slot(0).unwrap()[0];
            let kind = if tag == 0 {
                PatternKind::Decryption
            } else {
                PatternKind::Signing
            };
            assert_eq!(kind, expected);
        }
    }

    #[test]
    fn single_permission_delegation() {
        let store = TestKeyStore::new();
        let encoder = DefaultPatternEncoder::new(TEST_PATTERN_SIZE - MAX_TIME_LENGTH);
        let start = Utc.with_ymd_and_hms(2019, 7, 25, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2019, 7, 25, 12, 0, 0).unwrap();

        let delegation = delegate(
            &store,
            &encoder,
            TEST_HIERARCHY,
            "a/b/*",
            &start,
            &end,
            Permission::DECRYPT,
        )
        .unwrap();
        for pattern in &delegation.patterns {
            assert_eq!(pattern.slot(0).unwrap()[0], 0);
        }
    }

    #[test]
    fn missing_key_fails() {
        struct EmptyStore;
        impl KeyStoreReader for EmptyStore {
            fn params_for_hierarchy(&self, _hierarchy: &[u8]) -> Result<Params> {
                Err(Error::NoKeyForPattern)
            }
            fn key_for_pattern(
                &self,
                _hierarchy: &[u8],
                _pattern: &Pattern,
            ) -> Result<Option<(Params, SecretKey)>> {
                Ok(None)
            }
        }

        let encoder = DefaultPatternEncoder::new(TEST_PATTERN_SIZE - MAX_TIME_LENGTH);
        let start = Utc.with_ymd_and_hms(2019, 7, 25, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2019, 7, 25, 12, 0, 0).unwrap();
        assert!(matches!(
            delegate(
                &EmptyStore,
                &encoder,
                TEST_HIERARCHY,
                "a/b/*",
                &start,
                &end,
                Permission::DECRYPT,
            ),
            Err(Error::NoKeyForPattern)
        ));
    }

    /// A key store backed by a single received delegation, the way a
    /// subscriber would hold one.
    struct DelegationStore(Delegation);

    impl KeyStoreReader for DelegationStore {
        fn params_for_hierarchy(&self, _hierarchy: &[u8]) -> Result<Params> {
            Ok(self.0.params.clone())
        }

        fn key_for_pattern(
            &self,
            _hierarchy: &[u8],
            pattern: &Pattern,
        ) -> Result<Option<(Params, SecretKey)>> {
            for (candidate, key) in self.0.patterns.iter().zip(self.0.keys.iter()) {
                if candidate.matches(pattern) {
                    return Ok(Some((self.0.params.clone(), key.clone())));
                }
            }
            Ok(None)
        }
    }

    #[test]
    fn delegated_keys_decrypt_messages_in_range() {
        use crate::state::test::test_state;
        use crate::state::ClientState;

        let sender = test_state();
        let start = Utc.with_ymd_and_hms(2019, 7, 25, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2019, 7, 26, 10, 0, 0).unwrap();

        let delegation = sender
            .delegate(TEST_HIERARCHY, "a/b/*", &start, &end, Permission::DECRYPT)
            .unwrap();
        let receiver = ClientState::new(
            DelegationStore(delegation),
            DefaultPatternEncoder::new(TEST_PATTERN_SIZE - MAX_TIME_LENGTH),
            1 << 20,
        );

        let inside = Utc.with_ymd_and_hms(2019, 7, 25, 23, 0, 0).unwrap();
        let message = b"reading: 21.5C";
        let encrypted = sender
            .encrypt(rand::thread_rng(), TEST_HIERARCHY, "a/b/c", &inside, message)
            .unwrap();
        let decrypted = receiver
            .decrypt(TEST_HIERARCHY, "a/b/c", &inside, &encrypted)
            .unwrap();
        assert_eq!(decrypted, message);

        let outside = Utc.with_ymd_and_hms(2019, 7, 27, 12, 0, 0).unwrap();
        let unreadable = sender
            .encrypt(rand::thread_rng(), TEST_HIERARCHY, "a/b/c", &outside, message)
            .unwrap();
        assert!(matches!(
            receiver.decrypt(TEST_HIERARCHY, "a/b/c", &outside, &unreadable),
            Err(Error::NoKeyForPattern)
        ));

        let off_topic = sender
            .encrypt(rand::thread_rng(), TEST_HIERARCHY, "a/x", &inside, message)
            .unwrap();
        assert!(matches!(
            receiver.decrypt(TEST_HIERARCHY, "a/x", &inside, &off_topic),
            Err(Error::NoKeyForPattern)
        ));
    }

    #[test]
    fn permission_bit_operations() {
        let both = Permission::DECRYPT | Permission::SIGN;
        assert_eq!(both.bits(), 0x3);
        assert!(both.contains(Permission::DECRYPT));
        assert!(both.contains(Permission::SIGN));
        assert!(!Permission::DECRYPT.contains(Permission::SIGN));
    }
}
