use criterion::{criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaChaRng;

use chrono::{TimeZone, Utc};
use jedi::error::Result;
use jedi::{time_range, wkdibe, ClientState, DefaultPatternEncoder, KeyStoreReader, Pattern};

const PATTERN_SIZE: usize = 20;

struct BenchKeyStore {
    params: wkdibe::Params,
    master: wkdibe::MasterKey,
}

impl BenchKeyStore {
    fn new() -> BenchKeyStore {
        let (params, master) = wkdibe::setup(ChaChaRng::from_seed([0; 32]), PATTERN_SIZE);
        BenchKeyStore { params, master }
    }
}

impl KeyStoreReader for BenchKeyStore {
    fn params_for_hierarchy(&self, _hierarchy: &[u8]) -> Result<wkdibe::Params> {
        Ok(self.params.clone())
    }

    fn key_for_pattern(
        &self,
        _hierarchy: &[u8],
        _pattern: &Pattern,
    ) -> Result<Option<(wkdibe::Params, wkdibe::SecretKey)>> {
        let key = wkdibe::keygen(
            ChaChaRng::from_seed([1; 32]),
            &self.params,
            &self.master,
            &Default::default(),
        );
        Ok(Some((self.params.clone(), key)))
    }
}

fn state() -> ClientState<BenchKeyStore, DefaultPatternEncoder> {
    ClientState::new(
        BenchKeyStore::new(),
        DefaultPatternEncoder::new(PATTERN_SIZE - 6),
        1 << 24,
    )
}

fn encrypt_cold(c: &mut Criterion) {
    let state = state();
    let mut rng = ChaChaRng::from_seed([2; 32]);
    let timestamp = Utc.with_ymd_and_hms(2019, 7, 25, 21, 0, 0).unwrap();
    let mut counter = 0u64;
    c.bench_function("ClientState::encrypt (pattern change)", |b| {
        b.iter(|| {
            // a fresh URI every iteration forces a full encapsulation
            counter += 1;
            let uri = format!("bench/{}", counter);
            state
                .encrypt(&mut rng, b"bench", &uri, &timestamp, b"payload")
                .unwrap()
        });
    });
}

fn encrypt_warm(c: &mut Criterion) {
    let state = state();
    let mut rng = ChaChaRng::from_seed([3; 32]);
    let timestamp = Utc.with_ymd_and_hms(2019, 7, 25, 21, 0, 0).unwrap();
    state
        .encrypt(&mut rng, b"bench", "a/b/c", &timestamp, b"warmup")
        .unwrap();
    c.bench_function("ClientState::encrypt (cached pattern)", |b| {
        b.iter(|| {
            state
                .encrypt(&mut rng, b"bench", "a/b/c", &timestamp, b"payload")
                .unwrap()
        });
    });
}

fn decrypt_warm(c: &mut Criterion) {
    let state = state();
    let mut rng = ChaChaRng::from_seed([4; 32]);
    let timestamp = Utc.with_ymd_and_hms(2019, 7, 25, 21, 0, 0).unwrap();
    let encrypted = state
        .encrypt(&mut rng, b"bench", "a/b/c", &timestamp, b"payload")
        .unwrap();
    state
        .decrypt(b"bench", "a/b/c", &timestamp, &encrypted)
        .unwrap();
    c.bench_function("ClientState::decrypt (cached key)", |b| {
        b.iter(|| {
            state
                .decrypt(b"bench", "a/b/c", &timestamp, &encrypted)
                .unwrap()
        });
    });
}

fn range_decomposition(c: &mut Criterion) {
    let start = Utc.with_ymd_and_hms(2017, 12, 28, 21, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2019, 3, 1, 6, 0, 0).unwrap();
    c.bench_function("time_range (multi-year)", |b| {
        b.iter(|| time_range(&start, &end).unwrap());
    });
}

criterion_group!(benches, encrypt_cold, encrypt_warm, decrypt_warm, range_decomposition);
criterion_main!(benches);
