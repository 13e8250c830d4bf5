// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The global safe-prime table: a read-only, lazily-populated map from bit
//! length to a deterministically derived safe prime of that exact length
//! (§4.10, §6). Entries are derived on first access rather than shipped as a
//! prebuilt resource file, and cached for the lifetime of the table so the
//! derivation cost is paid at most once per bit length per process.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, OnceLock};

use num_bigint::BigUint;
use num_traits::One;
use sha2::{Digest, Sha256};

use crate::csprng::Csprng;
use crate::prime::next_safe_prime;

/// Inclusive lower bound of the tabulated bit-length range.
pub const MIN_BIT_LENGTH: u64 = 257;
/// Exclusive upper bound of the tabulated bit-length range.
pub const MAX_BIT_LENGTH: u64 = 4120;

/// Number of Miller-Rabin rounds applied when deriving and re-validating
/// table entries, matching the certainty floor in the invariant that every
/// tabulated prime withstands at least 100 rounds.
pub const TABLE_CERTAINTY: u32 = 100;

fn candidate_seed(bit_length: u64, variant: u64) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(bit_length.to_be_bytes());
    hasher.update(variant.to_be_bytes());
    hasher.finalize().to_vec()
}

/// Deterministically derives the safe prime of exactly `bit_length` bits
/// tabulated for that length: seed with `SHA-256(bit_length, variant)`,
/// search forward from a candidate of that bit length with `nextSafePrime`,
/// and increment `variant` until the result lands at exactly `bit_length`
/// bits (the search can otherwise overflow into the next bit length).
pub fn derive_safe_prime(bit_length: u64, certainty: u32) -> BigUint {
    #[allow(clippy::unwrap_used)]
    let bits = NonZeroUsize::new(bit_length as usize).unwrap();
    let top_bit = BigUint::one() << (bit_length - 1);

    let mut variant: u64 = 0;
    loop {
        let seed = candidate_seed(bit_length, variant);
        let mut csprng = Csprng::new(&seed);
        let start = csprng.next_biguint(bits) | &top_bit;
        let p = next_safe_prime(&start, certainty, &mut csprng);
        if p.bits() == bit_length {
            tracing::debug!(bit_length, variant, "derived safe-prime table entry");
            return p;
        }
        if variant > 0 && variant % 8 == 0 {
            tracing::warn!(bit_length, variant, "safe-prime derivation still searching for exact bit length");
        }
        variant += 1;
    }
}

/// A lazily-populated, thread-safe cache of derived safe primes, one per
/// bit length. Logically the read-only resource described in §6: concurrent
/// readers never block each other past the initial derivation of an entry.
pub struct SafePrimeTable {
    certainty: u32,
    cache: Mutex<HashMap<u64, Arc<BigUint>>>,
}

impl SafePrimeTable {
    pub fn new(certainty: u32) -> Self {
        SafePrimeTable {
            certainty,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Looks up the tabulated safe prime for `bit_length`, deriving and
    /// caching it on first access. Returns `None` outside
    /// `[MIN_BIT_LENGTH, MAX_BIT_LENGTH)`.
    pub fn get(&self, bit_length: u64) -> Option<Arc<BigUint>> {
        if !(MIN_BIT_LENGTH..MAX_BIT_LENGTH).contains(&bit_length) {
            return None;
        }

        #[allow(clippy::unwrap_used)]
        let mut cache = self.cache.lock().unwrap();
        if let Some(p) = cache.get(&bit_length) {
            return Some(p.clone());
        }
        let p = Arc::new(derive_safe_prime(bit_length, self.certainty));
        cache.insert(bit_length, p.clone());
        Some(p)
    }
}

static GLOBAL: OnceLock<SafePrimeTable> = OnceLock::new();

/// The process-wide safe-prime table used by group construction when no
/// explicit modulus is supplied.
pub fn global() -> &'static SafePrimeTable {
    GLOBAL.get_or_init(|| SafePrimeTable::new(TABLE_CERTAINTY))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prime::is_probable_prime;

    #[test]
    fn derived_entry_has_requested_bit_length_and_is_safe() {
        for bits in [24u64, 32, 40] {
            let p = derive_safe_prime(bits, 40);
            assert_eq!(p.bits(), bits);
            let half = (&p - BigUint::one()) >> 1;
            let mut c = Csprng::new(b"verify");
            assert!(is_probable_prime(&p, 40, &mut c));
            assert!(is_probable_prime(&half, 40, &mut c));
            assert_eq!(&p % BigUint::from(4u8), BigUint::from(3u8));
        }
    }

    #[test]
    fn table_caches_and_rejects_out_of_range() {
        let table = SafePrimeTable::new(30);
        assert!(table.get(MIN_BIT_LENGTH - 1).is_none());
        assert!(table.get(MAX_BIT_LENGTH).is_none());
    }

    #[test]
    fn repeated_derivation_is_deterministic() {
        assert_eq!(derive_safe_prime(28, 30), derive_safe_prime(28, 30));
    }
}
