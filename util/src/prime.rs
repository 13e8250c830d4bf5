// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Trial-division prefiltered Miller-Rabin primality testing, and candidate
//! stepping toward the next prime / next safe prime (§4.10).

use std::num::NonZeroUsize;

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::One;

use crate::csprng::Csprng;

pub const SMALL_PRIMES: [u32; 54] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
    101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191, 193,
    197, 199, 211, 223, 227, 229, 233, 239, 241, 251,
];

/// One Miller-Rabin witness round against a single `base`, following
/// NIST FIPS 186-5 B.3.1: writes `n - 1 = 2^k * q` with `q` odd, computes
/// `y = base^q mod n`, and accepts unless repeated squaring never reaches `n - 1`.
///
/// Caller guarantees `n` is odd and `n > 3`.
pub fn miller_rabin_round(base: &BigUint, n: &BigUint) -> bool {
    let n_minus_1 = n - BigUint::one();
    let k = n_minus_1.trailing_zeros().unwrap_or(0);
    let q = &n_minus_1 >> k;

    let mut y = base.modpow(&q, n);
    if y.is_one() || y == n_minus_1 {
        return true;
    }
    for _ in 1..k {
        y = y.modpow(&BigUint::from(2u8), n);
        if y == n_minus_1 {
            return true;
        }
        if y.is_one() {
            return false;
        }
    }
    false
}

fn trial_divide_small(n: &BigUint) -> Option<bool> {
    if n.bits() <= 1 {
        return Some(false);
    }
    for &p in SMALL_PRIMES.iter() {
        let p = BigUint::from(p);
        if *n == p {
            return Some(true);
        }
        if n.is_multiple_of(&p) {
            return Some(false);
        }
    }
    None
}

/// `isProbablePrime(n, certainty, rs)` of §4.10: trial division prefilter, then
/// `certainty` rounds of Miller-Rabin with bases drawn from `csprng`. Each round
/// halves the residual error probability for a composite `n`, so `certainty`
/// rounds bound it by `2^-certainty`.
pub fn is_probable_prime(n: &BigUint, certainty: u32, csprng: &mut Csprng) -> bool {
    if n < &BigUint::from(4u8) {
        return n > &BigUint::one();
    }
    if n.is_even() {
        return false;
    }
    if let Some(small) = trial_divide_small(n) {
        return small;
    }

    #[allow(clippy::unwrap_used)]
    let bits = NonZeroUsize::new(n.bits() as usize).unwrap();
    let n_minus_1 = n - BigUint::one();

    for _ in 0..certainty {
        let base = loop {
            let candidate = csprng.next_biguint(bits);
            if candidate > BigUint::one() && candidate < n_minus_1 {
                break candidate;
            }
        };
        if !miller_rabin_round(&base, n) {
            return false;
        }
    }
    true
}

/// Steps from `start` to the next probable prime, trying odd candidates only
/// (after rounding `start` up to odd).
pub fn next_prime(start: &BigUint, certainty: u32, csprng: &mut Csprng) -> BigUint {
    let mut n = if start.is_even() {
        start + BigUint::one()
    } else {
        start.clone()
    };
    if n < BigUint::from(2u8) {
        n = BigUint::from(2u8);
    }
    loop {
        if is_probable_prime(&n, certainty, csprng) {
            return n;
        }
        n += BigUint::from(2u8);
    }
}

/// Steps from `start` to the next safe prime `p` (i.e. `(p-1)/2` is also
/// prime), enforcing `p ≡ 3 (mod 4)` so that both `p` and `(p-1)/2` are odd,
/// and stepping by 4.
pub fn next_safe_prime(start: &BigUint, certainty: u32, csprng: &mut Csprng) -> BigUint {
    let four = BigUint::from(4u8);
    let three = BigUint::from(3u8);

    let mut n = start.clone();
    while &n % &four != three {
        n += BigUint::one();
    }

    loop {
        let half = (&n - BigUint::one()) >> 1;
        if is_probable_prime(&n, certainty, csprng) && is_probable_prime(&half, certainty, csprng)
        {
            return n;
        }
        n += &four;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn csprng(seed: &str) -> Csprng {
        Csprng::new(seed.as_bytes())
    }

    #[test]
    fn small_primality_table() {
        let mut c = csprng("small");
        let expected = [
            false, false, true, true, false, true, false, true, false, false, true,
        ];
        for (n, &want) in expected.iter().enumerate() {
            assert_eq!(
                is_probable_prime(&BigUint::from(n), 40, &mut c),
                want,
                "n={n}"
            );
        }
    }

    #[test]
    fn known_composites_are_rejected() {
        let mut c = csprng("composite");
        for n in [4u32, 6, 8, 9, 10, 15, 21, 25, 49, 77, 221] {
            assert!(!is_probable_prime(&BigUint::from(n), 40, &mut c));
        }
    }

    #[test]
    fn known_primes_are_accepted() {
        let mut c = csprng("primes");
        for n in [2u32, 3, 5, 7, 11, 13, 101, 65537] {
            assert!(is_probable_prime(&BigUint::from(n), 40, &mut c));
        }
    }

    #[test]
    fn next_prime_steps_forward() {
        let mut c = csprng("next-prime");
        assert_eq!(next_prime(&BigUint::from(8u8), 40, &mut c), BigUint::from(11u8));
        assert_eq!(next_prime(&BigUint::from(14u8), 40, &mut c), BigUint::from(17u8));
    }

    #[test]
    fn next_safe_prime_is_safe() {
        let mut c = csprng("next-safe-prime");
        let p = next_safe_prime(&BigUint::from(20u8), 40, &mut c);
        assert!(is_probable_prime(&p, 40, &mut c));
        let half = (&p - BigUint::one()) >> 1;
        assert!(is_probable_prime(&half, 40, &mut c));
        assert_eq!(&p % BigUint::from(4u8), BigUint::from(3u8));
        // 23 is the first safe prime >= 20: (23-1)/2 = 11, prime.
        assert_eq!(p, BigUint::from(23u8));
    }
}
