// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Free functions on `BigUint` shared by the field, group, and encoding layers.

use std::borrow::Borrow;
use std::mem;

use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};

/// Number of bits required to represent `n`. `0` requires one bit, matching the
/// convention used throughout §3 for byte-length derivations.
pub fn cnt_bits_repr<T: Borrow<BigUint>>(n: &T) -> usize {
    let n: &BigUint = n.borrow();
    if n.is_zero() {
        1
    } else {
        n.bits() as usize
    }
}

/// Smallest multiple of `x` that is `>= a`.
pub fn round_up_to_multiple(a: usize, x: usize) -> usize {
    if x == 0 || a % x == 0 {
        a
    } else {
        a + (x - (a % x))
    }
}

/// Encodes `n` big-endian, left-padded with zero bytes to exactly `len` bytes.
/// If `n` already requires more than `len` bytes, the full, unpadded encoding
/// is returned (callers that require a hard width bound check `len` themselves).
pub fn to_be_bytes_left_pad<T: Borrow<BigUint>>(n: &T, len: usize) -> Vec<u8> {
    let n: &BigUint = n.borrow();
    let mut v = n.to_bytes_be();
    if v.len() < len {
        let pad = len - v.len();
        v.reserve(pad);
        v.extend(std::iter::repeat(0).take(pad));
        v.rotate_right(pad);
    }
    v
}

/// Extended Euclidean algorithm: the inverse of `a` modulo `m`, or `None` if
/// `gcd(a, m) != 1`.
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    if m.is_zero() {
        return None;
    }
    let m_signed = BigInt::from_biguint(Sign::Plus, m.clone());
    let mut t = (BigInt::zero(), BigInt::one());
    let mut r = (m_signed.clone(), BigInt::from_biguint(Sign::Plus, a.clone()));
    while !r.1.is_zero() {
        let q = &r.0 / &r.1;
        let step = |mut pair: (BigInt, BigInt)| {
            mem::swap(&mut pair.0, &mut pair.1);
            pair.1 -= &q * &pair.0;
            pair
        };
        r = step(r);
        t = step(t);
    }
    if !r.0.is_one() {
        return None;
    }
    if t.0 < BigInt::zero() {
        Some((t.0 + m_signed).magnitude().clone())
    } else {
        Some(t.0.magnitude().clone())
    }
}

/// The Legendre symbol `(a|p)` for an odd prime `p`, returned as `-1`, `0`, or `1`.
/// Computed via Euler's criterion `a^((p-1)/2) mod p`.
pub fn legendre_symbol(a: &BigUint, p: &BigUint) -> i8 {
    if a.is_zero() {
        return 0;
    }
    let exp = (p - BigUint::one()) >> 1;
    let r = a.modpow(&exp, p);
    if r.is_one() {
        1
    } else {
        -1
    }
}

/// True iff `a` is a nonzero quadratic residue modulo the odd prime `p`.
pub fn is_quadratic_residue(a: &BigUint, p: &BigUint) -> bool {
    legendre_symbol(a, p) == 1
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn to_be_bytes_left_pad_pads_and_passes_through() {
        let x = BigUint::from(0xffu32);
        assert_eq!(to_be_bytes_left_pad(&x, 0), vec![0xff]);
        assert_eq!(to_be_bytes_left_pad(&x, 1), vec![0xff]);
        assert_eq!(to_be_bytes_left_pad(&x, 2), vec![0x00, 0xff]);
    }

    #[test]
    fn mod_inverse_matches_known_values() {
        assert_eq!(
            mod_inverse(&BigUint::from(3u8), &BigUint::from(11u8)),
            Some(BigUint::from(4u8))
        );
        assert_eq!(mod_inverse(&BigUint::from(0u8), &BigUint::from(11u8)), None);
        assert_eq!(mod_inverse(&BigUint::from(3u8), &BigUint::from(12u8)), None);
    }

    #[test]
    fn legendre_symbol_over_small_prime() {
        // Quadratic residues mod 11: 1, 3, 4, 5, 9.
        let p = BigUint::from(11u8);
        let residues = [1u8, 3, 4, 5, 9];
        for a in 1u8..11 {
            let expected = residues.contains(&a);
            assert_eq!(is_quadratic_residue(&BigUint::from(a), &p), expected);
        }
    }

    #[test]
    fn round_up_to_multiple_examples() {
        assert_eq!(round_up_to_multiple(0, 4), 0);
        assert_eq!(round_up_to_multiple(1, 4), 4);
        assert_eq!(round_up_to_multiple(8, 4), 8);
        assert_eq!(round_up_to_multiple(9, 4), 12);
    }
}
