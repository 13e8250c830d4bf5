// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! A seedable CSPRNG built on a SHAKE-256 extendable-output function. Every
//! randomized operation in `algebra` (random field/group elements, Miller-Rabin
//! witnesses) takes one of these explicitly; the library never reaches for an
//! ambient source of randomness.

use num_bigint::BigUint;
use num_traits::{CheckedSub, Zero};
use std::num::{NonZeroU64, NonZeroUsize};

pub struct Csprng(Box<dyn sha3::digest::XofReader>);

impl Csprng {
    /// Builds a CSPRNG by absorbing the given seed bytes. Equal seeds produce
    /// identical output streams, which is what makes the deterministic test
    /// vectors in this crate reproducible.
    pub fn new(seed: &[u8]) -> Csprng {
        use sha3::digest::{ExtendableOutput, Update};

        let mut hasher = sha3::Shake256::default();
        hasher.update(&(seed.len() as u64).to_le_bytes());
        hasher.update(seed);

        Csprng(Box::new(hasher.finalize_xof()))
    }

    pub fn next_u8(&mut self) -> u8 {
        let mut buf = [0u8];
        self.0.read(&mut buf);
        buf[0]
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.0.read(&mut buf);
        u32::from_le_bytes(buf)
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.0.read(&mut buf);
        u64::from_le_bytes(buf)
    }

    pub fn next_bool(&mut self) -> bool {
        self.next_u8() & 1 != 0
    }

    pub fn next_bytes(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        self.0.read(&mut buf);
        buf
    }

    /// Returns a uniform random integer in `[0, 2^bits)`.
    pub fn next_biguint(&mut self, bits: NonZeroUsize) -> BigUint {
        let bits = bits.get();
        let cnt_bytes = bits.div_ceil(8);
        let mut buf = vec![0u8; cnt_bytes];
        self.0.read(&mut buf);

        let cnt_bits_filled = cnt_bytes * 8;
        let cnt_extra_bits = cnt_bits_filled - bits;
        if cnt_extra_bits > 0 {
            let mask = !(((1u8 << cnt_extra_bits) - 1) << (8 - cnt_extra_bits));
            buf[0] &= mask;
        }

        BigUint::from_bytes_be(&buf)
    }

    /// Returns a uniform random integer in `[0, end)`. `end` must be nonzero.
    pub fn next_biguint_lt(&mut self, end: &BigUint) -> BigUint {
        assert!(!end.is_zero(), "end must be greater than 0");

        #[allow(clippy::unwrap_used)]
        let bits = NonZeroUsize::new(end.bits() as usize).unwrap();

        loop {
            let n = self.next_biguint(bits);
            if &n < end {
                return n;
            }
        }
    }

    /// Returns a uniform random integer in `[start, end)`. `start` must be less than `end`.
    pub fn next_biguint_range(&mut self, start: &BigUint, end: &BigUint) -> BigUint {
        #[allow(clippy::expect_used)]
        let diff = end
            .checked_sub(start)
            .expect("start must be less than end");
        start + self.next_biguint_lt(&diff)
    }

    /// Returns a uniform random `u64` of exactly `bits` bits, as required by the
    /// Miller-Rabin witness-selection step (NIST FIPS 186-5 B.3.1 step 4.1).
    pub fn next_biguint_of_bit_length(&mut self, bits: NonZeroU64) -> BigUint {
        #[allow(clippy::unwrap_used)]
        let bits_usize = NonZeroUsize::new(bits.get() as usize).unwrap();
        self.next_biguint(bits_usize)
    }
}

impl rand_core::RngCore for Csprng {
    fn next_u32(&mut self) -> u32 {
        self.next_u32()
    }
    fn next_u64(&mut self) -> u64 {
        self.next_u64()
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.read(dest);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn deterministic_stream() {
        let mut a = Csprng::new(b"seed");
        let mut b = Csprng::new(b"seed");
        assert_eq!(a.next_u64(), b.next_u64());
        assert_eq!(a.next_u8(), b.next_u8());
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = Csprng::new(b"seed-a");
        let mut b = Csprng::new(b"seed-b");
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn next_biguint_respects_bound() {
        let mut csprng = Csprng::new(b"bound");
        for bits in 1..128 {
            #[allow(clippy::unwrap_used)]
            let n = csprng.next_biguint(NonZeroUsize::new(bits).unwrap());
            assert!(n < (BigUint::from(1u8) << bits));
        }
    }

    #[test]
    fn next_biguint_lt_respects_bound() {
        let mut csprng = Csprng::new(b"lt");
        for end in 1u32..200 {
            let end: BigUint = end.into();
            let n = csprng.next_biguint_lt(&end);
            assert!(n < end);
        }
    }

    #[test]
    fn next_biguint_range_respects_bounds() {
        let mut csprng = Csprng::new(b"range");
        for start in 0u32..20 {
            for end in start + 1..30 {
                let (start, end) = (BigUint::from(start), BigUint::from(end));
                let n = csprng.next_biguint_range(&start, &end);
                assert!(start <= n && n < end);
            }
        }
    }
}
