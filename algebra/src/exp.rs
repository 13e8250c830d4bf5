// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Exponentiation engines (§4.7): the simultaneous-exponentiation table that
//! underlies power-products, a fixed-base table for repeated exponentiation
//! of one base, and the array-level `expProd` that splits work across
//! threads once the input exceeds a configurable threshold.

use num_bigint::BigUint;
use num_traits::One;
use rayon::prelude::*;

/// `argmin_w (2^w + (2 - 2^-w) * l) / w`, clamped to `[1, 20]`. The upper
/// bound keeps the `2^w`-entry table from ever being built for an
/// unreasonably wide `w`; costs past it are monotonically increasing for any
/// `l` this library deals with.
pub fn optimal_width_simultaneous(bit_length: usize) -> usize {
    let l = bit_length as f64;
    let mut best_w = 1usize;
    let mut best_cost = f64::INFINITY;
    for w in 1..=20usize {
        let wf = w as f64;
        let cost = (2f64.powi(w as i32) + (2.0 - 2f64.powi(-(w as i32))) * l) / wf;
        if cost < best_cost {
            best_cost = cost;
            best_w = w;
        }
    }
    best_w
}

/// Minimizes amortized table-build cost plus per-exponentiation
/// multiplication cost, clamped to `<= 17` (§4.7).
pub fn optimal_width_fixed_base(bit_length: usize, amortize_over: usize) -> usize {
    let l = bit_length as f64;
    let size = (amortize_over.max(1)) as f64;
    let mut best_w = 1usize;
    let mut best_cost = f64::INFINITY;
    for w in 1..=17usize {
        let wf = w as f64;
        let cost = (2f64.powi(w as i32) - wf + l) / size + l / wf;
        if cost < best_cost {
            best_cost = cost;
            best_w = w;
        }
    }
    best_w
}

/// Builds `T[mask] = prod(bases[i]^bit_i(mask)) mod m` for `mask` in
/// `[0, 2^bases.len())`.
pub fn build_simultaneous_table(bases: &[BigUint], m: &BigUint) -> Vec<BigUint> {
    let width = bases.len();
    let size = 1usize << width;
    let mut table = vec![BigUint::one(); size];
    for (i, base) in bases.iter().enumerate() {
        table[1 << i] = base.clone();
    }
    for mask in 1..size {
        if mask.is_power_of_two() {
            continue;
        }
        let low = mask & mask.wrapping_neg();
        table[mask] = (&table[mask ^ low] * &table[low]) % m;
    }
    table
}

/// Scans exponent bit positions `l-1 -> 0`; at each step squares the
/// accumulator and multiplies by the table entry selected by the bit-`i`
/// bits of `exps` at that position.
pub fn exp_prod_simultaneous(table: &[BigUint], exps: &[BigUint], bit_length: usize, m: &BigUint) -> BigUint {
    let mut acc = BigUint::one();
    for pos in (0..bit_length).rev() {
        acc = (&acc * &acc) % m;
        let mut mask = 0usize;
        for (i, e) in exps.iter().enumerate() {
            if e.bit(pos as u64) {
                mask |= 1 << i;
            }
        }
        acc = (&acc * &table[mask]) % m;
    }
    acc
}

/// `prod(bases[i]^exps[i]) mod m`, computed in chunks of `optimalWidth(l)`
/// bases at a time; chunk tables and their contributions are computed by a
/// rayon work-splitter once `bases.len() > threshold`, then combined (valid
/// regardless of combination order since multiplication in `Z/mZ` is
/// commutative).
pub fn exp_prod_array(
    bases: &[BigUint],
    exps: &[BigUint],
    bit_length: usize,
    m: &BigUint,
    threshold: usize,
) -> BigUint {
    let width = optimal_width_simultaneous(bit_length).max(1);
    let chunks: Vec<(&[BigUint], &[BigUint])> = bases.chunks(width).zip(exps.chunks(width)).collect();

    let compute_chunk = |(bs, es): &(&[BigUint], &[BigUint])| -> BigUint {
        let table = build_simultaneous_table(bs, m);
        exp_prod_simultaneous(&table, es, bit_length, m)
    };

    if bases.len() > threshold {
        chunks
            .par_iter()
            .map(compute_chunk)
            .reduce(BigUint::one, |a, b| (a * b) % m)
    } else {
        chunks
            .iter()
            .fold(BigUint::one(), |acc, chunk| (acc * compute_chunk(chunk)) % m)
    }
}

/// A table over the powers `b^(2^(s*i))` of a single fixed base `b`, used to
/// amortize repeated exponentiation of that base over many exponents.
pub struct FixedBaseTable {
    width: usize,
    slice_size: usize,
    table: Vec<BigUint>,
    modulus: BigUint,
}

impl FixedBaseTable {
    pub fn new(base: &BigUint, bit_length: usize, width: usize, m: &BigUint) -> Self {
        let width = width.max(1);
        let slice_size = bit_length.div_ceil(width).max(1);
        let synthetic: Vec<BigUint> = (0..width)
            .map(|i| base.modpow(&(BigUint::one() << (slice_size * i)), m))
            .collect();
        let table = build_simultaneous_table(&synthetic, m);
        FixedBaseTable {
            width,
            slice_size,
            table,
            modulus: m.clone(),
        }
    }

    /// `b^e mod m`, scanning the `s-1 -> 0` rows of the table.
    pub fn exp(&self, e: &BigUint) -> BigUint {
        let mut acc = BigUint::one();
        for j in (0..self.slice_size).rev() {
            acc = (&acc * &acc) % &self.modulus;
            let mut mask = 0usize;
            for i in 0..self.width {
                let bit_pos = (i * self.slice_size + j) as u64;
                if e.bit(bit_pos) {
                    mask |= 1 << i;
                }
            }
            acc = (&acc * &self.table[mask]) % &self.modulus;
        }
        acc
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn simultaneous_table_matches_naive_products() {
        let m = BigUint::from(1_000_000_007u64);
        let bases = vec![BigUint::from(2u8), BigUint::from(3u8), BigUint::from(5u8)];
        let table = build_simultaneous_table(&bases, &m);
        for mask in 0..8usize {
            let mut expected = BigUint::one();
            for (i, b) in bases.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    expected = (expected * b) % &m;
                }
            }
            assert_eq!(table[mask], expected);
        }
    }

    #[test]
    fn exp_prod_simultaneous_matches_naive_power_product() {
        let m = BigUint::from(1_000_000_007u64);
        let bases = vec![BigUint::from(2u8), BigUint::from(3u8)];
        let exps = vec![BigUint::from(13u8), BigUint::from(9u8)];
        let table = build_simultaneous_table(&bases, &m);
        let got = exp_prod_simultaneous(&table, &exps, 5, &m);
        let expected = (bases[0].modpow(&exps[0], &m) * bases[1].modpow(&exps[1], &m)) % &m;
        assert_eq!(got, expected);
    }

    #[test]
    fn exp_prod_array_matches_naive_and_both_thread_paths() {
        let m = BigUint::from(1_000_000_007u64);
        let bases: Vec<BigUint> = (2u64..14).map(BigUint::from).collect();
        let exps: Vec<BigUint> = (1u64..13).map(BigUint::from).collect();
        let expected = bases
            .iter()
            .zip(exps.iter())
            .fold(BigUint::one(), |acc, (b, e)| (acc * b.modpow(e, &m)) % &m);

        let sequential = exp_prod_array(&bases, &exps, 8, &m, usize::MAX);
        assert_eq!(sequential, expected);

        let parallel = exp_prod_array(&bases, &exps, 8, &m, 1);
        assert_eq!(parallel, expected);
    }

    #[test]
    fn fixed_base_table_matches_modpow() {
        let m = BigUint::from(1_000_000_007u64);
        let base = BigUint::from(7u8);
        let table = FixedBaseTable::new(&base, 16, 4, &m);
        for e in [0u64, 1, 255, 1000, 65535] {
            let exp = BigUint::from(e);
            assert_eq!(table.exp(&exp), base.modpow(&exp, &m));
        }
    }

    #[test]
    fn optimal_widths_are_at_least_one() {
        assert!(optimal_width_simultaneous(0) >= 1);
        assert!(optimal_width_simultaneous(256) >= 1);
        assert!(optimal_width_fixed_base(256, 1) >= 1);
        assert!(optimal_width_fixed_base(256, 1) <= 17);
    }
}
