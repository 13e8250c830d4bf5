// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The modular prime-order group `G` (§4.5): the subgroup of order `q` inside
//! `(Z/pZ)^*`, together with its three invertible encodings from octet
//! strings to group elements.

use std::sync::{Arc, Mutex};

use num_bigint::BigUint;
use num_traits::{One, Zero};
use sha2::{Digest, Sha256};
use util::bigint_ext::{cnt_bits_repr, is_quadratic_residue, to_be_bytes_left_pad};
use util::byte_tree::ByteTree;
use util::config::ThreadingThresholds;
use util::csprng::Csprng;
use util::errors::{ArithmeticError, DomainError, Error, FormatError};
use util::prime::is_probable_prime;

use crate::field::PField;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    SafePrime,
    Subgroup,
    Ro,
}

impl Encoding {
    pub fn tag(self) -> u8 {
        match self {
            Encoding::SafePrime => 0,
            Encoding::Subgroup => 1,
            Encoding::Ro => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, FormatError> {
        match tag {
            0 => Ok(Encoding::SafePrime),
            1 => Ok(Encoding::Subgroup),
            2 => Ok(Encoding::Ro),
            other => Err(FormatError::UnknownEncoding(other)),
        }
    }
}

/// The maximum number of probe steps for the bounded searches in the
/// subgroup and random-oracle encodings.
const MAX_ENCODE_ATTEMPTS: u32 = 256;

#[derive(Debug)]
pub struct Group {
    pub p: BigUint,
    pub q: BigUint,
    pub g: BigUint,
    pub cofactor: BigUint,
    pub encoding: Encoding,
    pub modulus_byte_length: usize,
    pub encode_length: usize,
    pub exponent_field: Arc<PField>,
    pub thresholds: Mutex<ThreadingThresholds>,
}

impl Group {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        p: BigUint,
        q: BigUint,
        g: BigUint,
        encoding: Encoding,
        certainty: u32,
        csprng: &mut Csprng,
    ) -> Result<Arc<Group>, Error> {
        if !is_probable_prime(&p, certainty, csprng) {
            return Err(Error::Format(FormatError::NotPrime(p.to_string())));
        }
        if !is_probable_prime(&q, certainty, csprng) {
            return Err(Error::Format(FormatError::NotPrime(q.to_string())));
        }
        let p_minus_1 = &p - BigUint::one();
        if !(&p_minus_1 % &q).is_zero() {
            return Err(Error::Format(FormatError::OutOfInterval {
                value: q.to_string(),
                lo: "a divisor of p-1".to_string(),
                hi: "a divisor of p-1".to_string(),
            }));
        }
        if g.is_one() {
            return Err(Error::Format(FormatError::NotAGroupElement(g.to_string())));
        }
        if g.modpow(&q, &p) != BigUint::one() {
            return Err(Error::Format(FormatError::NotAGroupElement(g.to_string())));
        }

        let cofactor = &p_minus_1 / &q;
        let modulus_byte_length = cnt_bits_repr(&p).div_ceil(8);
        let encode_length = modulus_byte_length.saturating_sub(4);
        let exponent_field = PField::new(q.clone(), certainty, csprng)?;

        tracing::debug!(
            modulus_bits = p.bits(),
            order_bits = q.bits(),
            encoding = ?encoding,
            "constructed modular group"
        );

        Ok(Arc::new(Group {
            p,
            q,
            g,
            cofactor,
            encoding,
            modulus_byte_length,
            encode_length,
            exponent_field,
            thresholds: Mutex::new(ThreadingThresholds::default()),
        }))
    }

    /// `1 <= v < p` and `v^q == 1 (mod p)`. Safe-prime groups (`q = (p-1)/2`)
    /// take the Legendre-symbol fast path instead of a full exponentiation.
    pub fn contains(&self, v: &BigUint) -> bool {
        if v.is_zero() || v >= &self.p {
            return false;
        }
        if self.cofactor == BigUint::from(2u8) {
            is_quadratic_residue(v, &self.p)
        } else {
            v.modpow(&self.q, &self.p) == BigUint::one()
        }
    }

    fn prefixed_buffer(&self, msg: &[u8]) -> Result<BigUint, Error> {
        if msg.len() > self.encode_length {
            return Err(Error::Format(FormatError::MessageTooLong {
                len: msg.len(),
                max: self.encode_length,
            }));
        }
        let width = self.encode_length + 4;
        let mut buf = vec![0u8; width];
        let len = msg.len() as u32;
        buf[0..4].copy_from_slice(&len.to_be_bytes());
        buf[4..4 + msg.len()].copy_from_slice(msg);
        if len == 0 && width > 4 {
            buf[4] = 0x01;
        }
        Ok(BigUint::from_bytes_be(&buf))
    }

    fn unprefix_buffer(&self, v: &BigUint) -> Result<Vec<u8>, Error> {
        let width = self.encode_length + 4;
        let buf = to_be_bytes_left_pad(v, width);
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[0..4]);
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > self.encode_length {
            return Err(Error::Format(FormatError::MessageTooLong {
                len,
                max: self.encode_length,
            }));
        }
        Ok(buf[4..4 + len].to_vec())
    }

    pub fn encode(self: &Arc<Self>, msg: &[u8]) -> Result<GroupElement, Error> {
        match self.encoding {
            Encoding::SafePrime => self.encode_safe_prime(msg),
            Encoding::Subgroup => self.encode_subgroup(msg),
            Encoding::Ro => self.encode_ro(msg),
        }
    }

    pub fn decode(&self, element: &GroupElement) -> Result<Vec<u8>, Error> {
        match self.encoding {
            Encoding::SafePrime => self.decode_safe_prime(element),
            Encoding::Subgroup => self.decode_subgroup(element),
            Encoding::Ro => self.decode_ro(element),
        }
    }

    fn encode_safe_prime(self: &Arc<Self>, msg: &[u8]) -> Result<GroupElement, Error> {
        let v = self.prefixed_buffer(msg)?;
        let v = if self.contains(&v) { v } else { &self.p - &v };
        Ok(GroupElement {
            group: self.clone(),
            value: v,
        })
    }

    fn decode_safe_prime(&self, element: &GroupElement) -> Result<Vec<u8>, Error> {
        let complement = &self.p - &element.value;
        let canonical = element.value.clone().min(complement);
        self.unprefix_buffer(&canonical)
    }

    fn encode_subgroup(self: &Arc<Self>, msg: &[u8]) -> Result<GroupElement, Error> {
        let mut v = self.prefixed_buffer(msg)?;
        let add_num = BigUint::from(2u8).pow(((self.encode_length + 4) * 8) as u32);
        for attempt in 0..MAX_ENCODE_ATTEMPTS {
            if self.contains(&v) {
                return Ok(GroupElement {
                    group: self.clone(),
                    value: v,
                });
            }
            if attempt == MAX_ENCODE_ATTEMPTS / 2 {
                tracing::warn!(attempt, max = MAX_ENCODE_ATTEMPTS, "subgroup encoding search past halfway");
            }
            v += &add_num;
        }
        Err(Error::Arithmetic(ArithmeticError::EncodingAttemptsExhausted))
    }

    fn decode_subgroup(&self, element: &GroupElement) -> Result<Vec<u8>, Error> {
        let width_bits = ((self.encode_length + 4) * 8) as u32;
        let modulus = BigUint::from(2u8).pow(width_bits);
        let low = &element.value % &modulus;
        self.unprefix_buffer(&low)
    }

    fn encode_ro(self: &Arc<Self>, msg: &[u8]) -> Result<GroupElement, Error> {
        if msg.len() > 3 {
            return Err(Error::Format(FormatError::MessageTooLong { len: msg.len(), max: 3 }));
        }
        let mut candidate = self.g.clone();
        for attempt in 0..MAX_ENCODE_ATTEMPTS {
            let element = GroupElement {
                group: self.clone(),
                value: candidate.clone(),
            };
            let digest = ro_digest(&element);
            if ro_matches(&digest, msg) {
                return Ok(element);
            }
            if attempt == MAX_ENCODE_ATTEMPTS / 2 {
                tracing::warn!(attempt, max = MAX_ENCODE_ATTEMPTS, "random-oracle encoding search past halfway");
            }
            candidate = (&candidate * &self.g) % &self.p;
        }
        Err(Error::Arithmetic(ArithmeticError::EncodingAttemptsExhausted))
    }

    fn decode_ro(&self, element: &GroupElement) -> Result<Vec<u8>, Error> {
        let digest = ro_digest(element);
        let len = (digest[0] & 0b11) as usize;
        Ok(digest[1..1 + len].to_vec())
    }

    /// Fixed-width leaf of `modulusByteLength`, big-endian, zero-padded.
    pub fn to_byte_tree(&self, element: &GroupElement) -> ByteTree {
        ByteTree::leaf(to_be_bytes_left_pad(&element.value, self.modulus_byte_length))
    }

    /// Reads a leaf of `modulusByteLength` bytes; if `safe`, validates
    /// membership immediately, otherwise stores the raw value and leaves
    /// validation to `verify_unsafe`.
    pub fn to_element(self: &Arc<Self>, tree: &ByteTree, safe: bool) -> Result<GroupElement, Error> {
        let bytes = tree.as_leaf().map_err(Error::Format)?;
        if bytes.len() != self.modulus_byte_length {
            return Err(Error::Format(FormatError::WrongLeafLength {
                expected: self.modulus_byte_length,
                found: bytes.len(),
            }));
        }
        let value = BigUint::from_bytes_be(bytes);
        if safe && !self.contains(&value) {
            return Err(Error::Format(FormatError::NotAGroupElement(value.to_string())));
        }
        Ok(GroupElement {
            group: self.clone(),
            value,
        })
    }

    /// Widens the checked path's `FormatError` to a `FatalError`, for
    /// streaming readers that guarantee well-formedness upstream.
    pub fn to_element_unsafe(self: &Arc<Self>, tree: &ByteTree) -> Result<GroupElement, Error> {
        self.to_element(tree, false)
            .map_err(|e| match e {
                Error::Format(f) => Error::Fatal(f.into_fatal()),
                other => other,
            })
    }

    pub fn verify_unsafe(&self, element: &GroupElement) -> Result<(), Error> {
        if self.contains(&element.value) {
            Ok(())
        } else {
            Err(Error::Format(FormatError::NotAGroupElement(element.value.to_string())))
        }
    }
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.p == other.p && self.q == other.q && self.g == other.g
    }
}
impl Eq for Group {}

fn ro_digest(element: &GroupElement) -> [u8; 32] {
    let ser = element.group.to_byte_tree(element).to_bytes();
    let mut hasher = Sha256::new();
    hasher.update(&ser);
    let out = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&out);
    digest
}

fn ro_matches(digest: &[u8; 32], msg: &[u8]) -> bool {
    let len = (digest[0] & 0b11) as usize;
    len == msg.len() && &digest[1..1 + len] == msg
}

#[derive(Clone)]
pub struct GroupElement {
    pub group: Arc<Group>,
    pub value: BigUint,
}

impl GroupElement {
    pub fn mul(&self, other: &GroupElement) -> Result<GroupElement, Error> {
        self.check_same_group(other)?;
        Ok(GroupElement {
            group: self.group.clone(),
            value: (&self.value * &other.value) % &self.group.p,
        })
    }

    pub fn inv(&self) -> Result<GroupElement, Error> {
        util::bigint_ext::mod_inverse(&self.value, &self.group.p)
            .map(|value| GroupElement {
                group: self.group.clone(),
                value,
            })
            .ok_or_else(|| Error::Arithmetic(ArithmeticError::NotInvertible(self.value.to_string())))
    }

    pub fn exp(&self, exponent: &BigUint) -> GroupElement {
        GroupElement {
            group: self.group.clone(),
            value: self.value.modpow(exponent, &self.group.p),
        }
    }

    pub fn equals(&self, other: &GroupElement) -> bool {
        self.group == other.group && self.value == other.value
    }

    pub fn compare_to(&self, other: &GroupElement) -> Result<std::cmp::Ordering, Error> {
        self.check_same_group(other)?;
        Ok(self.value.cmp(&other.value))
    }

    fn check_same_group(&self, other: &GroupElement) -> Result<(), Error> {
        if self.group != other.group {
            return Err(Error::Domain(DomainError::MismatchedStructure));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    fn csprng() -> Csprng {
        Csprng::new(b"group-tests")
    }

    // p = 23, q = 11, g = 2: the toy parameters used throughout the
    // end-to-end scenarios. 2^11 mod 23 == 1, and 23 = 2*11 + 1 is safe.
    fn toy_group(encoding: Encoding) -> Arc<Group> {
        Group::new(
            BigUint::from(23u8),
            BigUint::from(11u8),
            BigUint::from(2u8),
            encoding,
            40,
            &mut csprng(),
        )
        .unwrap()
    }

    #[test]
    fn construction_validates_generator_order() {
        let g = toy_group(Encoding::SafePrime);
        assert_eq!(g.g.modpow(&g.q, &g.p), BigUint::one());
    }

    #[test]
    fn rejects_generator_not_of_order_q() {
        let err = Group::new(
            BigUint::from(23u8),
            BigUint::from(11u8),
            BigUint::from(3u8), // 3^11 mod 23 != 1
            Encoding::SafePrime,
            40,
            &mut csprng(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn contains_matches_subgroup_membership() {
        let g = toy_group(Encoding::SafePrime);
        // The subgroup of QRs mod 23 is {1,2,3,4,6,8,9,12,13,16,18}.
        assert!(g.contains(&BigUint::from(2u8)));
        assert!(!g.contains(&BigUint::from(5u8)));
    }

    #[test]
    fn mul_inv_exp_are_consistent() {
        let g = toy_group(Encoding::SafePrime);
        let a = GroupElement {
            group: g.clone(),
            value: BigUint::from(2u8),
        };
        let inv = a.inv().unwrap();
        assert!(a.mul(&inv).unwrap().equals(&GroupElement {
            group: g.clone(),
            value: BigUint::one(),
        }));
        assert_eq!(a.exp(&BigUint::from(11u8)).value, BigUint::one());
    }

    #[test]
    fn safe_prime_encode_decode_round_trips() {
        let g = toy_group(Encoding::SafePrime);
        let msg = [0x41u8];
        let element = g.encode(&msg).unwrap();
        assert!(g.contains(&element.value));
        let decoded = g.decode(&element).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn byte_tree_round_trips_checked() {
        let g = toy_group(Encoding::SafePrime);
        let element = GroupElement {
            group: g.clone(),
            value: BigUint::from(4u8),
        };
        let tree = g.to_byte_tree(&element);
        let back = g.to_element(&tree, true).unwrap();
        assert!(back.equals(&element));
    }

    #[test]
    fn to_element_checked_rejects_non_members() {
        let g = toy_group(Encoding::SafePrime);
        let tree = g.to_byte_tree(&GroupElement {
            group: g.clone(),
            value: BigUint::from(5u8),
        });
        assert!(g.to_element(&tree, true).is_err());
    }
}
