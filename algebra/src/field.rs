// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The prime field `F(q)` and its elements (§4.4). Fields are interned by
//! order so that two constructions with the same `q` share one instance,
//! matching §3's "globally interned by order, equal orders share one
//! instance".

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use num_bigint::BigUint;
use num_traits::Zero;
use util::bigint_ext::cnt_bits_repr;
use util::byte_tree::ByteTree;
use util::csprng::Csprng;
use util::errors::{Error, FatalError, FormatError};
use util::prime::is_probable_prime;

use crate::bigint_array::BigIntArray;

#[derive(Debug)]
pub struct PField {
    pub q: BigUint,
    pub order_byte_length: usize,
    pub byte_length: usize,
    pub encode_length: usize,
}

impl PField {
    /// Validates `q > 0` and probable-prime with `certainty` rounds, then
    /// returns the (possibly shared, per the interning table) field of that
    /// order.
    pub fn new(q: BigUint, certainty: u32, csprng: &mut Csprng) -> Result<Arc<PField>, Error> {
        if q.is_zero() {
            return Err(Error::Format(FormatError::OutOfInterval {
                value: q.to_string(),
                lo: "1".to_string(),
                hi: "∞".to_string(),
            }));
        }
        if !is_probable_prime(&q, certainty, csprng) {
            return Err(Error::Format(FormatError::NotPrime(q.to_string())));
        }
        Ok(intern(q))
    }

    /// Builds a field element from a byte string by reducing it mod `q`.
    pub fn element_from_bytes(self: &Arc<Self>, bytes: &[u8]) -> FieldElement {
        let v = BigUint::from_bytes_be(bytes) % &self.q;
        FieldElement {
            field: self.clone(),
            value: v,
        }
    }

    pub fn element_from_biguint(self: &Arc<Self>, v: BigUint) -> FieldElement {
        FieldElement {
            field: self.clone(),
            value: v % &self.q,
        }
    }

    pub fn zero(self: &Arc<Self>) -> FieldElement {
        self.element_from_biguint(BigUint::zero())
    }
}

impl PartialEq for PField {
    fn eq(&self, other: &Self) -> bool {
        self.q == other.q
    }
}
impl Eq for PField {}

fn derive_lengths(q: &BigUint) -> (usize, usize, usize) {
    let order_byte_length = cnt_bits_repr(q).div_ceil(8);
    let byte_length = order_byte_length;
    let bitlen = q.bits().max(1);
    let encode_length = ((bitlen - 1) / 8) as usize;
    (order_byte_length, byte_length, encode_length)
}

fn intern(q: BigUint) -> Arc<PField> {
    static TABLE: OnceLock<Mutex<HashMap<BigUint, Arc<PField>>>> = OnceLock::new();
    let table = TABLE.get_or_init(|| Mutex::new(HashMap::new()));
    #[allow(clippy::unwrap_used)]
    let mut guard = table.lock().unwrap();
    if let Some(existing) = guard.get(&q) {
        return existing.clone();
    }
    let (order_byte_length, byte_length, encode_length) = derive_lengths(&q);
    let field = Arc::new(PField {
        q: q.clone(),
        order_byte_length,
        byte_length,
        encode_length,
    });
    tracing::debug!(bits = field.q.bits(), order_byte_length, encode_length, "interned new field");
    guard.insert(q, field.clone());
    field
}

#[derive(Clone)]
pub struct FieldElement {
    pub field: Arc<PField>,
    pub value: BigUint,
}

impl FieldElement {
    pub fn add(&self, other: &FieldElement) -> Result<FieldElement, Error> {
        self.check_same_field(other)?;
        Ok(self.field.element_from_biguint(&self.value + &other.value))
    }

    pub fn neg(&self) -> FieldElement {
        let v = if self.value.is_zero() {
            BigUint::zero()
        } else {
            &self.field.q - &self.value
        };
        FieldElement {
            field: self.field.clone(),
            value: v,
        }
    }

    pub fn mul(&self, other: &FieldElement) -> Result<FieldElement, Error> {
        self.check_same_field(other)?;
        Ok(self.field.element_from_biguint(&self.value * &other.value))
    }

    pub fn inv(&self) -> Result<FieldElement, Error> {
        util::bigint_ext::mod_inverse(&self.value, &self.field.q)
            .map(|v| FieldElement {
                field: self.field.clone(),
                value: v,
            })
            .ok_or_else(|| {
                Error::Arithmetic(util::errors::ArithmeticError::NotInvertible(
                    self.value.to_string(),
                ))
            })
    }

    pub fn equals(&self, other: &FieldElement) -> bool {
        self.field == other.field && self.value == other.value
    }

    /// Fixed-size serialization of width `orderByteLength`.
    pub fn to_byte_tree(&self) -> ByteTree {
        ByteTree::leaf(util::bigint_ext::to_be_bytes_left_pad(
            &self.value,
            self.field.order_byte_length,
        ))
    }

    fn check_same_field(&self, other: &FieldElement) -> Result<(), Error> {
        if self.field != other.field {
            return Err(Error::Domain(util::errors::DomainError::MismatchedStructure));
        }
        Ok(())
    }
}

/// Mirrors `BigIntArray`, dispatching every operation to the underlying
/// array with the field's modulus.
pub struct FieldElementArray {
    pub field: Arc<PField>,
    values: BigIntArray,
}

impl FieldElementArray {
    pub fn new(field: Arc<PField>, values: BigIntArray) -> Result<Self, Error> {
        for v in values.to_vec()? {
            if v >= field.q {
                return Err(Error::Fatal(FatalError::UnreachableBranch(
                    "field element array value out of [0, q)",
                )));
            }
        }
        Ok(FieldElementArray { field, values })
    }

    pub fn size(&self) -> usize {
        self.values.size()
    }

    pub fn to_vec(&self) -> Result<Vec<FieldElement>, Error> {
        Ok(self
            .values
            .to_vec()?
            .into_iter()
            .map(|v| FieldElement {
                field: self.field.clone(),
                value: v,
            })
            .collect())
    }

    pub fn mod_add(&self, other: &FieldElementArray) -> Result<FieldElementArray, Error> {
        self.check_same_field(other)?;
        let out = self.values.mod_add(&other.values, &self.field.q)?;
        FieldElementArray::new(self.field.clone(), out)
    }

    pub fn mod_mul(&self, other: &FieldElementArray) -> Result<FieldElementArray, Error> {
        self.check_same_field(other)?;
        let out = self.values.mod_mul_array(&other.values, &self.field.q)?;
        FieldElementArray::new(self.field.clone(), out)
    }

    pub fn mod_neg(&self) -> Result<FieldElementArray, Error> {
        let out = self.values.mod_neg(&self.field.q)?;
        FieldElementArray::new(self.field.clone(), out)
    }

    pub fn mod_inv(&self) -> Result<FieldElementArray, Error> {
        let out = self.values.mod_inv(&self.field.q)?;
        FieldElementArray::new(self.field.clone(), out)
    }

    fn check_same_field(&self, other: &FieldElementArray) -> Result<(), Error> {
        if self.field != other.field {
            return Err(Error::Domain(util::errors::DomainError::MismatchedStructure));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    fn csprng() -> Csprng {
        Csprng::new(b"field-tests")
    }

    #[test]
    fn interning_shares_instances_by_order() {
        let a = PField::new(BigUint::from(23u8), 40, &mut csprng()).unwrap();
        let b = PField::new(BigUint::from(23u8), 40, &mut csprng()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn rejects_non_prime_order() {
        let err = PField::new(BigUint::from(15u8), 40, &mut csprng()).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn arithmetic_wraps_mod_q() {
        let f = PField::new(BigUint::from(11u8), 40, &mut csprng()).unwrap();
        let a = f.element_from_biguint(BigUint::from(9u8));
        let b = f.element_from_biguint(BigUint::from(5u8));
        assert_eq!(a.add(&b).unwrap().value, BigUint::from(3u8));
        assert_eq!(a.mul(&b).unwrap().value, BigUint::from(1u8));
        assert_eq!(a.inv().unwrap().value, BigUint::from(5u8));
    }

    #[test]
    fn mismatched_fields_are_rejected() {
        let f11 = PField::new(BigUint::from(11u8), 40, &mut csprng()).unwrap();
        let f23 = PField::new(BigUint::from(23u8), 40, &mut csprng()).unwrap();
        let a = f11.element_from_biguint(BigUint::from(1u8));
        let b = f23.element_from_biguint(BigUint::from(1u8));
        assert!(matches!(a.add(&b), Err(Error::Domain(_))));
    }
}
