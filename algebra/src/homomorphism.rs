// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Bilinear maps and homomorphisms (§4.9): `B: F x G -> G`, and the two
//! homomorphisms obtained by currying one argument of `B`. The only concrete
//! map in this library is the exponentiation bilinear map `map(r, h) = h^r`;
//! product maps compose `w` of these (or of further products) component-wise.

use util::errors::{DomainError, Error};

use crate::field::FieldElement;
use crate::group::GroupElement;
use crate::product::{GroupElem, RingElement};

/// `B: F x G -> G`.
#[derive(Clone)]
pub enum BilinearMap {
    Exponentiation,
    Product(Vec<BilinearMap>),
}

impl BilinearMap {
    pub fn map(&self, r: &RingElement, h: &GroupElem) -> Result<GroupElem, Error> {
        match (self, r, h) {
            (BilinearMap::Exponentiation, RingElement::Scalar(f), GroupElem::Scalar(g)) => {
                Ok(GroupElem::Scalar(g.exp(&f.value)))
            }
            (BilinearMap::Product(maps), RingElement::Product(rs), GroupElem::Product(gs))
                if maps.len() == rs.len() && rs.len() == gs.len() =>
            {
                let out = maps
                    .iter()
                    .zip(rs.iter())
                    .zip(gs.iter())
                    .map(|((m, r), g)| m.map(r, g))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(GroupElem::Product(out))
            }
            _ => Err(Error::Domain(DomainError::MismatchedStructure)),
        }
    }

    /// Curries the group argument: `r -> B(r, h)`.
    pub fn restrict_ring(&self, h: GroupElem) -> Result<RingHomomorphism, Error> {
        match (self, h) {
            (BilinearMap::Exponentiation, GroupElem::Scalar(g)) => Ok(RingHomomorphism::Exponentiation(g)),
            (BilinearMap::Product(maps), GroupElem::Product(gs)) if maps.len() == gs.len() => {
                let homs = maps
                    .iter()
                    .zip(gs.into_iter())
                    .map(|(m, g)| m.restrict_ring(g))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RingHomomorphism::Product(homs))
            }
            _ => Err(Error::Domain(DomainError::MismatchedStructure)),
        }
    }

    /// Curries the ring argument: `h -> B(r, h)`.
    pub fn restrict_group(&self, r: RingElement) -> Result<GroupHomomorphism, Error> {
        match (self, r) {
            (BilinearMap::Exponentiation, RingElement::Scalar(f)) => Ok(GroupHomomorphism::Exponentiation(f)),
            (BilinearMap::Product(maps), RingElement::Product(rs)) if maps.len() == rs.len() => {
                let homs = maps
                    .iter()
                    .zip(rs.into_iter())
                    .map(|(m, r)| m.restrict_group(r))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(GroupHomomorphism::Product(homs))
            }
            _ => Err(Error::Domain(DomainError::MismatchedStructure)),
        }
    }
}

/// A homomorphism `F -> G`, obtained from [`BilinearMap::restrict_ring`].
pub enum RingHomomorphism {
    Exponentiation(GroupElement),
    Product(Vec<RingHomomorphism>),
}

impl RingHomomorphism {
    pub fn map(&self, r: &RingElement) -> Result<GroupElem, Error> {
        match (self, r) {
            (RingHomomorphism::Exponentiation(h), RingElement::Scalar(f)) => Ok(GroupElem::Scalar(h.exp(&f.value))),
            (RingHomomorphism::Product(homs), RingElement::Product(rs)) if homs.len() == rs.len() => {
                let out = homs
                    .iter()
                    .zip(rs.iter())
                    .map(|(hom, x)| hom.map(x))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(GroupElem::Product(out))
            }
            _ => Err(Error::Domain(DomainError::MismatchedStructure)),
        }
    }
}

/// A homomorphism `G -> G`, obtained from [`BilinearMap::restrict_group`].
pub enum GroupHomomorphism {
    Exponentiation(FieldElement),
    Product(Vec<GroupHomomorphism>),
}

impl GroupHomomorphism {
    pub fn map(&self, h: &GroupElem) -> Result<GroupElem, Error> {
        match (self, h) {
            (GroupHomomorphism::Exponentiation(r), GroupElem::Scalar(g)) => Ok(GroupElem::Scalar(g.exp(&r.value))),
            (GroupHomomorphism::Product(homs), GroupElem::Product(gs)) if homs.len() == gs.len() => {
                let out = homs
                    .iter()
                    .zip(gs.iter())
                    .map(|(hom, x)| hom.map(x))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(GroupElem::Product(out))
            }
            _ => Err(Error::Domain(DomainError::MismatchedStructure)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use num_bigint::BigUint;
    use util::csprng::Csprng;

    use crate::group::{Encoding, Group};

    fn csprng() -> Csprng {
        Csprng::new(b"homomorphism-tests")
    }

    fn toy_group() -> std::sync::Arc<Group> {
        Group::new(
            BigUint::from(23u8),
            BigUint::from(11u8),
            BigUint::from(2u8),
            Encoding::SafePrime,
            40,
            &mut csprng(),
        )
        .unwrap()
    }

    fn field_elem(group: &std::sync::Arc<Group>, v: u8) -> RingElement {
        RingElement::Scalar(group.exponent_field.element_from_biguint(BigUint::from(v)))
    }

    fn group_elem(group: &std::sync::Arc<Group>, v: u8) -> GroupElem {
        GroupElem::Scalar(GroupElement {
            group: group.clone(),
            value: BigUint::from(v),
        })
    }

    #[test]
    fn exponentiation_map_matches_exp() {
        let g = toy_group();
        let map = BilinearMap::Exponentiation;
        let r = field_elem(&g, 5);
        let h = group_elem(&g, 2);
        let mapped = map.map(&r, &h).unwrap();
        match mapped {
            GroupElem::Scalar(e) => assert_eq!(e.value, BigUint::from(2u8).modpow(&BigUint::from(5u8), &g.p)),
            GroupElem::Product(_) => panic!("expected a scalar"),
        }
    }

    #[test]
    fn bilinearity_in_the_ring_argument() {
        let g = toy_group();
        let map = BilinearMap::Exponentiation;
        let h = group_elem(&g, 2);
        let r1 = field_elem(&g, 3);
        let r2 = field_elem(&g, 4);
        let sum = RingElement::Scalar(
            g.exponent_field
                .element_from_biguint(BigUint::from(3u8))
                .add(&g.exponent_field.element_from_biguint(BigUint::from(4u8)))
                .unwrap(),
        );
        let lhs = map.map(&sum, &h).unwrap();
        let rhs = map.map(&r1, &h).unwrap().mul(&map.map(&r2, &h).unwrap()).unwrap();
        match (lhs, rhs) {
            (GroupElem::Scalar(a), GroupElem::Scalar(b)) => assert_eq!(a.value, b.value),
            _ => panic!("expected scalars"),
        }
    }

    #[test]
    fn restrict_ring_matches_unrestricted_map() {
        let g = toy_group();
        let map = BilinearMap::Exponentiation;
        let h = group_elem(&g, 2);
        let hom = map.restrict_ring(h.clone()).unwrap();
        let r = field_elem(&g, 7);
        assert!(matches!(
            (hom.map(&r).unwrap(), map.map(&r, &h).unwrap()),
            (GroupElem::Scalar(a), GroupElem::Scalar(b)) if a.value == b.value
        ));
    }
}
