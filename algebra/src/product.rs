// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Product rings and product groups (§4.6), modeled as tagged enums rather
//! than the downcasts a dynamically typed implementation would reach for: a
//! `RingElement`/`GroupElem` is either a scalar leaf or a `Product` of
//! further elements, and every operation pattern-matches on that shape
//! instead of testing "is this a product" at the call site.

use std::sync::Arc;

use num_bigint::BigUint;
use util::byte_tree::ByteTree;
use util::csprng::Csprng;
use util::errors::{DomainError, Error, FatalError};

use crate::field::{FieldElement, PField};
use crate::group::{Encoding, Group, GroupElement};

#[derive(Clone)]
pub enum Ring {
    Prime(Arc<PField>),
    Product(Vec<Ring>),
}

impl Ring {
    pub fn width(&self) -> usize {
        match self {
            Ring::Prime(_) => 1,
            Ring::Product(v) => v.len(),
        }
    }

    pub fn same_shape(&self, other: &Ring) -> bool {
        match (self, other) {
            (Ring::Prime(a), Ring::Prime(b)) => a == b,
            (Ring::Product(a), Ring::Product(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.same_shape(y))
            }
            _ => false,
        }
    }

    /// The shape-describing tree of §4.6: a leaf of `q`'s bytes for a prime
    /// factor, a node of the child shapes for a product.
    pub fn to_shape_tree(&self) -> ByteTree {
        match self {
            Ring::Prime(field) => ByteTree::leaf(field.q.to_bytes_be()),
            Ring::Product(factors) => ByteTree::node(factors.iter().map(Ring::to_shape_tree).collect()),
        }
    }

    pub fn from_shape_tree(tree: &ByteTree, certainty: u32, csprng: &mut Csprng) -> Result<Ring, Error> {
        match tree {
            ByteTree::Leaf(bytes) => {
                let q = BigUint::from_bytes_be(bytes);
                Ok(Ring::Prime(PField::new(q, certainty, csprng)?))
            }
            ByteTree::Node(children) => {
                let factors = children
                    .iter()
                    .map(|c| Ring::from_shape_tree(c, certainty, csprng))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Ring::Product(factors))
            }
        }
    }
}

#[derive(Clone)]
pub enum RingElement {
    Scalar(FieldElement),
    Product(Vec<RingElement>),
}

impl RingElement {
    pub fn ring(&self) -> Ring {
        match self {
            RingElement::Scalar(e) => Ring::Prime(e.field.clone()),
            RingElement::Product(v) => Ring::Product(v.iter().map(RingElement::ring).collect()),
        }
    }

    pub fn factors(&self) -> Vec<RingElement> {
        match self {
            RingElement::Product(v) => v.clone(),
            RingElement::Scalar(_) => vec![self.clone()],
        }
    }

    fn binary_op<F>(&self, other: &RingElement, op: F) -> Result<RingElement, Error>
    where
        F: Fn(&FieldElement, &FieldElement) -> Result<FieldElement, Error> + Copy,
    {
        match (self, other) {
            (RingElement::Scalar(a), RingElement::Scalar(b)) => Ok(RingElement::Scalar(op(a, b)?)),
            (RingElement::Product(a), RingElement::Product(b)) if a.len() == b.len() => {
                let out = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| x.binary_op(y, op))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RingElement::Product(out))
            }
            (RingElement::Product(a), _) => {
                let out = a
                    .iter()
                    .map(|x| x.binary_op(other, op))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RingElement::Product(out))
            }
            (RingElement::Scalar(_), RingElement::Product(b)) => {
                let out = b
                    .iter()
                    .map(|y| self.binary_op(y, op))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RingElement::Product(out))
            }
        }
    }

    pub fn add(&self, other: &RingElement) -> Result<RingElement, Error> {
        self.binary_op(other, FieldElement::add)
    }

    pub fn mul(&self, other: &RingElement) -> Result<RingElement, Error> {
        self.binary_op(other, FieldElement::mul)
    }

    pub fn neg(&self) -> RingElement {
        match self {
            RingElement::Scalar(a) => RingElement::Scalar(a.neg()),
            RingElement::Product(v) => RingElement::Product(v.iter().map(RingElement::neg).collect()),
        }
    }

    pub fn inv(&self) -> Result<RingElement, Error> {
        match self {
            RingElement::Scalar(a) => Ok(RingElement::Scalar(a.inv()?)),
            RingElement::Product(v) => {
                Ok(RingElement::Product(v.iter().map(RingElement::inv).collect::<Result<_, _>>()?))
            }
        }
    }

    /// The product of the selected factors, or the factor itself when only
    /// one is selected.
    pub fn project(&self, bitmask: &[bool]) -> Result<RingElement, Error> {
        let factors = self.factors();
        if bitmask.len() != factors.len() {
            return Err(Error::Domain(DomainError::LengthMismatch {
                a: bitmask.len(),
                b: factors.len(),
            }));
        }
        let mut selected: Vec<RingElement> = factors
            .into_iter()
            .zip(bitmask.iter())
            .filter_map(|(f, &keep)| keep.then_some(f))
            .collect();
        match selected.len() {
            0 => Err(Error::Fatal(FatalError::EmptyProjection)),
            1 => selected
                .pop()
                .ok_or(Error::Fatal(FatalError::UnreachableBranch("project: empty after length check"))),
            _ => Ok(RingElement::Product(selected)),
        }
    }

    /// The transpose of `w`-wide product elements into `w` columns of `n`.
    pub fn decompose(elements: &[RingElement]) -> Result<Vec<Vec<RingElement>>, Error> {
        let first = elements
            .first()
            .ok_or(Error::Fatal(FatalError::UnreachableBranch("decompose on an empty array")))?;
        let w = match first {
            RingElement::Product(v) => v.len(),
            RingElement::Scalar(_) => {
                return Err(Error::Domain(DomainError::WrongProductShape { expected: 0, found: 1 }))
            }
        };
        let mut columns: Vec<Vec<RingElement>> = vec![Vec::with_capacity(elements.len()); w];
        for e in elements {
            match e {
                RingElement::Product(v) if v.len() == w => {
                    for (i, f) in v.iter().enumerate() {
                        columns[i].push(f.clone());
                    }
                }
                RingElement::Product(v) => {
                    return Err(Error::Domain(DomainError::WrongProductShape {
                        expected: w,
                        found: v.len(),
                    }))
                }
                RingElement::Scalar(_) => {
                    return Err(Error::Domain(DomainError::WrongProductShape { expected: w, found: 1 }))
                }
            }
        }
        Ok(columns)
    }

    pub fn to_byte_tree(&self) -> ByteTree {
        match self {
            RingElement::Scalar(e) => e.to_byte_tree(),
            RingElement::Product(v) => ByteTree::node(v.iter().map(RingElement::to_byte_tree).collect()),
        }
    }
}

#[derive(Clone)]
pub enum GroupShape {
    Modular(Arc<Group>),
    Product(Vec<GroupShape>),
}

impl GroupShape {
    pub fn width(&self) -> usize {
        match self {
            GroupShape::Modular(_) => 1,
            GroupShape::Product(v) => v.len(),
        }
    }
}

#[derive(Clone)]
pub enum GroupElem {
    Scalar(GroupElement),
    Product(Vec<GroupElem>),
}

impl GroupElem {
    pub fn shape(&self) -> GroupShape {
        match self {
            GroupElem::Scalar(g) => GroupShape::Modular(g.group.clone()),
            GroupElem::Product(v) => GroupShape::Product(v.iter().map(GroupElem::shape).collect()),
        }
    }

    pub fn factors(&self) -> Vec<GroupElem> {
        match self {
            GroupElem::Product(v) => v.clone(),
            GroupElem::Scalar(_) => vec![self.clone()],
        }
    }

    fn binary_op<F>(&self, other: &GroupElem, op: F) -> Result<GroupElem, Error>
    where
        F: Fn(&GroupElement, &GroupElement) -> Result<GroupElement, Error> + Copy,
    {
        match (self, other) {
            (GroupElem::Scalar(a), GroupElem::Scalar(b)) => Ok(GroupElem::Scalar(op(a, b)?)),
            (GroupElem::Product(a), GroupElem::Product(b)) if a.len() == b.len() => {
                let out = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| x.binary_op(y, op))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(GroupElem::Product(out))
            }
            (GroupElem::Product(a), _) => {
                let out = a
                    .iter()
                    .map(|x| x.binary_op(other, op))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(GroupElem::Product(out))
            }
            (GroupElem::Scalar(_), GroupElem::Product(b)) => {
                let out = b
                    .iter()
                    .map(|y| self.binary_op(y, op))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(GroupElem::Product(out))
            }
        }
    }

    pub fn mul(&self, other: &GroupElem) -> Result<GroupElem, Error> {
        self.binary_op(other, GroupElement::mul)
    }

    pub fn inv(&self) -> Result<GroupElem, Error> {
        match self {
            GroupElem::Scalar(a) => Ok(GroupElem::Scalar(a.inv()?)),
            GroupElem::Product(v) => Ok(GroupElem::Product(v.iter().map(GroupElem::inv).collect::<Result<_, _>>()?)),
        }
    }

    /// `exp(exponents)` (§4.6): factor-wise when `exp` decomposes to the same
    /// width, otherwise broadcast the whole exponent to every factor.
    pub fn exp_ring(&self, exp: &RingElement) -> Result<GroupElem, Error> {
        match (self, exp) {
            (GroupElem::Scalar(g), RingElement::Scalar(f)) => Ok(GroupElem::Scalar(g.exp(&f.value))),
            (GroupElem::Product(v), RingElement::Product(e)) if v.len() == e.len() => {
                let out = v
                    .iter()
                    .zip(e.iter())
                    .map(|(g, r)| g.exp_ring(r))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(GroupElem::Product(out))
            }
            (GroupElem::Product(v), _) => {
                let out = v.iter().map(|g| g.exp_ring(exp)).collect::<Result<Vec<_>, _>>()?;
                Ok(GroupElem::Product(out))
            }
            (GroupElem::Scalar(_), RingElement::Product(_)) => Err(Error::Domain(DomainError::MismatchedStructure)),
        }
    }

    pub fn exp_scalar(&self, e: &BigUint) -> GroupElem {
        match self {
            GroupElem::Scalar(g) => GroupElem::Scalar(g.exp(e)),
            GroupElem::Product(v) => GroupElem::Product(v.iter().map(|g| g.exp_scalar(e)).collect()),
        }
    }

    pub fn project(&self, bitmask: &[bool]) -> Result<GroupElem, Error> {
        let factors = self.factors();
        if bitmask.len() != factors.len() {
            return Err(Error::Domain(DomainError::LengthMismatch {
                a: bitmask.len(),
                b: factors.len(),
            }));
        }
        let mut selected: Vec<GroupElem> = factors
            .into_iter()
            .zip(bitmask.iter())
            .filter_map(|(f, &keep)| keep.then_some(f))
            .collect();
        match selected.len() {
            0 => Err(Error::Fatal(FatalError::EmptyProjection)),
            1 => selected
                .pop()
                .ok_or(Error::Fatal(FatalError::UnreachableBranch("project: empty after length check"))),
            _ => Ok(GroupElem::Product(selected)),
        }
    }

    pub fn decompose(elements: &[GroupElem]) -> Result<Vec<Vec<GroupElem>>, Error> {
        let first = elements
            .first()
            .ok_or(Error::Fatal(FatalError::UnreachableBranch("decompose on an empty array")))?;
        let w = match first {
            GroupElem::Product(v) => v.len(),
            GroupElem::Scalar(_) => {
                return Err(Error::Domain(DomainError::WrongProductShape { expected: 0, found: 1 }))
            }
        };
        let mut columns: Vec<Vec<GroupElem>> = vec![Vec::with_capacity(elements.len()); w];
        for e in elements {
            match e {
                GroupElem::Product(v) if v.len() == w => {
                    for (i, f) in v.iter().enumerate() {
                        columns[i].push(f.clone());
                    }
                }
                GroupElem::Product(v) => {
                    return Err(Error::Domain(DomainError::WrongProductShape {
                        expected: w,
                        found: v.len(),
                    }))
                }
                GroupElem::Scalar(_) => {
                    return Err(Error::Domain(DomainError::WrongProductShape { expected: w, found: 1 }))
                }
            }
        }
        Ok(columns)
    }

    /// An internal node of `w` children, each the serialization of the
    /// respective factor component (§4.6).
    pub fn to_byte_tree(&self) -> ByteTree {
        match self {
            GroupElem::Scalar(g) => g.group.to_byte_tree(g),
            GroupElem::Product(v) => ByteTree::node(v.iter().map(GroupElem::to_byte_tree).collect()),
        }
    }
}

impl GroupShape {
    /// The shape-describing tree of §4.6, carrying enough of the modular
    /// parameters to reconstruct the group: `p`, `q`, `g`, and the encoding
    /// tag, as a four-leaf node per modular factor.
    pub fn to_shape_tree(&self) -> ByteTree {
        match self {
            GroupShape::Modular(g) => ByteTree::node(vec![
                ByteTree::leaf(g.p.to_bytes_be()),
                ByteTree::leaf(g.q.to_bytes_be()),
                ByteTree::leaf(g.g.to_bytes_be()),
                ByteTree::leaf(vec![g.encoding.tag()]),
            ]),
            GroupShape::Product(factors) => ByteTree::node(factors.iter().map(GroupShape::to_shape_tree).collect()),
        }
    }

    pub fn from_shape_tree(tree: &ByteTree, certainty: u32, csprng: &mut Csprng) -> Result<GroupShape, Error> {
        let children = tree.as_children().map_err(Error::Format)?;
        if children.len() == 4 && children.iter().all(ByteTree::is_leaf) {
            let p = BigUint::from_bytes_be(children[0].as_leaf().map_err(Error::Format)?);
            let q = BigUint::from_bytes_be(children[1].as_leaf().map_err(Error::Format)?);
            let g = BigUint::from_bytes_be(children[2].as_leaf().map_err(Error::Format)?);
            let tag = *children[3]
                .as_leaf()
                .map_err(Error::Format)?
                .first()
                .ok_or(Error::Fatal(FatalError::UnreachableBranch("empty encoding tag leaf")))?;
            let encoding = Encoding::from_tag(tag).map_err(Error::Format)?;
            let group = Group::new(p, q, g, encoding, certainty, csprng)?;
            Ok(GroupShape::Modular(group))
        } else {
            let factors = children
                .iter()
                .map(|c| GroupShape::from_shape_tree(c, certainty, csprng))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(GroupShape::Product(factors))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use num_bigint::BigUint;

    fn csprng() -> Csprng {
        Csprng::new(b"product-tests")
    }

    fn toy_group() -> Arc<Group> {
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

    fn scalar(group: &Arc<Group>, v: u8) -> GroupElem {
        GroupElem::Scalar(GroupElement {
            group: group.clone(),
            value: BigUint::from(v),
        })
    }

    #[test]
    fn product_mul_is_componentwise() {
        let g = toy_group();
        let a = GroupElem::Product(vec![scalar(&g, 2), scalar(&g, 4)]);
        let b = GroupElem::Product(vec![scalar(&g, 3), scalar(&g, 6)]);
        let prod = a.mul(&b).unwrap();
        match prod {
            GroupElem::Product(v) => {
                assert!(matches!(&v[0], GroupElem::Scalar(e) if e.value == BigUint::from(6u8)));
                assert!(matches!(&v[1], GroupElem::Scalar(e) if e.value == BigUint::from(24u8 % 23u8)));
            }
            GroupElem::Scalar(_) => panic!("expected a product"),
        }
    }

    #[test]
    fn mul_broadcasts_a_scalar_over_a_product() {
        let g = toy_group();
        let a = GroupElem::Product(vec![scalar(&g, 2), scalar(&g, 4)]);
        let b = scalar(&g, 3);
        let prod = a.mul(&b).unwrap();
        assert!(matches!(prod, GroupElem::Product(_)));
    }

    #[test]
    fn project_single_factor_unwraps_to_scalar() {
        let g = toy_group();
        let a = GroupElem::Product(vec![scalar(&g, 2), scalar(&g, 4)]);
        let selected = a.project(&[true, false]).unwrap();
        assert!(matches!(selected, GroupElem::Scalar(_)));
    }

    #[test]
    fn project_all_false_is_empty_projection() {
        let g = toy_group();
        let a = GroupElem::Product(vec![scalar(&g, 2), scalar(&g, 4)]);
        assert!(matches!(a.project(&[false, false]), Err(Error::Fatal(FatalError::EmptyProjection))));
    }

    #[test]
    fn decompose_transposes_width_by_count() {
        let g = toy_group();
        let rows = vec![
            GroupElem::Product(vec![scalar(&g, 2), scalar(&g, 3)]),
            GroupElem::Product(vec![scalar(&g, 4), scalar(&g, 6)]),
        ];
        let columns = GroupElem::decompose(&rows).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].len(), 2);
    }

    #[test]
    fn group_shape_round_trips_through_byte_tree() {
        let g = toy_group();
        let shape = GroupShape::Modular(g.clone());
        let tree = shape.to_shape_tree();
        let rebuilt = GroupShape::from_shape_tree(&tree, 40, &mut csprng()).unwrap();
        match rebuilt {
            GroupShape::Modular(g2) => assert_eq!(g2.p, g.p),
            GroupShape::Product(_) => panic!("expected a modular shape"),
        }
    }
}
