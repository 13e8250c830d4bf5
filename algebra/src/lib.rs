// Copyright (C) Microsoft Corporation. All rights reserved.

//! The algebraic-arithmetic engine: prime fields and prime-order groups over
//! a dual in-memory/file-backed array back end, the product ring/group that
//! composes them, simultaneous-exponentiation engines, permutations, and
//! bilinear homomorphisms.

pub mod bigint_array;
pub mod exp;
pub mod field;
pub mod file_io;
pub mod group;
pub mod homomorphism;
pub mod permutation;
pub mod product;
