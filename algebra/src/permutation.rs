// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Immutable permutations of `[0, n)` (§4.8), realized either as an
//! in-memory table or, for the file-backed back-end, entirely through
//! [`util::byte_tree::zip_sort_project`] so that no operation ever
//! materializes more than the external sort's own working set.

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use util::bigint_ext::to_be_bytes_left_pad;
use util::byte_tree::{permutation_leaf_cmp, zip_sort_project, ByteTree};
use util::config::{array_backend, ArrayBackend};
use util::errors::{DomainError, Error, FatalError, FormatError};

/// Bytes needed to hold every index in `[0, n)` as an unsigned big-endian
/// integer.
fn byte_length(n: usize) -> usize {
    let max_index = n.saturating_sub(1) as u64;
    if max_index == 0 {
        1
    } else {
        ((64 - max_index.leading_zeros()) as usize).div_ceil(8)
    }
}

fn leaf_usize(v: usize, width: usize) -> ByteTree {
    ByteTree::leaf(to_be_bytes_left_pad(&BigUint::from(v as u64), width))
}

fn read_usize(tree: &ByteTree) -> Result<usize, Error> {
    let bytes = tree.as_leaf().map_err(Error::Format)?;
    BigUint::from_bytes_be(bytes)
        .to_usize()
        .ok_or(Error::Fatal(FatalError::UnreachableBranch(
            "permutation index does not fit in usize",
        )))
}

fn validate_permutation(table: &[usize]) -> Result<(), Error> {
    let n = table.len();
    let mut seen = vec![false; n];
    for &v in table {
        if v >= n || seen[v] {
            return Err(Error::Format(FormatError::OutOfInterval {
                value: v.to_string(),
                lo: "0".to_string(),
                hi: n.to_string(),
            }));
        }
        seen[v] = true;
    }
    Ok(())
}

pub enum Permutation {
    InMemory(Vec<usize>),
    FileBacked {
        table: ByteTree,
        n: usize,
        byte_width: usize,
    },
}

impl Permutation {
    /// Validates that `table` is a permutation of `[0, table.len())`, then
    /// realizes it on the process-wide array back-end (§6).
    pub fn new(table: Vec<usize>) -> Result<Self, Error> {
        validate_permutation(&table)?;
        match array_backend() {
            ArrayBackend::InMemory => Ok(Permutation::InMemory(table)),
            ArrayBackend::FileBacked => Ok(Self::file_backed_from(&table)),
        }
    }

    fn file_backed_from(table: &[usize]) -> Self {
        let n = table.len();
        let byte_width = byte_length(n);
        let tree = ByteTree::node(table.iter().map(|&v| leaf_usize(v, byte_width)).collect());
        Permutation::FileBacked {
            table: tree,
            n,
            byte_width,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Permutation::InMemory(t) => t.len(),
            Permutation::FileBacked { n, .. } => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table_vec(&self) -> Result<Vec<usize>, Error> {
        match self {
            Permutation::InMemory(t) => Ok(t.clone()),
            Permutation::FileBacked { table, .. } => {
                let children = table.as_children().map_err(Error::Format)?;
                children.iter().map(read_usize).collect()
            }
        }
    }

    fn check_len(&self, len: usize) -> Result<(), Error> {
        if self.len() != len {
            return Err(Error::Domain(DomainError::LengthMismatch {
                a: self.len(),
                b: len,
            }));
        }
        Ok(())
    }

    /// `dst[table[i]] = src[i]`.
    pub fn apply<T: Clone>(&self, src: &[T]) -> Result<Vec<T>, Error> {
        self.check_len(src.len())?;
        let table = self.table_vec()?;
        let mut dst: Vec<Option<T>> = vec![None; src.len()];
        for (i, &t) in table.iter().enumerate() {
            dst[t] = Some(src[i].clone());
        }
        dst.into_iter()
            .map(|v| {
                v.ok_or(Error::Fatal(FatalError::UnreachableBranch(
                    "permutation did not cover every destination index",
                )))
            })
            .collect()
    }

    /// Applies the permutation to the children of a `Node`: for the
    /// file-backed realization this is exactly `zipSortProject(table, input,
    /// permutationLeafCmp)`, since sorting `(table[i], input[i])` pairs by
    /// `table[i]` reproduces the scatter `dst[table[i]] = input[i]`.
    pub fn apply_byte_tree(&self, input: &ByteTree) -> Result<ByteTree, Error> {
        let children = input.as_children().map_err(Error::Format)?;
        self.check_len(children.len())?;
        match self {
            Permutation::InMemory(_) => {
                let applied = self.apply(children)?;
                Ok(ByteTree::node(applied))
            }
            Permutation::FileBacked { table, .. } => {
                zip_sort_project(table, input, permutation_leaf_cmp).map_err(Error::Fatal)
            }
        }
    }

    /// The inverse permutation. In-memory: solved directly. File-backed:
    /// `zipSortProject(table, [0..n), cmp)` (§4.3/§4.8).
    pub fn inv(&self) -> Result<Permutation, Error> {
        match self {
            Permutation::InMemory(table) => {
                let mut inv = vec![0usize; table.len()];
                for (i, &v) in table.iter().enumerate() {
                    inv[v] = i;
                }
                Ok(Permutation::InMemory(inv))
            }
            Permutation::FileBacked { table, n, byte_width } => {
                let indices = ByteTree::node((0..*n).map(|i| leaf_usize(i, *byte_width)).collect());
                let inverted = zip_sort_project(table, &indices, permutation_leaf_cmp).map_err(Error::Fatal)?;
                Ok(Permutation::FileBacked {
                    table: inverted,
                    n: *n,
                    byte_width: *byte_width,
                })
            }
        }
    }

    /// Restricts to the first `m` positions, renumbering the kept image
    /// values by rank so the result is a permutation of `[0, m)`.
    pub fn shrink(&self, m: usize) -> Result<Permutation, Error> {
        let n = self.len();
        if m > n {
            return Err(Error::Fatal(FatalError::IndexOutOfRange { index: m, len: n }));
        }
        match self {
            Permutation::InMemory(table) => {
                let kept = &table[0..m];
                let mut sorted = kept.to_vec();
                sorted.sort_unstable();
                let renumbered: Vec<usize> = kept
                    .iter()
                    .map(|v| sorted.binary_search(v).unwrap_or(0))
                    .collect();
                Permutation::new(renumbered)
            }
            Permutation::FileBacked { table, byte_width, .. } => {
                let hybrid = ByteTree::node(
                    (0..n)
                        .map(|j| leaf_usize(if j < m { j } else { m }, *byte_width))
                        .collect(),
                );
                let perm_hyb = zip_sort_project(table, &hybrid, permutation_leaf_cmp).map_err(Error::Fatal)?;
                let indices = ByteTree::node((0..n).map(|k| leaf_usize(k, *byte_width)).collect());
                let sorted = zip_sort_project(&perm_hyb, &indices, permutation_leaf_cmp).map_err(Error::Fatal)?;
                let children = sorted.as_children().map_err(Error::Format)?;
                let shrunk = ByteTree::node(children[0..m].to_vec());
                let table: Vec<usize> = shrunk
                    .as_children()
                    .map_err(Error::Format)?
                    .iter()
                    .map(read_usize)
                    .collect::<Result<_, _>>()?;
                Permutation::new(table)
            }
        }
    }

    pub fn to_byte_tree(&self) -> Result<ByteTree, Error> {
        match self {
            Permutation::InMemory(table) => {
                let width = byte_length(table.len());
                Ok(ByteTree::node(table.iter().map(|&v| leaf_usize(v, width)).collect()))
            }
            Permutation::FileBacked { table, .. } => Ok(table.clone()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    fn s4() -> Permutation {
        Permutation::new(vec![2, 0, 3, 1]).unwrap()
    }

    #[test]
    fn rejects_non_permutations() {
        assert!(Permutation::new(vec![0, 0]).is_err());
        assert!(Permutation::new(vec![0, 2]).is_err());
    }

    #[test]
    fn apply_matches_scenario_s4() {
        let p = s4();
        let out = p.apply(&["a", "b", "c", "d"]).unwrap();
        assert_eq!(out, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn inv_matches_scenario_s4() {
        let p = s4();
        let inv = p.inv().unwrap();
        assert_eq!(inv.table_vec().unwrap(), vec![1, 3, 0, 2]);
    }

    #[test]
    fn apply_inv_then_apply_is_identity() {
        let p = s4();
        let inv = p.inv().unwrap();
        let src = vec![10, 20, 30, 40];
        let applied = p.apply(&src).unwrap();
        let restored = inv.apply(&applied).unwrap();
        assert_eq!(restored, src);
    }

    #[test]
    fn apply_byte_tree_matches_apply() {
        let p = s4();
        let input = ByteTree::node(
            ["a", "b", "c", "d"]
                .iter()
                .map(|s| ByteTree::leaf(s.as_bytes().to_vec()))
                .collect(),
        );
        let out = p.apply_byte_tree(&input).unwrap();
        let children = out.as_children().unwrap();
        let strings: Vec<String> = children
            .iter()
            .map(|c| String::from_utf8(c.as_leaf().unwrap().to_vec()).unwrap())
            .collect();
        assert_eq!(strings, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn shrink_restricts_and_renumbers() {
        // table = [3, 1, 0, 2]: first two positions carry values {3, 1};
        // ranked among themselves that's {1 -> 0, 3 -> 1}.
        let p = Permutation::new(vec![3, 1, 0, 2]).unwrap();
        let shrunk = p.shrink(2).unwrap();
        assert_eq!(shrunk.table_vec().unwrap(), vec![1, 0]);
    }
}
