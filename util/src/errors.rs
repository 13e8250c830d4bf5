// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The error taxonomy of §7: `FormatError` for malformed input data,
//! `DomainError` for operands from incompatible algebraic structures,
//! `ArithmeticError` for non-invertible elements and exhausted encodings, and
//! `IoError` for file failures. Internal contract violations ("unreachable"
//! branches) surface as the orthogonal `FatalError`, which callers are not
//! expected to catch or retry.

/// User data violates a parse, interval, or residue invariant.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("expected a leaf node of {expected} bytes, found {found}")]
    WrongLeafLength { expected: usize, found: usize },

    #[error("expected a leaf, found an internal node")]
    ExpectedLeaf,

    #[error("expected an internal node of {expected} children, found a leaf")]
    ExpectedNode { expected: usize },

    #[error("expected {expected} children, found {found}")]
    WrongChildCount { expected: usize, found: usize },

    #[error("invalid tag byte {0:#04x}")]
    InvalidTag(u8),

    #[error("value {value} is out of the interval [{lo}, {hi})")]
    OutOfInterval {
        value: String,
        lo: String,
        hi: String,
    },

    #[error("{0} is not a quadratic residue")]
    NonResidue(String),

    #[error("{0} is not a probable prime")]
    NotPrime(String),

    #[error("unknown encoding scheme tag {0}")]
    UnknownEncoding(u8),

    #[error("group does not contain element {0}")]
    NotAGroupElement(String),

    #[error("message of length {len} exceeds the encodable length {max}")]
    MessageTooLong { len: usize, max: usize },

    #[error("declared child count {declared} exceeded by stream")]
    DeclaredCountExceeded { declared: usize },

    #[error("byte stream ended before the declared structure was complete")]
    TruncatedStream,
}

/// Two operands belong to incompatible algebraic structures: different
/// groups or rings, a ring value used where a group value was expected, or a
/// mismatched product shape. Never meaningfully retried.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("operands belong to different groups or rings")]
    MismatchedStructure,

    #[error("product shapes do not match: expected width {expected}, found {found}")]
    WrongProductShape { expected: usize, found: usize },

    #[error("arrays of different length: {a} vs {b}")]
    LengthMismatch { a: usize, b: usize },

    #[error("illegal comparison between incomparable values")]
    IllegalComparison,
}

/// An arithmetic operation could not produce a result: a non-invertible
/// element, or an encoding scheme that exhausted its bounded search.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("{0} is not invertible")]
    NotInvertible(String),

    #[error("exhausted encoding attempts")]
    EncodingAttemptsExhausted,
}

/// A file operation failed. The producer of a file-backed array is
/// responsible for releasing its temp file before propagating this error.
#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error("failed to create a temp file: {0}")]
    TempFileCreate(#[source] std::io::Error),

    #[error("short read: expected {expected} bytes, got {found}")]
    ShortRead { expected: usize, found: usize },

    #[error("background I/O task failed: {0}")]
    BackgroundTaskFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An internal contract was violated: an "unreachable" branch was reached, a
/// projection selected zero factors, or a streaming read that the caller
/// guaranteed was well-formed turned out not to be. Distinct from the four
/// surfaced error families; not meant to be caught by ordinary callers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FatalError {
    #[error("projection selected zero factors")]
    EmptyProjection,

    #[error("attempted to re-set an expected byte length")]
    ByteLengthAlreadySet,

    #[error("arrays of mismatched length: {a} vs {b}")]
    LengthMismatch { a: usize, b: usize },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("internal contract violated: {0}")]
    UnreachableBranch(&'static str),

    #[error("a malformed byte tree reached an unsafe decoding path: {0}")]
    UnsafeFormatViolation(FormatError),
}

/// The unified error type of the library.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Fatal(#[from] FatalError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl FormatError {
    /// Widens a `FormatError` into a `FatalError`, for use on `*unsafe` decoding
    /// paths where the caller has already guaranteed well-formedness and a mismatch
    /// indicates a programming fault rather than untrusted input.
    pub fn into_fatal(self) -> FatalError {
        FatalError::UnsafeFormatViolation(self)
    }
}
