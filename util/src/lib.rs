#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Ambient support used by the `algebra` crate: error taxonomy, a seedable CSPRNG,
//! big-integer helpers, Miller-Rabin primality, the bundled safe-prime table, the
//! recursive `ByteTree` wire format, and process-wide configuration.

pub mod bigint_ext;
pub mod byte_tree;
pub mod config;
pub mod csprng;
pub mod errors;
pub mod logging;
pub mod prime;
pub mod safe_primes;
