// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Process-wide configuration (§6): the in-memory-vs-file-backed array
//! back-end flag, the default per-group threading thresholds, and the
//! temp-file directory used by file-backed arrays.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Selects which realization new `BigIntArray`s use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayBackend {
    InMemory,
    FileBacked,
}

static FILE_BACKED: AtomicBool = AtomicBool::new(false);

/// Sets the process-wide array back-end. Affects only arrays created after
/// the call; existing arrays keep the back-end they were built with.
pub fn set_array_backend(backend: ArrayBackend) {
    FILE_BACKED.store(backend == ArrayBackend::FileBacked, Ordering::SeqCst);
}

pub fn array_backend() -> ArrayBackend {
    if FILE_BACKED.load(Ordering::SeqCst) {
        ArrayBackend::FileBacked
    } else {
        ArrayBackend::InMemory
    }
}

/// Default number of array elements above which the exponentiation
/// work-splitter engages (§5).
pub const DEFAULT_EXP_THREAD_THRESHOLD: usize = 100;
/// Default number of array elements above which the multiplicative
/// work-splitter engages (§5).
pub const DEFAULT_MUL_THREAD_THRESHOLD: usize = 1000;

/// Per-group threading thresholds, mutable under a lock held on the owning
/// group (§5: "Threading thresholds on a group are mutated under a lock on
/// that group").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadingThresholds {
    pub exp_thread_threshold: usize,
    pub mul_thread_threshold: usize,
}

impl Default for ThreadingThresholds {
    fn default() -> Self {
        ThreadingThresholds {
            exp_thread_threshold: DEFAULT_EXP_THREAD_THRESHOLD,
            mul_thread_threshold: DEFAULT_MUL_THREAD_THRESHOLD,
        }
    }
}

static TEMP_DIR: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Overrides the directory file-backed arrays create their temp files in.
pub fn set_temp_dir(dir: impl Into<PathBuf>) {
    #[allow(clippy::unwrap_used)]
    let mut guard = TEMP_DIR.write().unwrap();
    *guard = Some(dir.into());
}

/// The directory file-backed arrays should create their temp files in:
/// the override set via `set_temp_dir`, or the platform default otherwise.
pub fn temp_dir() -> PathBuf {
    #[allow(clippy::unwrap_used)]
    let guard = TEMP_DIR.read().unwrap();
    match guard.as_deref() {
        Some(dir) => dir.to_path_buf(),
        None => std::env::temp_dir(),
    }
}

/// True iff `dir` is the currently configured temp-file directory override.
pub fn is_temp_dir_override(dir: &Path) -> bool {
    #[allow(clippy::unwrap_used)]
    let guard = TEMP_DIR.read().unwrap();
    guard.as_deref() == Some(dir)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_backend_is_in_memory() {
        assert_eq!(array_backend(), ArrayBackend::InMemory);
    }

    #[test]
    fn backend_flag_round_trips() {
        set_array_backend(ArrayBackend::FileBacked);
        assert_eq!(array_backend(), ArrayBackend::FileBacked);
        set_array_backend(ArrayBackend::InMemory);
        assert_eq!(array_backend(), ArrayBackend::InMemory);
    }

    #[test]
    fn default_thresholds_match_spec() {
        let t = ThreadingThresholds::default();
        assert_eq!(t.exp_thread_threshold, 100);
        assert_eq!(t.mul_thread_threshold, 1000);
    }

    #[test]
    fn temp_dir_override_round_trips() {
        let custom = std::env::temp_dir().join("util-config-test");
        set_temp_dir(custom.clone());
        assert!(is_temp_dir_override(&custom));
        assert_eq!(temp_dir(), custom);
    }
}
