// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Thin wrapper around `tracing` so call sites read the same way regardless of
//! whether a subscriber has been installed. Library code never installs a
//! subscriber itself; that is left to the binary or test harness.

/// Installs a `tracing-subscriber` fmt layer for use from `#[test]` functions.
/// Safe to call more than once; later calls are no-ops.
pub fn init_test_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .try_init();
    });
}
