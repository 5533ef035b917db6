//! Shared test utilities
//!
//! - `TestNats`: NATS container with JetStream and automatic cleanup (feature: "nats")
//! - [`eventually`]: poll a condition until it holds (always available)
//!
//! # Usage
//!
//! Add `features = ["nats"]` to your dev-dependencies:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["nats"] }
//! ```
//!
//! Then in your tests:
//!
//! ```rust,ignore
//! use test_utils::{eventually, TestNats};
//!
//! #[tokio::test]
//! #[ignore = "requires docker"]
//! async fn my_nats_test() {
//!     let nats = TestNats::new().await;
//!     let client = nats.client();
//!     // ...
//!     eventually(|| handler.seen().len() == 1).await;
//! }
//! ```

use std::time::Duration;

#[cfg(feature = "nats")]
mod nats;

#[cfg(feature = "nats")]
pub use nats::TestNats;

/// Polling interval of [`eventually`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default patience of [`eventually`].
pub const DEFAULT_PATIENCE: Duration = Duration::from_secs(5);

/// Wait until `condition` holds, panicking after [`DEFAULT_PATIENCE`].
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    eventually_within(DEFAULT_PATIENCE, condition).await
}

/// Wait until `condition` holds, panicking after `patience`.
pub async fn eventually_within<F: Fn() -> bool>(patience: Duration, condition: F) {
    let deadline = tokio::time::Instant::now() + patience;
    loop {
        if condition() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {:?}", patience);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
