//! Shared test utilities for the ddosy workspace.
//!
//! This crate provides common testing infrastructure including:
//! - A local HTTP target that counts the traffic it receives
//! - JSON request body fixtures for the HTTP API
//! - Approximate equality assertions for rate math
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../../crates/test-utils" }
//! ```

pub mod fixtures;
pub mod target;

pub use fixtures::*;
pub use target::TargetServer;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(0.7498, 0.75, 0.01); // passes
/// assert_approx_eq!(0.5, 0.75, 0.01);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}
