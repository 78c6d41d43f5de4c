//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestEngine, TEST_USER};
//!
//! #[tokio::test]
//! async fn test_refresh() {
//!     let engine = TestEngine::spawn();
//!     engine.store.refresh().await.unwrap();
//! }
//! ```

mod constants;
mod engine;
mod fixtures;

// Public API - this is what tests import
pub use constants::*;
#[allow(unused_imports)]
pub use engine::TestEngine;
#[allow(unused_imports)]
pub use fixtures::{distinct_unread, record};
