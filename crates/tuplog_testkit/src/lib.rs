//! # tuplog testkit
//!
//! Test utilities for tuplog recovery.
//!
//! This crate provides:
//! - Temporary data directories and engine helpers
//! - Tools for tearing, corrupting and shuffling log files
//! - A crashable storage directory for torn-write tests
//! - Property-based workload generators using proptest
//! - Log capture for asserting on recovery diagnostics
//! - Ready-made damaged data directories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tuplog_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_engine() {
//!     with_temp_engine(|engine| {
//!         let test = create_test_space(engine, "test");
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod logs;
pub mod scenarios;
pub mod tamper;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logs::*;
    pub use crate::scenarios::*;
    pub use crate::tamper::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logs::*;
pub use scenarios::*;
