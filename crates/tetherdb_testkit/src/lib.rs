//! # TetherDB Testkit
//!
//! Test utilities for TetherDB.
//!
//! This crate provides:
//! - Graph fixtures for common table and link-list layouts
//! - Property-based operation generators using proptest
//! - Changeset verification against committed state
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tetherdb_testkit::prelude::*;
//!
//! #[test]
//! fn my_test() {
//!     let (mut graph, table, value) = scalar_table(8);
//!     // ... drive transactions, refresh notifiers
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod verify;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::verify::*;
}

pub use fixtures::*;
pub use generators::*;
pub use verify::*;
