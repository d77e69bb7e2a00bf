// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interface to the Versioned Store: bound queries, cursors and the store trait, along with an
//! in-memory store used as reference implementation and test double.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod cursor;
pub mod mem;
pub mod query;
pub mod versioned;

pub use cursor::{Cursor, RawCursor, RowCursor, RowPair, VecCursor}; // re-export
pub use query::{BindDir, Binding, BoundQuery, Row}; // re-export
pub use versioned::VersionedStore; // re-export

use tracectl::trace_target;
trace_target!("store", LevelFilter::INFO, &["upll"]);
