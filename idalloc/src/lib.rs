// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Identifier Allocator.
//!
//! Scarce numeric labels are handed out from per-scope bitmap pools: VBIDs per tenant and
//! GVTNIDs per spine controller-domain. Pools are created on first use and persisted row by row
//! through a [`PoolBackend`]. Labels deleted by the current transaction are kept in a
//! pending-delete shadow table until the transaction is finalized, so that they are handed back
//! to their owner and to nobody else.

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

mod backend;
mod bitmap;
mod errors;
mod geometry;
mod pools;
mod strategy;

pub use backend::{MemPoolBackend, PoolBackend}; // re-export
pub use bitmap::LabelBitmap; // re-export
pub use errors::AllocatorError; // re-export
pub use geometry::{LabelOwner, LabelRange, PoolGeometry, PoolKind, PoolScope, ROW_BITS}; // re-export
pub use pools::IdPools; // re-export
pub use strategy::{AscendingRows, BucketRoundRobin, PoolCursor, SearchStrategy}; // re-export

use tracectl::trace_target;
trace_target!("idalloc", LevelFilter::INFO, &["upll"]);
