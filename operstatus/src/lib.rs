// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Operational-Status Aggregator.
//!
//! Interface-level up/down/unknown notifications are folded into `down_count` /
//! `unknown_count` counters of the owning vnode. Any change of a derived status travels one
//! level up (vnode, tenant-controller association, tenant) as an edge event, and raises or
//! clears alarms through an [`AlarmSink`].

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

mod aggregator;
mod collab;
mod event;
mod node;

pub use aggregator::{Aggregator, StatusChange}; // re-export
pub use collab::{
    Alarm, AlarmSink, ControllerRegistry, MemStatusRepository, PathFaultAction,
    RecordingAlarmSink, StaticControllerRegistry, StatusRepository,
}; // re-export
pub use event::StatusEvent; // re-export
pub use node::StatusNode; // re-export

use tracectl::trace_target;
trace_target!("operstatus", LevelFilter::INFO, &["upll"]);
