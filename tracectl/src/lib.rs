// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Runtime control of the tracing targets declared by the configuration engine crates.
//!
//! Every crate declares its target(s) with [`trace_target!`] or [`custom_target!`]. Declarations
//! are collected at link time, so the [`TracingControl`] knows all of them as soon as it is
//! created and log levels can be changed per tag while the engine runs.

pub mod control;
pub mod display;
pub mod targets;

// re-exports
pub use control::{TraceCtlError, TracingControl};
pub use tracing_subscriber::filter::LevelFilter;
