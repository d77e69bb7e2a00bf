// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration engine of the VTN service.
//!
//! Requests are bound onto rows of the Versioned Store by the Entity Binder, checked against
//! the object managers, and cascaded over the object hierarchy. Commits diff CANDIDATE against
//! RUNNING, push the changes (filtered by controller capabilities) into RUNNING, and settle
//! the identifier pools and the operational statuses.

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

pub mod adapters;
pub mod audit;
pub mod binder;
pub mod capability;
pub mod cascade;
pub mod commit;
pub mod diff;
pub mod engine;
pub mod import;
pub mod managers;
pub mod params;
pub mod rename;
pub mod reports;

pub use adapters::StoreStatusRepository; // re-export
pub use audit::AuditReport; // re-export
pub use capability::{
    Capability, CapabilityKind, CapabilityProvider, StaticCapabilities, filter_entity,
}; // re-export
pub use cascade::Cascade; // re-export
pub use commit::{CommitReport, ConfigChange}; // re-export
pub use diff::{DiffEntry, DiffRequest}; // re-export
pub use engine::{ConfigEngine, RequestHeader}; // re-export
pub use import::MergeReport; // re-export
pub use managers::{ManagerRegistry, ObjectManager}; // re-export
pub use params::{EngineParams, EngineParamsBuilder}; // re-export
pub use rename::RenameRegistry; // re-export

use tracectl::trace_target;
trace_target!("engine", LevelFilter::INFO, &["upll"]);
