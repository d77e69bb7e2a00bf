// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Data model of the configuration engine: hierarchical object keys, value blocks with
//! per-attribute validity and config-status, controller/domain scope, aggregate operational
//! status, datastore versions and the schema registry that maps every object type onto its
//! backing tables.

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
#![allow(clippy::doc_markdown)]

pub mod controller;
pub mod datastore;
pub mod errors;
pub mod key;
pub mod label;
pub mod record;
pub mod schema;
pub mod scope;
pub mod status;
pub mod validity;
pub mod value;

pub use controller::ControllerType; // re-export
pub use datastore::{ConfigScope, DatastoreVersion, Operation}; // re-export
pub use errors::{AbsentOk, UpllError, UpllResult}; // re-export
pub use key::{ObjectKey, ObjectType}; // re-export
pub use label::{InvalidLabel, Label}; // re-export
pub use record::{Attr, Entity, ValueBlock, ValueRecord}; // re-export
pub use schema::{SchemaRegistry, TableKind, TableSchema}; // re-export
pub use scope::{ScopeData, ScopeFlags}; // re-export
pub use status::{AggregateStatus, OperStatus, STAND_ALONE_SENTINEL}; // re-export
pub use validity::{AttributeValidity, ConfigStatus}; // re-export
pub use value::{FieldKind, FieldValue, MacAddr}; // re-export

use tracectl::trace_target;
trace_target!("model", LevelFilter::INFO, &["upll"]);
