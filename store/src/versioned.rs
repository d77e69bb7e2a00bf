// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The Versioned Store interface consumed by the configuration engine.

use crate::cursor::{RawCursor, RowCursor};
use crate::query::{BoundQuery, Row};
use model::{DatastoreVersion, FieldValue, UpllResult};

/// A store holding one set of tables per datastore version.
///
/// The datastore version of a call is the one of its [`BoundQuery`]. Calls addressing
/// [`DatastoreVersion::State`] are served from the rows of [`DatastoreVersion::Running`].
/// Implementations are shared by the engine components and use interior mutability; the
/// engine runs a single writer per transaction scope.
pub trait VersionedStore: Send + Sync {
    /// Insert the row made of the input bindings.
    /// Fails with `InstanceExists` if a row with the same identity exists.
    fn create(&self, query: &BoundQuery) -> UpllResult;

    /// Write the input bindings into every matching row.
    /// Fails with `NoSuchInstance` if no row matches.
    fn update(&self, query: &BoundQuery) -> UpllResult<usize>;

    /// Remove every matching row. Fails with `NoSuchInstance` if no row matches.
    fn delete(&self, query: &BoundQuery) -> UpllResult<usize>;

    /// Matching rows, projected on the output bindings, in identity order.
    /// Fails with `NoSuchInstance` if no row matches.
    fn read(&self, query: &BoundQuery) -> UpllResult<Vec<Row>>;

    fn record_count(&self, query: &BoundQuery) -> UpllResult<usize>;

    fn record_exists(&self, query: &BoundQuery) -> UpllResult<bool> {
        Ok(self.record_count(query)? > 0)
    }

    /// Rows of the query version matching the query and absent from `other`.
    fn get_created(&self, other: DatastoreVersion, query: &BoundQuery) -> UpllResult<RowCursor>;

    /// Rows present in both versions, matching the query in its own version and differing on
    /// at least one compared column.
    fn get_updated(&self, other: DatastoreVersion, query: &BoundQuery) -> UpllResult<RowCursor>;

    /// Rows of `other` matching the query and absent from the query version.
    fn get_deleted(&self, other: DatastoreVersion, query: &BoundQuery) -> UpllResult<RowCursor>;

    /// Run an aggregate query given as text, with `?` placeholders bound in order.
    fn execute_raw_query(&self, text: &str, params: &[FieldValue]) -> UpllResult<RawCursor>;
}
