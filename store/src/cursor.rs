// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Cursors over query and diff results.
//!
//! A cursor owns its backend resources and releases them when dropped, whichever way the
//! caller leaves its loop.

use crate::query::Row;
use model::{FieldValue, UpllResult};
use std::collections::VecDeque;
use std::sync::Arc;

/// A row of a diff result: the row of the first version and the row of the second one.
/// Created rows have no `old`, deleted rows have no `new`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowPair {
    pub new: Option<Row>,
    pub old: Option<Row>,
}

pub trait Cursor: Send {
    type Item;
    /// Next row, or `None` once exhausted.
    fn next_row(&mut self) -> UpllResult<Option<Self::Item>>;
}

/// Cursor over diff results.
pub type RowCursor = Box<dyn Cursor<Item = RowPair>>;
/// Cursor over the result columns of a raw query.
pub type RawCursor = Box<dyn Cursor<Item = Vec<FieldValue>>>;

/// Backend notifications of a [`VecCursor`].
pub trait CursorHook: Send + Sync {
    /// Called before every fetch. An error is returned to the caller of `next_row`.
    fn on_fetch(&self) -> UpllResult;
    /// Called once, when the cursor is dropped.
    fn on_close(&self);
}

/// A cursor over rows materialized by the backend.
pub struct VecCursor<T> {
    rows: VecDeque<T>,
    hook: Option<Arc<dyn CursorHook>>,
}

impl<T> VecCursor<T> {
    pub fn new(rows: impl IntoIterator<Item = T>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
            hook: None,
        }
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn CursorHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl<T: Send> Cursor for VecCursor<T> {
    type Item = T;
    fn next_row(&mut self) -> UpllResult<Option<T>> {
        if let Some(hook) = &self.hook {
            hook.on_fetch()?;
        }
        Ok(self.rows.pop_front())
    }
}

impl<T> Drop for VecCursor<T> {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook.on_close();
        }
    }
}
