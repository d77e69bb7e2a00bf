// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Persistence of pool rows.

use crate::geometry::{PoolKind, PoolScope};
use model::UpllResult;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Storage for the rows of identifier pools. Only rows with at least one bit ever set need to be
/// stored.
pub trait PoolBackend: Send + Sync {
    /// All stored rows of a pool, as `(row index, bits)`.
    fn load_rows(&self, kind: PoolKind, scope: &PoolScope) -> UpllResult<Vec<(u32, u32)>>;
    fn store_row(&self, kind: PoolKind, scope: &PoolScope, row: u32, bits: u32) -> UpllResult;
    /// Drop a pool entirely.
    fn delete_rows(&self, kind: PoolKind, scope: &PoolScope) -> UpllResult;
}

type PoolRows = BTreeMap<(PoolKind, PoolScope), BTreeMap<u32, u32>>;

#[derive(Debug, Default)]
pub struct MemPoolBackend {
    rows: Mutex<PoolRows>,
}

impl MemPoolBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pools with stored rows.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl PoolBackend for MemPoolBackend {
    fn load_rows(&self, kind: PoolKind, scope: &PoolScope) -> UpllResult<Vec<(u32, u32)>> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rows
            .get(&(kind, scope.clone()))
            .map(|pool| pool.iter().map(|(r, b)| (*r, *b)).collect())
            .unwrap_or_default())
    }

    fn store_row(&self, kind: PoolKind, scope: &PoolScope, row: u32, bits: u32) -> UpllResult {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        rows.entry((kind, scope.clone()))
            .or_default()
            .insert(row, bits);
        Ok(())
    }

    fn delete_rows(&self, kind: PoolKind, scope: &PoolScope) -> UpllResult {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        rows.remove(&(kind, scope.clone()));
        Ok(())
    }
}
