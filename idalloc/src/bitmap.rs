// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Fixed-size label bitset, stored as rows of [`ROW_BITS`] bits.

use crate::errors::AllocatorError;
use crate::geometry::{LabelRange, PoolGeometry, ROW_BITS};
use model::Label;
use std::collections::BTreeMap;

/// The allocation state of one pool. Rows are only materialized once a bit is set in them, which
/// lets a pool grow on demand up to its geometry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelBitmap {
    geometry: PoolGeometry,
    rows: BTreeMap<u32, u32>,
}

impl LabelBitmap {
    #[must_use]
    pub fn new(geometry: PoolGeometry) -> Self {
        Self {
            geometry,
            rows: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn geometry(&self) -> &PoolGeometry {
        &self.geometry
    }

    /// Restore a persisted row. Rows outside the geometry are ignored.
    pub fn load_row(&mut self, row: u32, bits: u32) -> bool {
        if row >= self.geometry.rows {
            return false;
        }
        self.rows.insert(row, bits);
        true
    }

    #[must_use]
    pub fn row(&self, row: u32) -> u32 {
        self.rows.get(&row).copied().unwrap_or(0)
    }

    /// Materialized rows, in ascending order.
    pub fn rows(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.rows.iter().map(|(r, b)| (*r, *b))
    }

    fn check(&self, label: Label) -> Result<(u32, u32), AllocatorError> {
        if !self.geometry.contains(label) {
            return Err(AllocatorError::OutOfRange(label.as_u32()));
        }
        Ok(self.geometry.locate(label))
    }

    #[must_use]
    pub fn is_set(&self, label: Label) -> bool {
        self.check(label)
            .is_ok_and(|(row, bit)| self.row(row) & (1 << bit) != 0)
    }

    /// Set the bit of a label. Returns the index of the modified row.
    pub fn set(&mut self, label: Label) -> Result<u32, AllocatorError> {
        let (row, bit) = self.check(label)?;
        let bits = self.rows.entry(row).or_insert(0);
        if *bits & (1 << bit) != 0 {
            return Err(AllocatorError::AlreadyAllocated(label.as_u32()));
        }
        *bits |= 1 << bit;
        Ok(row)
    }

    /// Clear the bit of a label. Returns the index of the modified row.
    pub fn clear(&mut self, label: Label) -> Result<u32, AllocatorError> {
        let (row, bit) = self.check(label)?;
        match self.rows.get_mut(&row) {
            Some(bits) if *bits & (1 << bit) != 0 => {
                *bits &= !(1 << bit);
                Ok(row)
            }
            _ => Err(AllocatorError::NotAllocated(label.as_u32())),
        }
    }

    /// The lowest free label of a row lying in one of the ranges and not rejected by `skip`.
    pub fn first_free_in_row(
        &self,
        row: u32,
        ranges: &[LabelRange],
        skip: impl Fn(Label) -> bool,
    ) -> Option<Label> {
        let bits = self.row(row);
        if bits == u32::MAX {
            return None;
        }
        (0..ROW_BITS)
            .filter(|bit| bits & (1 << bit) == 0)
            .filter_map(|bit| self.geometry.label_at(row, bit))
            .find(|label| ranges.iter().any(|r| r.contains(*label)) && !skip(*label))
    }

    /// Number of set labels.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.rows.values().map(|b| b.count_ones()).sum()
    }

    /// Set labels, in ascending order.
    #[must_use]
    pub fn labels(&self) -> Vec<Label> {
        self.rows
            .iter()
            .flat_map(|(row, bits)| {
                (0..ROW_BITS)
                    .filter(move |bit| bits & (1 << bit) != 0)
                    .filter_map(move |bit| self.geometry.label_at(*row, bit))
            })
            .collect()
    }
}
