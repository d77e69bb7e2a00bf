// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Row search orders.

use crate::geometry::PoolGeometry;

/// Per-pool search state, persisted along with the pool for the lifetime of the process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolCursor {
    pub next_bucket: u32,
}

/// Decides the order in which the rows of a pool are scanned for a free label.
pub trait SearchStrategy: Send + Sync {
    /// Rows to scan, in order.
    fn row_order(&self, geometry: &PoolGeometry, cursor: &PoolCursor) -> Vec<u32>;

    /// Update the cursor after a label was taken from `row`.
    fn advance(&self, geometry: &PoolGeometry, cursor: &mut PoolCursor, row: u32);
}

/// Scan rows from the lowest, always handing out the lowest free label.
#[derive(Clone, Copy, Debug, Default)]
pub struct AscendingRows;

impl SearchStrategy for AscendingRows {
    fn row_order(&self, geometry: &PoolGeometry, _cursor: &PoolCursor) -> Vec<u32> {
        (0..geometry.rows).collect()
    }

    fn advance(&self, _geometry: &PoolGeometry, _cursor: &mut PoolCursor, _row: u32) {}
}

/// Spread allocations over buckets of rows: each allocation starts at the bucket following the
/// one that served the previous allocation, wrapping around.
#[derive(Clone, Copy, Debug, Default)]
pub struct BucketRoundRobin;

impl BucketRoundRobin {
    fn bucket_rows(geometry: &PoolGeometry) -> u32 {
        geometry.bucket_rows.filter(|n| *n > 0).unwrap_or(geometry.rows)
    }
}

impl SearchStrategy for BucketRoundRobin {
    fn row_order(&self, geometry: &PoolGeometry, cursor: &PoolCursor) -> Vec<u32> {
        let per_bucket = Self::bucket_rows(geometry);
        let buckets = geometry.bucket_count();
        let start = cursor.next_bucket % buckets;
        (0..buckets)
            .map(|i| (start + i) % buckets)
            .flat_map(|bucket| {
                let first = bucket * per_bucket;
                let last = (first + per_bucket).min(geometry.rows);
                first..last
            })
            .collect()
    }

    fn advance(&self, geometry: &PoolGeometry, cursor: &mut PoolCursor, row: u32) {
        let bucket = row / Self::bucket_rows(geometry);
        cursor.next_bucket = (bucket + 1) % geometry.bucket_count();
    }
}
