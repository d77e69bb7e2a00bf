// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Pool kinds, scopes and sizes.

use model::{Label, ObjectKey};
use std::fmt::Display;

/// Number of labels per persisted row.
pub const ROW_BITS: u32 = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
pub enum PoolKind {
    /// Virtual-bridge ids, per tenant.
    #[strum(serialize = "vbid")]
    Vbid,
    /// Global VTN ids, per spine controller-domain.
    #[strum(serialize = "gvtnid")]
    Gvtnid,
}

/// The owner of a pool instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoolScope {
    Tenant(String),
    ControllerDomain { controller: String, domain: String },
}

impl PoolScope {
    #[must_use]
    pub fn tenant(name: &str) -> Self {
        PoolScope::Tenant(name.to_owned())
    }

    #[must_use]
    pub fn controller_domain(controller: &str, domain: &str) -> Self {
        PoolScope::ControllerDomain {
            controller: controller.to_owned(),
            domain: domain.to_owned(),
        }
    }
}

impl Display for PoolScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolScope::Tenant(t) => write!(f, "tenant {t}"),
            PoolScope::ControllerDomain { controller, domain } => {
                write!(f, "domain {controller}/{domain}")
            }
        }
    }
}

/// Size and layout of a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolGeometry {
    /// Usable labels: `1..=bits`.
    pub bits: u32,
    /// Rows of [`ROW_BITS`] labels. Rows beyond `bits` are partially usable.
    pub rows: u32,
    /// Rows per round-robin bucket, if allocation spreads over buckets.
    pub bucket_rows: Option<u32>,
}

impl PoolGeometry {
    /// 4000 VBIDs in 125 rows, scanned in ascending order.
    #[must_use]
    pub const fn vbid() -> Self {
        Self {
            bits: 4000,
            rows: 125,
            bucket_rows: None,
        }
    }

    /// 4000 GVTNIDs in 126 rows, spread over buckets of 8 rows.
    #[must_use]
    pub const fn gvtnid() -> Self {
        Self {
            bits: 4000,
            rows: 126,
            bucket_rows: Some(8),
        }
    }

    /// Row and bit of a label.
    #[must_use]
    pub fn locate(&self, label: Label) -> (u32, u32) {
        let index = label.as_u32() - Label::MIN;
        (index / ROW_BITS, index % ROW_BITS)
    }

    /// The label at a row and bit position, if that position is usable.
    #[must_use]
    pub fn label_at(&self, row: u32, bit: u32) -> Option<Label> {
        let value = row.checked_mul(ROW_BITS)?.checked_add(bit)? + Label::MIN;
        if row >= self.rows || bit >= ROW_BITS || value > self.bits {
            return None;
        }
        Label::new_checked(value).ok()
    }

    #[must_use]
    pub fn contains(&self, label: Label) -> bool {
        label.as_u32() <= self.bits && self.locate(label).0 < self.rows
    }

    /// The whole label space.
    #[must_use]
    pub fn full_range(&self) -> LabelRange {
        LabelRange {
            first: Label::MIN,
            last: self.bits,
        }
    }

    #[must_use]
    pub fn bucket_count(&self) -> u32 {
        match self.bucket_rows {
            Some(n) if n > 0 => self.rows.div_ceil(n),
            _ => 1,
        }
    }
}

/// An inclusive range of label values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LabelRange {
    pub first: u32,
    pub last: u32,
}

impl LabelRange {
    #[must_use]
    pub fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }

    #[must_use]
    pub fn contains(&self, label: Label) -> bool {
        (self.first..=self.last).contains(&label.as_u32())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first > self.last
    }
}

impl Display for LabelRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}-{}]", self.first, self.last)
    }
}

/// The logical holder of a label: an object, possibly at a controller-domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelOwner {
    key: ObjectKey,
    at: Option<(String, String)>,
}

impl LabelOwner {
    #[must_use]
    pub fn of(key: &ObjectKey) -> Self {
        Self {
            key: key.clone(),
            at: None,
        }
    }

    #[must_use]
    pub fn at(mut self, controller: &str, domain: &str) -> Self {
        self.at = Some((controller.to_owned(), domain.to_owned()));
        self
    }

    #[must_use]
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }
}

impl Display for LabelOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.at {
            Some((c, d)) => write!(f, "{} at {c}/{d}", self.key),
            None => write!(f, "{}", self.key),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn label(v: u32) -> Label {
        Label::new_checked(v).unwrap()
    }

    #[test]
    fn label_positions() {
        let g = PoolGeometry::vbid();
        assert_eq!(g.locate(label(1)), (0, 0));
        assert_eq!(g.locate(label(32)), (0, 31));
        assert_eq!(g.locate(label(33)), (1, 0));
        assert_eq!(g.label_at(124, 31), Some(label(4000)));
        assert_eq!(g.label_at(125, 0), None);
        assert!(!g.contains(label(4001)));
    }

    #[test]
    fn gvtnid_layout() {
        let g = PoolGeometry::gvtnid();
        assert_eq!(g.bucket_count(), 16);
        // rows past the usable space exist but hold no label
        assert_eq!(g.label_at(125, 0), None);
        assert_eq!(g.label_at(124, 31), Some(label(4000)));
        assert_eq!(PoolGeometry::vbid().bucket_count(), 1);
    }
}
