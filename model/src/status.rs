// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Aggregate operational status of an object.

use strum::{Display, FromRepr};

/// Value of `down_count` marking a stand-alone object: one without child interfaces, whose
/// status is decided by a per-type rule instead of its children.
pub const STAND_ALONE_SENTINEL: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, Default, Display, FromRepr, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum OperStatus {
    #[default]
    Uninit = 0,
    Up = 1,
    Down = 2,
    Unknown = 3,
}

impl OperStatus {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
    #[must_use]
    pub fn from_u8(raw: u8) -> Self {
        Self::from_repr(raw).unwrap_or_default()
    }
}

/// Per-object `{oper_status, down_count, unknown_count}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AggregateStatus {
    pub oper_status: OperStatus,
    pub down_count: u32,
    pub unknown_count: u32,
}

impl AggregateStatus {
    /// Status of a freshly created object.
    #[must_use]
    pub fn uninit() -> Self {
        Self::default()
    }

    /// Status of a stand-alone object.
    #[must_use]
    pub fn stand_alone(status: OperStatus) -> Self {
        Self {
            oper_status: status,
            down_count: STAND_ALONE_SENTINEL,
            unknown_count: 0,
        }
    }

    #[must_use]
    pub fn is_stand_alone(&self) -> bool {
        self.down_count == STAND_ALONE_SENTINEL
    }

    /// The status that the counters dictate.
    #[must_use]
    pub fn derive(down_count: u32, unknown_count: u32) -> OperStatus {
        if unknown_count > 0 {
            OperStatus::Unknown
        } else if down_count > 0 {
            OperStatus::Down
        } else {
            OperStatus::Up
        }
    }

    /// Recompute `oper_status` from the counters. Stand-alone objects are left untouched.
    pub fn rederive(&mut self) -> OperStatus {
        if !self.is_stand_alone() {
            self.oper_status = Self::derive(self.down_count, self.unknown_count);
        }
        self.oper_status
    }
}
