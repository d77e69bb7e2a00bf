// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-attribute validity and controller acknowledgement status.

use strum::{Display, FromRepr};

/// Tells whether an attribute of a value block is present for a given operation.
#[derive(Clone, Copy, Debug, Default, Display, FromRepr, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum AttributeValidity {
    /// Never set. Never written.
    #[default]
    Invalid = 0,
    Valid = 1,
    /// Explicitly cleared: the stored value is erased on write.
    ValidNoValue = 2,
    NotSupported = 3,
    /// Copy unchanged from the prior version.
    NotModified = 4,
}

impl AttributeValidity {
    /// Tell if the attribute has been set by the user, with or without value.
    #[must_use]
    pub fn is_present(self) -> bool {
        matches!(
            self,
            AttributeValidity::Valid | AttributeValidity::ValidNoValue
        )
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a stored validity. Unknown codes decode as [`AttributeValidity::Invalid`].
    #[must_use]
    pub fn from_u8(raw: u8) -> Self {
        Self::from_repr(raw).unwrap_or_default()
    }
}

/// Controller acknowledgement of a configured attribute or row.
#[derive(Clone, Copy, Debug, Default, Display, FromRepr, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ConfigStatus {
    #[default]
    Unknown = 0,
    Applied = 1,
    PartiallyApplied = 2,
    NotApplied = 3,
    Invalid = 4,
    NotSupported = 5,
}

impl ConfigStatus {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a stored config-status. Unknown codes decode as [`ConfigStatus::Unknown`].
    #[must_use]
    pub fn from_u8(raw: u8) -> Self {
        Self::from_repr(raw).unwrap_or_default()
    }

    /// Combine the status of a row with that of one of its attributes, as done when a row is
    /// acknowledged attribute by attribute.
    #[must_use]
    pub fn merge(self, other: ConfigStatus) -> ConfigStatus {
        use ConfigStatus::{Applied, Invalid, NotApplied, NotSupported, PartiallyApplied, Unknown};
        match (self, other) {
            (Unknown, s) | (s, Unknown) => s,
            (NotSupported, s) | (s, NotSupported) => s,
            (Invalid, _) | (_, Invalid) => Invalid,
            (Applied, Applied) => Applied,
            (NotApplied, NotApplied) => NotApplied,
            (PartiallyApplied, _) | (_, PartiallyApplied) => PartiallyApplied,
            (Applied, NotApplied) | (NotApplied, Applied) => PartiallyApplied,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stored_codes_decode() {
        for v in [
            AttributeValidity::Invalid,
            AttributeValidity::Valid,
            AttributeValidity::ValidNoValue,
            AttributeValidity::NotSupported,
            AttributeValidity::NotModified,
        ] {
            assert_eq!(AttributeValidity::from_u8(v.as_u8()), v);
        }
        assert_eq!(AttributeValidity::from_u8(200), AttributeValidity::Invalid);
        assert_eq!(ConfigStatus::from_u8(200), ConfigStatus::Unknown);
    }

    #[test]
    fn presence() {
        assert!(AttributeValidity::Valid.is_present());
        assert!(AttributeValidity::ValidNoValue.is_present());
        assert!(!AttributeValidity::Invalid.is_present());
        assert!(!AttributeValidity::NotModified.is_present());
    }

    #[test]
    fn config_status_merge() {
        use ConfigStatus::*;
        assert_eq!(Applied.merge(Applied), Applied);
        assert_eq!(Applied.merge(NotApplied), PartiallyApplied);
        assert_eq!(Unknown.merge(NotApplied), NotApplied);
        assert_eq!(NotSupported.merge(Applied), Applied);
        assert_eq!(Invalid.merge(Applied), Invalid);
    }
}
