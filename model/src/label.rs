// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use core::fmt::Display;
use std::fmt::Formatter;
use std::num::NonZero;

#[allow(unused_imports)] // re-export
#[cfg(any(test, feature = "bolero"))]
pub use contract::*;

/// A numeric resource label (VBID or GVTNID) handed out by an identifier pool.
///
/// # Legal values
///
/// * Value `0` means "no label" and is never handed out.
/// * The maximum legal value is [`Label::MAX`], well above the size of any pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
#[repr(transparent)]
pub struct Label(NonZero<u32>);

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

impl Label {
    /// The minimum legal [`Label`] value (1).
    pub const MIN: u32 = 1;
    /// The maximum legal [`Label`] value.
    pub const MAX: u32 = 0x00FF_FFFF;

    /// Create a new [`Label`] from a `u32`.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidLabel`] error if the value is 0 or greater than [`Label::MAX`].
    pub fn new_checked(label: u32) -> Result<Label, InvalidLabel> {
        match NonZero::<u32>::new(label) {
            None => Err(InvalidLabel::ReservedZero),
            _ if label > Label::MAX => Err(InvalidLabel::TooLarge(label)),
            Some(label) => Ok(Label(label)),
        }
    }

    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

/// Errors that can occur when converting a `u32` to a [`Label`]
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum InvalidLabel {
    #[error("Zero is not a legal label")]
    ReservedZero,
    #[error("The value {0} is too large to be a label (max is {MAX})", MAX = Label::MAX)]
    TooLarge(u32),
}

impl From<InvalidLabel> for crate::UpllError {
    fn from(e: InvalidLabel) -> Self {
        crate::UpllError::Generic(e.to_string())
    }
}

impl From<Label> for u32 {
    fn from(label: Label) -> u32 {
        label.as_u32()
    }
}

impl TryFrom<u32> for Label {
    type Error = InvalidLabel;

    fn try_from(label: u32) -> Result<Label, Self::Error> {
        Label::new_checked(label)
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use crate::label::Label;
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for Label {
        fn generate<D: Driver>(u: &mut D) -> Option<Self> {
            let raw: u32 = u.produce::<u32>()? & Label::MAX;
            Some(Label::new_checked(raw.max(Label::MIN)).unwrap_or_else(|e| unreachable!("{e:?}")))
        }
    }
}
