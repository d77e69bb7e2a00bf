// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Physical controller flavours.

use strum::{Display, EnumIter, EnumString};

#[derive(Clone, Copy, Debug, Display, EnumIter, EnumString, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "lowercase")]
pub enum ControllerType {
    Pfc,
    Vnp,
    Polc,
    Odc,
    /// A controller registered without a known flavour. Gets no capabilities.
    Unknown,
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn names() {
        assert_eq!(ControllerType::Pfc.to_string(), "pfc");
        assert_eq!(ControllerType::from_str("odc"), Ok(ControllerType::Odc));
        assert!(ControllerType::from_str("nope").is_err());
    }
}
