// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Controller and domain association of an object.

use bitflags::bitflags;
use std::fmt::Display;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ScopeFlags: u8 {
        const VTN_RENAMED            = 0x01;
        const VNODE_RENAMED          = 0x02;
        const FLOWLIST_RENAMED       = 0x04;
        const POLICINGPROFILE_RENAMED = 0x08;
        /// Object is a converted (virtual) copy of a user object.
        const CONVERTED              = 0x10;
    }
}

impl ScopeFlags {
    pub const ANY_RENAMED: ScopeFlags = ScopeFlags::VTN_RENAMED
        .union(ScopeFlags::VNODE_RENAMED)
        .union(ScopeFlags::FLOWLIST_RENAMED)
        .union(ScopeFlags::POLICINGPROFILE_RENAMED);
}

/// The driving controller and domain of an object, with its rename/convert flags.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ScopeData {
    pub controller: Option<String>,
    pub domain: Option<String>,
    flags: ScopeFlags,
}

impl ScopeData {
    #[must_use]
    pub fn new(controller: &str, domain: &str) -> Self {
        Self {
            controller: Some(controller.to_owned()),
            domain: Some(domain.to_owned()),
            flags: ScopeFlags::empty(),
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: ScopeFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn flags(&self) -> ScopeFlags {
        self.flags
    }

    /// Tell if a controller and a domain are both known.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.controller.is_some() && self.domain.is_some()
    }

    #[must_use]
    pub fn is_renamed(&self) -> bool {
        self.flags.intersects(ScopeFlags::ANY_RENAMED)
    }

    /// Record that an object (or one of its ancestors) has been renamed.
    pub fn mark_renamed(&mut self, flag: ScopeFlags) {
        self.flags |= flag & ScopeFlags::ANY_RENAMED;
    }

    pub fn clear_renamed(&mut self, flag: ScopeFlags) {
        self.flags &= !(flag & ScopeFlags::ANY_RENAMED);
    }

    pub fn mark_converted(&mut self) {
        self.flags |= ScopeFlags::CONVERTED;
    }

    /// Restore flags read back from storage.
    pub fn load_flags(&mut self, raw: u8) {
        self.flags = ScopeFlags::from_bits_truncate(raw);
    }

    /// Tell if this scope is the given controller-domain pair.
    #[must_use]
    pub fn is(&self, controller: &str, domain: &str) -> bool {
        self.controller.as_deref() == Some(controller) && self.domain.as_deref() == Some(domain)
    }
}

impl Display for ScopeData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} flags={:#04x}",
            self.controller.as_deref().unwrap_or("-"),
            self.domain.as_deref().unwrap_or("-"),
            self.flags.bits()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rename_flags_are_explicit() {
        let mut scope = ScopeData::new("pfc1", "dom1");
        assert!(!scope.is_renamed());
        // converted is not a rename flag
        scope.mark_renamed(ScopeFlags::CONVERTED);
        assert!(!scope.is_renamed());
        assert!(!scope.flags().contains(ScopeFlags::CONVERTED));
        scope.mark_renamed(ScopeFlags::VNODE_RENAMED);
        assert!(scope.is_renamed());
        scope.clear_renamed(ScopeFlags::VNODE_RENAMED);
        assert!(!scope.is_renamed());
        scope.load_flags(0xff);
        assert_eq!(scope.flags(), ScopeFlags::all());
    }

    #[test]
    fn display() {
        assert_eq!(
            ScopeData::new("pfc1", "dom1").to_string(),
            "pfc1/dom1 flags=0x00"
        );
        assert_eq!(ScopeData::default().to_string(), "-/- flags=0x00");
    }
}
