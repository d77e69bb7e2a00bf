// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Controller capabilities, and the filtering of changes handed to controllers.

use model::{
    AttributeValidity, ConfigStatus, ControllerType, DatastoreVersion, Entity, ObjectType,
    UpllResult,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};
#[allow(unused)]
use tracing::{debug, trace};

/// What a controller supports for one object type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capability {
    pub max_instances: Option<u32>,
    /// Indices of the supported configured attributes. `None` means all of them.
    pub supported: Option<BTreeSet<usize>>,
}

impl Capability {
    /// Every attribute, no instance limit.
    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_instances(mut self, max: u32) -> Self {
        self.max_instances = Some(max);
        self
    }

    #[must_use]
    pub fn supporting(mut self, attrs: impl IntoIterator<Item = usize>) -> Self {
        self.supported = Some(attrs.into_iter().collect());
        self
    }

    #[must_use]
    pub fn supports(&self, attr: usize) -> bool {
        self.supported.as_ref().is_none_or(|s| s.contains(&attr))
    }
}

/// The operation a capability is asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
pub enum CapabilityKind {
    #[strum(serialize = "create")]
    Create,
    #[strum(serialize = "update")]
    Update,
    #[strum(serialize = "read")]
    Read,
    #[strum(serialize = "state")]
    State,
}

pub trait CapabilityProvider: Send + Sync {
    fn get_create_capability(
        &self,
        ctype: ControllerType,
        dt: DatastoreVersion,
        otype: ObjectType,
    ) -> UpllResult<Capability>;

    fn get_update_capability(
        &self,
        ctype: ControllerType,
        dt: DatastoreVersion,
        otype: ObjectType,
    ) -> UpllResult<Capability>;

    fn get_read_capability(
        &self,
        ctype: ControllerType,
        dt: DatastoreVersion,
        otype: ObjectType,
    ) -> UpllResult<Capability>;

    fn get_state_capability(
        &self,
        ctype: ControllerType,
        dt: DatastoreVersion,
        otype: ObjectType,
    ) -> UpllResult<Capability>;

    fn capability(
        &self,
        kind: CapabilityKind,
        ctype: ControllerType,
        dt: DatastoreVersion,
        otype: ObjectType,
    ) -> UpllResult<Capability> {
        match kind {
            CapabilityKind::Create => self.get_create_capability(ctype, dt, otype),
            CapabilityKind::Update => self.get_update_capability(ctype, dt, otype),
            CapabilityKind::Read => self.get_read_capability(ctype, dt, otype),
            CapabilityKind::State => self.get_state_capability(ctype, dt, otype),
        }
    }
}

type CapabilityTable = BTreeMap<(CapabilityKind, ControllerType, ObjectType), Capability>;

/// A [`CapabilityProvider`] over a fixed table. Missing entries support everything, except
/// for [`ControllerType::Unknown`] which supports nothing.
#[derive(Debug, Default)]
pub struct StaticCapabilities {
    table: Mutex<CapabilityTable>,
}

impl StaticCapabilities {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(
        self,
        kind: CapabilityKind,
        ctype: ControllerType,
        otype: ObjectType,
        capability: Capability,
    ) -> Self {
        self.set(kind, ctype, otype, capability);
        self
    }

    pub fn set(
        &self,
        kind: CapabilityKind,
        ctype: ControllerType,
        otype: ObjectType,
        capability: Capability,
    ) {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((kind, ctype, otype), capability);
    }

    fn lookup(&self, kind: CapabilityKind, ctype: ControllerType, otype: ObjectType) -> Capability {
        if ctype == ControllerType::Unknown {
            return Capability::default().supporting([]).with_max_instances(0);
        }
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, ctype, otype))
            .cloned()
            .unwrap_or_default()
    }
}

impl CapabilityProvider for StaticCapabilities {
    fn get_create_capability(
        &self,
        ctype: ControllerType,
        _dt: DatastoreVersion,
        otype: ObjectType,
    ) -> UpllResult<Capability> {
        Ok(self.lookup(CapabilityKind::Create, ctype, otype))
    }

    fn get_update_capability(
        &self,
        ctype: ControllerType,
        _dt: DatastoreVersion,
        otype: ObjectType,
    ) -> UpllResult<Capability> {
        Ok(self.lookup(CapabilityKind::Update, ctype, otype))
    }

    fn get_read_capability(
        &self,
        ctype: ControllerType,
        _dt: DatastoreVersion,
        otype: ObjectType,
    ) -> UpllResult<Capability> {
        Ok(self.lookup(CapabilityKind::Read, ctype, otype))
    }

    fn get_state_capability(
        &self,
        ctype: ControllerType,
        _dt: DatastoreVersion,
        otype: ObjectType,
    ) -> UpllResult<Capability> {
        Ok(self.lookup(CapabilityKind::State, ctype, otype))
    }
}

/// Mark the present attributes a controller does not support as not supported, in validity and
/// in config-status. Returns the indices that were filtered out.
pub fn filter_entity(entity: &mut Entity, capability: &Capability) -> Vec<usize> {
    let Some(config) = entity.value.config.as_mut() else {
        return Vec::new();
    };
    let mut filtered = Vec::new();
    for index in config.present() {
        if capability.supports(index) {
            continue;
        }
        if let Ok(attr) = config.attr_mut(index) {
            attr.valid = AttributeValidity::NotSupported;
            attr.cs = ConfigStatus::NotSupported;
            filtered.push(index);
        }
    }
    if !filtered.is_empty() {
        trace!("{}: attributes {filtered:?} not supported", entity.key);
    }
    filtered
}

#[cfg(test)]
mod test {
    use super::*;
    use model::schema::attrs;
    use model::{ObjectKey, ValueBlock};
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_entries_support_everything() {
        let caps = StaticCapabilities::new();
        let cap = caps
            .get_create_capability(ControllerType::Pfc, DatastoreVersion::Candidate, ObjectType::Vbridge)
            .unwrap();
        assert_eq!(cap, Capability::full());
        assert!(cap.supports(7));
        let unknown = caps
            .get_create_capability(ControllerType::Unknown, DatastoreVersion::Candidate, ObjectType::Vbridge)
            .unwrap();
        assert!(!unknown.supports(0));
        assert_eq!(unknown.max_instances, Some(0));
    }

    #[test]
    fn unsupported_attributes_are_marked() {
        let caps = StaticCapabilities::new().with(
            CapabilityKind::Update,
            ControllerType::Odc,
            ObjectType::Vbridge,
            Capability::full().supporting([attrs::vbr::DESCRIPTION]),
        );
        let cap = caps
            .capability(
                CapabilityKind::Update,
                ControllerType::Odc,
                DatastoreVersion::Running,
                ObjectType::Vbridge,
            )
            .unwrap();
        let mut config = ValueBlock::new(3);
        config.set(attrs::vbr::DESCRIPTION, "d").unwrap();
        config.set(attrs::vbr::HOST_ADDR_PREFIXLEN, 24u8).unwrap();
        let mut entity = Entity::new(ObjectKey::vbridge("T1", "B1")).with_config(config);
        assert_eq!(filter_entity(&mut entity, &cap), vec![attrs::vbr::HOST_ADDR_PREFIXLEN]);
        let config = entity.config().unwrap();
        let attr = config.attr(attrs::vbr::HOST_ADDR_PREFIXLEN).unwrap();
        assert_eq!(attr.valid, AttributeValidity::NotSupported);
        assert_eq!(attr.cs, ConfigStatus::NotSupported);
        // never present, left alone
        let attr = config.attr(attrs::vbr::HOST_ADDR).unwrap();
        assert_eq!(attr.valid, AttributeValidity::Invalid);
        assert_eq!(config.value(attrs::vbr::DESCRIPTION).map(ToString::to_string), Some("d".to_owned()));
    }
}
