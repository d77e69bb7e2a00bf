// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-type behaviour of configuration objects.

use idalloc::PoolKind;
use model::schema::{Slot, attrs};
use model::{
    Entity, FieldValue, ObjectKey, ObjectType, OperStatus, TableKind, TableSchema, UpllError,
    UpllResult,
};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;
#[allow(unused)]
use tracing::{debug, error};

/// Where an object keeps a label drawn from an identifier pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabelPolicy {
    pub kind: PoolKind,
    /// Table holding the label.
    pub table: TableKind,
    /// Index of the label among the configured attributes of that table.
    pub attr: usize,
}

/// Number of children of each type under one object.
pub type ChildCounts = BTreeMap<ObjectType, usize>;

/// Behaviour of one object type, as used by the generic request, cascade and commit code.
pub trait ObjectManager: Send + Sync {
    fn otype(&self) -> ObjectType;

    /// Keys of the objects this one may hang from. Any of them must exist on create.
    fn parent_keys(&self, key: &ObjectKey) -> Vec<ObjectKey> {
        key.otype()
            .parents()
            .into_iter()
            .filter_map(|p| key.parent(p))
            .collect()
    }

    /// Type-specific checks on configured values, after the generic ones.
    fn validate_semantics(&self, _entity: &Entity) -> UpllResult {
        Ok(())
    }

    /// Check the key fields and the present attributes of an entity against the table schema,
    /// then the type-specific rules.
    fn validate(&self, entity: &Entity, schema: &TableSchema) -> UpllResult {
        validate_against(entity, schema)?;
        self.validate_semantics(entity)
    }

    fn label_policy(&self) -> Option<LabelPolicy> {
        None
    }

    /// Pool released along with the object, whose scope the object names.
    fn owned_pool(&self) -> Option<PoolKind> {
        None
    }

    /// Tell if the object takes part in status aggregation.
    fn has_status(&self) -> bool {
        false
    }

    /// Status of the object when it has no interface to aggregate, given its children.
    fn stand_alone(&self, _children: &ChildCounts) -> Option<OperStatus> {
        None
    }
}

fn semantic(entity: &Entity, what: &str) -> UpllError {
    debug!("Rejecting {entity}: {what}");
    UpllError::CfgSemantic(format!("{}: {what}", entity.key))
}

/// Generic checks: every set key field and every valid value fits its column.
pub fn validate_against(entity: &Entity, schema: &TableSchema) -> UpllResult {
    for (i, field) in entity.key.fields().iter().enumerate() {
        let (Some(value), Some(d)) = (field, schema.descriptor(Slot::Key(i))) else {
            continue;
        };
        if !value.fits(d.kind, d.width) {
            return Err(semantic(entity, &format!("bad value {value} for key {}", d.column)));
        }
    }
    let Some(config) = entity.config() else {
        return Ok(());
    };
    if config.len() > schema.config_len() {
        error!("{}: {} attributes for table {}", entity.key, config.len(), schema.name());
        return Err(UpllError::Generic(format!(
            "{} carries {} attributes, table {} has {}",
            entity.key,
            config.len(),
            schema.name(),
            schema.config_len()
        )));
    }
    for (i, _) in config.iter() {
        let (Some(value), Some(d)) = (config.value(i), schema.descriptor(Slot::Config(i))) else {
            continue;
        };
        if !value.fits(d.kind, d.width) {
            return Err(semantic(entity, &format!("bad value {value} for {}", d.column)));
        }
    }
    Ok(())
}

fn within(value: Option<&FieldValue>, low: u64, high: u64) -> bool {
    value
        .and_then(FieldValue::as_u64)
        .is_none_or(|v| (low..=high).contains(&v))
}

//////////////////////////////////////////////////////////////////
/// Managers
//////////////////////////////////////////////////////////////////

struct VtnManager;

impl ObjectManager for VtnManager {
    fn otype(&self) -> ObjectType {
        ObjectType::Vtn
    }
    fn owned_pool(&self) -> Option<PoolKind> {
        Some(PoolKind::Vbid)
    }
    fn has_status(&self) -> bool {
        true
    }
}

struct VbridgeManager;

impl ObjectManager for VbridgeManager {
    fn otype(&self) -> ObjectType {
        ObjectType::Vbridge
    }
    fn validate_semantics(&self, entity: &Entity) -> UpllResult {
        let prefixlen = entity.config_value(attrs::vbr::HOST_ADDR_PREFIXLEN);
        if !within(prefixlen, 1, 30) {
            return Err(semantic(entity, "host address prefix length out of range"));
        }
        if prefixlen.is_some() && entity.config_value(attrs::vbr::HOST_ADDR).is_none() {
            return Err(semantic(entity, "prefix length without host address"));
        }
        Ok(())
    }
    fn label_policy(&self) -> Option<LabelPolicy> {
        Some(LabelPolicy {
            kind: PoolKind::Vbid,
            table: TableKind::Convert,
            attr: attrs::vbr_convert::LABEL,
        })
    }
    fn has_status(&self) -> bool {
        true
    }
    /// A bridge is down on its own until it gets an interface or a vlan-map.
    fn stand_alone(&self, children: &ChildCounts) -> Option<OperStatus> {
        let count = |t: ObjectType| children.get(&t).copied().unwrap_or_default();
        if count(ObjectType::VbrIf) + count(ObjectType::VbrVlanMap) > 0 {
            None
        } else {
            Some(OperStatus::Down)
        }
    }
}

/// vRouters, vTerminals and vTunnels: down while they have no interface.
struct VnodeManager {
    otype: ObjectType,
    interface: ObjectType,
}

impl ObjectManager for VnodeManager {
    fn otype(&self) -> ObjectType {
        self.otype
    }
    fn has_status(&self) -> bool {
        true
    }
    fn stand_alone(&self, children: &ChildCounts) -> Option<OperStatus> {
        if children.get(&self.interface).copied().unwrap_or_default() > 0 {
            None
        } else {
            Some(OperStatus::Down)
        }
    }
}

struct InterfaceManager {
    otype: ObjectType,
    vlan_id: Option<usize>,
}

impl ObjectManager for InterfaceManager {
    fn otype(&self) -> ObjectType {
        self.otype
    }
    fn validate_semantics(&self, entity: &Entity) -> UpllResult {
        if let Some(index) = self.vlan_id {
            if !within(entity.config_value(index), 1, 4095) {
                return Err(semantic(entity, "vlan id out of range"));
            }
        }
        if self.otype == ObjectType::VrtIf
            && !within(entity.config_value(attrs::vrt_if::PREFIXLEN), 1, 32)
        {
            return Err(semantic(entity, "prefix length out of range"));
        }
        Ok(())
    }
    fn has_status(&self) -> bool {
        true
    }
}

struct VlanMapManager;

impl ObjectManager for VlanMapManager {
    fn otype(&self) -> ObjectType {
        ObjectType::VbrVlanMap
    }
    fn validate_semantics(&self, entity: &Entity) -> UpllResult {
        // 0xffff stands for untagged traffic
        let vlan = entity.config_value(attrs::vlan_map::VLAN_ID).and_then(FieldValue::as_u64);
        match vlan {
            Some(v) if v != 0xffff && !(1..=4095).contains(&v) => {
                Err(semantic(entity, "vlan id out of range"))
            }
            _ => Ok(()),
        }
    }
}

struct UnifiedManager;

impl ObjectManager for UnifiedManager {
    fn otype(&self) -> ObjectType {
        ObjectType::VtnUnified
    }
    fn label_policy(&self) -> Option<LabelPolicy> {
        Some(LabelPolicy {
            kind: PoolKind::Gvtnid,
            table: TableKind::Main,
            attr: attrs::vtn_unified::LABEL,
        })
    }
}

/// Types with nothing beyond the generic checks.
struct PlainManager(ObjectType);

impl ObjectManager for PlainManager {
    fn otype(&self) -> ObjectType {
        self.0
    }
}

//////////////////////////////////////////////////////////////////
/// Registry
//////////////////////////////////////////////////////////////////

/// The manager of every object type, built once at startup.
pub struct ManagerRegistry {
    managers: BTreeMap<ObjectType, Box<dyn ObjectManager>>,
}

impl ManagerRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            managers: BTreeMap::new(),
        }
    }

    /// A manager for every built-in type.
    #[must_use]
    pub fn builtin() -> Self {
        use ObjectType as T;
        let mut registry = Self::empty();
        for otype in ObjectType::iter() {
            let manager: Box<dyn ObjectManager> = match otype {
                T::Vtn => Box::new(VtnManager),
                T::Vbridge => Box::new(VbridgeManager),
                T::Vrouter => Box::new(VnodeManager {
                    otype,
                    interface: T::VrtIf,
                }),
                T::Vterminal => Box::new(VnodeManager {
                    otype,
                    interface: T::VtermIf,
                }),
                T::Vtunnel => Box::new(VnodeManager {
                    otype,
                    interface: T::VtunnelIf,
                }),
                T::VbrIf => Box::new(InterfaceManager {
                    otype,
                    vlan_id: Some(attrs::vbr_if::VLAN_ID),
                }),
                T::VtermIf => Box::new(InterfaceManager {
                    otype,
                    vlan_id: Some(attrs::vterm_if::VLAN_ID),
                }),
                T::VrtIf | T::VtunnelIf => Box::new(InterfaceManager {
                    otype,
                    vlan_id: None,
                }),
                T::VbrVlanMap => Box::new(VlanMapManager),
                T::VtnUnified => Box::new(UnifiedManager),
                other => Box::new(PlainManager(other)),
            };
            registry.register(manager);
        }
        registry
    }

    /// Register a manager, replacing the one of the same type.
    pub fn register(&mut self, manager: Box<dyn ObjectManager>) {
        debug!("Registering manager of {}", manager.otype());
        self.managers.insert(manager.otype(), manager);
    }

    /// # Errors
    ///
    /// Fails with [`UpllError::Generic`] if no manager handles the type.
    pub fn get(&self, otype: ObjectType) -> UpllResult<&dyn ObjectManager> {
        self.managers.get(&otype).map(AsRef::as_ref).ok_or_else(|| {
            error!("No manager for {otype}");
            UpllError::Generic(format!("no manager for {otype}"))
        })
    }

    /// Types whose objects hold a label, with their policy.
    pub fn label_holders(&self) -> impl Iterator<Item = (ObjectType, LabelPolicy)> + '_ {
        self.managers
            .iter()
            .filter_map(|(otype, m)| m.label_policy().map(|p| (*otype, p)))
    }
}
