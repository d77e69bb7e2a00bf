// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Rename Registry: the reversible mapping between the logical name of an object and the name
//! it carries on one controller-domain.

use crate::binder::{DbSubOp, ReadShape, bind, entity_from_row};
use model::{
    AbsentOk, DatastoreVersion, Entity, FieldValue, ObjectKey, ObjectType, Operation,
    SchemaRegistry, TableKind, UpllError, UpllResult,
};
use multi_index_map::MultiIndexMap;
use std::fmt::Display;
use store::VersionedStore;
#[allow(unused)]
use tracing::{debug, error, warn};

/// One side of a rename: a key as seen at a controller-domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenameSide {
    pub key: ObjectKey,
    pub controller: String,
    pub domain: String,
}

impl RenameSide {
    #[must_use]
    pub fn new(key: ObjectKey, controller: &str, domain: &str) -> Self {
        Self {
            key,
            controller: controller.to_owned(),
            domain: domain.to_owned(),
        }
    }
}

impl Display for RenameSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}/{}", self.key, self.controller, self.domain)
    }
}

#[derive(Clone, Debug, MultiIndexMap)]
#[multi_index_derive(Debug, Clone, Default)]
pub struct RenameEntry {
    /// Name in the configuration.
    #[multi_index(hashed_unique)]
    pub logical: RenameSide,
    /// Name on the controller.
    #[multi_index(hashed_unique)]
    pub physical: RenameSide,
    #[multi_index(ordered_non_unique)]
    pub tenant: String,
}

/// Key of the renamed object on the controller, out of the config block of its rename row.
fn physical_key(otype: ObjectType, entity: &Entity) -> UpllResult<ObjectKey> {
    let fields = (0..otype.key_arity())
        .map(|i| entity.config_value(i).cloned())
        .collect::<Vec<_>>();
    if fields.iter().any(Option::is_none) {
        return Err(UpllError::Generic(format!(
            "rename row of {} lacks controller names",
            entity.key
        )));
    }
    ObjectKey::new(otype, fields)
}

#[derive(Debug, Default)]
pub struct RenameRegistry {
    entries: MultiIndexRenameEntryMap,
}

impl RenameRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record that `logical` is known as `physical` at the controller-domain.
    ///
    /// Fails with [`UpllError::InstanceExists`] if either name is already mapped there.
    pub fn register(
        &mut self,
        logical: &ObjectKey,
        physical: &ObjectKey,
        controller: &str,
        domain: &str,
    ) -> UpllResult {
        let entry = RenameEntry {
            logical: RenameSide::new(logical.clone(), controller, domain),
            physical: RenameSide::new(physical.clone(), controller, domain),
            tenant: logical.tenant().unwrap_or_default().to_owned(),
        };
        match self.entries.try_insert(entry) {
            Ok(entry) => {
                debug!("Registered rename {} -> {}", entry.logical, entry.physical.key);
                Ok(())
            }
            Err(_) => {
                debug!("Rename of {logical} to {physical} at {controller}/{domain} collides");
                Err(UpllError::InstanceExists)
            }
        }
    }

    /// The name of a configured object on a controller-domain. Objects that were never renamed
    /// keep their own name.
    #[must_use]
    pub fn to_controller(&self, logical: &ObjectKey, controller: &str, domain: &str) -> ObjectKey {
        let side = RenameSide::new(logical.clone(), controller, domain);
        self.entries
            .get_by_logical(&side)
            .map_or_else(|| logical.clone(), |e| e.physical.key.clone())
    }

    /// The configured object behind a name reported by a controller-domain.
    #[must_use]
    pub fn to_logical(&self, physical: &ObjectKey, controller: &str, domain: &str) -> ObjectKey {
        let side = RenameSide::new(physical.clone(), controller, domain);
        self.entries
            .get_by_physical(&side)
            .map_or_else(|| physical.clone(), |e| e.logical.key.clone())
    }

    /// Tell if a name is taken on a controller-domain, either by a renamed object or as the
    /// target of a rename.
    #[must_use]
    pub fn is_mapped(&self, key: &ObjectKey, controller: &str, domain: &str) -> bool {
        let side = RenameSide::new(key.clone(), controller, domain);
        self.entries.get_by_logical(&side).is_some()
            || self.entries.get_by_physical(&side).is_some()
    }

    /// Forget the rename of an object. Fails with [`UpllError::NoSuchInstance`] if it has none.
    pub fn remove(&mut self, logical: &ObjectKey, controller: &str, domain: &str) -> UpllResult {
        let side = RenameSide::new(logical.clone(), controller, domain);
        let entry = self
            .entries
            .remove_by_logical(&side)
            .ok_or(UpllError::NoSuchInstance)?;
        debug!("Removed rename {} -> {}", entry.logical, entry.physical.key);
        Ok(())
    }

    /// Forget every rename of a tenant.
    pub fn remove_tenant(&mut self, tenant: &str) -> usize {
        let removed = self.entries.remove_by_tenant(&tenant.to_owned()).len();
        debug!("Removed {removed} rename(s) of tenant {tenant}");
        removed
    }

    /// Renames of a tenant, in no particular order.
    #[must_use]
    pub fn of_tenant(&self, tenant: &str) -> Vec<&RenameEntry> {
        self.entries.get_by_tenant(&tenant.to_owned())
    }

    /// Rebuild the registry from the rename tables of a datastore version.
    pub fn reload(
        &mut self,
        store: &dyn VersionedStore,
        schemas: &SchemaRegistry,
        dt: DatastoreVersion,
    ) -> UpllResult {
        self.entries.clear();
        for otype in ObjectType::hierarchy_order() {
            if !schemas.has(otype, TableKind::Rename) {
                continue;
            }
            let schema = schemas.get(otype, TableKind::Rename)?;
            let mut pattern = Entity::new(ObjectKey::wildcard(otype));
            let query = bind(
                &mut pattern,
                Operation::Read,
                dt,
                &schema,
                DbSubOp::new(ReadShape::Multi),
            )?;
            let Some(rows) = store.read(&query).absent_ok()? else {
                continue;
            };
            for row in &rows {
                let entity = entity_from_row(&schema, row)?;
                let (Some(controller), Some(domain)) = (
                    entity.scope.controller.as_deref(),
                    entity.scope.domain.as_deref(),
                ) else {
                    warn!("Rename row of {} has no controller-domain", entity.key);
                    continue;
                };
                let physical = physical_key(otype, &entity)?;
                if let Err(e) = self.register(&entity.key, &physical, controller, domain) {
                    warn!("Skipping rename row of {}: {e}", entity.key);
                }
            }
        }
        debug!("Loaded {} rename(s) from {dt}", self.len());
        Ok(())
    }
}

/// The controller name of a text key field, if the key carries one there.
pub(crate) fn name_field(key: &ObjectKey, index: usize) -> Option<String> {
    key.field(index).and_then(FieldValue::as_str).map(str::to_owned)
}
