// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Hierarchical Cascade: recursive delete, restore and rename propagation over the declared
//! parent-children tree of object types.

use crate::binder::{
    DbSubOp, bind, copy_query, entity_from_row, full_row_query, identity_update,
};
use crate::managers::ManagerRegistry;
use idalloc::{AllocatorError, IdPools, LabelOwner, PoolKind, PoolScope};
use model::schema::Slot;
use model::{
    AbsentOk, ConfigScope, DatastoreVersion, Entity, FieldValue, Label, ObjectKey, Operation,
    SchemaRegistry, ScopeData, ScopeFlags, TableKind, TableSchema, UpllError, UpllResult,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use store::VersionedStore;
#[allow(unused)]
use tracing::{debug, error, trace, warn};

/// The holder of a label: the object, at its controller-domain when it has one.
pub(crate) fn label_owner(key: &ObjectKey, scope: &ScopeData) -> LabelOwner {
    match (scope.controller.as_deref(), scope.domain.as_deref()) {
        (Some(c), Some(d)) => LabelOwner::of(key).at(c, d),
        _ => LabelOwner::of(key),
    }
}

/// The pool a label of `kind` held by an object comes from.
pub(crate) fn label_scope(kind: PoolKind, key: &ObjectKey, scope: &ScopeData) -> UpllResult<PoolScope> {
    match kind {
        PoolKind::Vbid => key
            .tenant()
            .map(PoolScope::tenant)
            .ok_or_else(|| UpllError::Generic(format!("{key} has no tenant for its {kind}"))),
        PoolKind::Gvtnid => match (scope.controller.as_deref(), scope.domain.as_deref()) {
            (Some(c), Some(d)) => Ok(PoolScope::controller_domain(c, d)),
            _ => Err(UpllError::Generic(format!(
                "{key} has no controller-domain for its {kind}"
            ))),
        },
    }
}

/// One cascading walk. Pool reconciliation only happens if pools are given.
pub struct Cascade<'a> {
    store: &'a dyn VersionedStore,
    schemas: &'a SchemaRegistry,
    managers: &'a ManagerRegistry,
    pools: Option<&'a mut IdPools>,
    /// Patterns already handled in this walk. Shared child tables are reached once per
    /// parent type and must be processed once.
    visited: BTreeSet<ObjectKey>,
}

impl<'a> Cascade<'a> {
    #[must_use]
    pub fn new(
        store: &'a dyn VersionedStore,
        schemas: &'a SchemaRegistry,
        managers: &'a ManagerRegistry,
    ) -> Self {
        Self {
            store,
            schemas,
            managers,
            pools: None,
            visited: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_pools(mut self, pools: &'a mut IdPools) -> Self {
        self.pools = Some(pools);
        self
    }

    /// Tables of a type, main table first.
    fn tables(&self, otype: model::ObjectType) -> UpllResult<Vec<Arc<TableSchema>>> {
        let mut tables = vec![self.schemas.get(otype, TableKind::Main)?];
        tables.extend(self.schemas.aux_tables(otype));
        Ok(tables)
    }

    //////////////////////////////////////////////////////////////////
    /// Delete
    //////////////////////////////////////////////////////////////////

    /// Delete the rows of `key` (a complete key or a pattern) and of all its descendants in
    /// `dt`. Returns the number of rows removed; deleting what is not there removes nothing
    /// and succeeds.
    ///
    /// # Errors
    ///
    /// Fails with [`UpllError::CfgSemantic`] if `scope` fences the key off, and with the
    /// first error other than absence met on the way.
    pub fn delete_subtree(
        &mut self,
        key: &ObjectKey,
        dt: DatastoreVersion,
        scope: &ConfigScope,
    ) -> UpllResult<usize> {
        if !scope.admits(key) {
            warn!("Refusing to delete {key} outside of {scope:?}");
            return Err(UpllError::CfgSemantic(format!("{key} is outside of the config scope")));
        }
        self.visited.clear();
        let removed = self.delete_rows(key, dt)?;
        debug!("Deleted {removed} row(s) under {key} in {dt}");
        Ok(removed)
    }

    fn delete_rows(&mut self, key: &ObjectKey, dt: DatastoreVersion) -> UpllResult<usize> {
        if !self.visited.insert(key.clone()) {
            trace!("{key} already deleted in this walk");
            return Ok(0);
        }
        let otype = key.otype();
        let mut removed = 0;
        for child in otype.children() {
            let pattern = key.child_pattern(*child)?;
            removed += self.delete_rows(&pattern, dt).inspect_err(|e| {
                error!("Failed to delete {pattern} in {dt}: {e}");
            })?;
        }
        self.release_labels(key, dt)?;
        self.release_owned_pool(key, dt)?;
        // auxiliary tables go first: they are meaningless without their main row
        let mut tables = self.tables(otype)?;
        tables.rotate_left(1);
        for schema in &tables {
            removed += self.delete_table(schema, key, dt)?;
        }
        Ok(removed)
    }

    fn delete_table(
        &self,
        schema: &Arc<TableSchema>,
        key: &ObjectKey,
        dt: DatastoreVersion,
    ) -> UpllResult<usize> {
        let mut pattern = Entity::new(key.clone());
        let query = bind(&mut pattern, Operation::Delete, dt, schema, DbSubOp::default())?;
        let removed = self.store.delete(&query).absent_ok()?.unwrap_or_default();
        if removed > 0 {
            trace!("Deleted {removed} row(s) of {}", schema.table_name(dt));
        }
        Ok(removed)
    }

    /// Put the labels held by the rows about to go in the pending-delete shadow of their pool.
    fn release_labels(&mut self, key: &ObjectKey, dt: DatastoreVersion) -> UpllResult {
        if dt != DatastoreVersion::Candidate || self.pools.is_none() {
            return Ok(());
        }
        let Some(policy) = self.managers.get(key.otype())?.label_policy() else {
            return Ok(());
        };
        let schema = self.schemas.get(key.otype(), policy.table)?;
        let query = full_row_query(&schema, dt, key);
        let Some(rows) = self.store.read(&query).absent_ok()? else {
            return Ok(());
        };
        let mut held = Vec::new();
        for row in &rows {
            let entity = entity_from_row(&schema, row)?;
            let Some(label) = entity
                .config_value(policy.attr)
                .and_then(FieldValue::as_u32)
                .and_then(|raw| Label::new_checked(raw).ok())
            else {
                continue;
            };
            let scope = label_scope(policy.kind, &entity.key, &entity.scope)?;
            held.push((scope, label, label_owner(&entity.key, &entity.scope)));
        }
        let Some(pools) = self.pools.as_deref_mut() else {
            return Ok(());
        };
        for (scope, label, owner) in held {
            match pools.mark_pending_delete(policy.kind, &scope, label, &owner) {
                Ok(()) => {}
                Err(AllocatorError::NotAllocated(_)) => {
                    warn!("{} {label} of {owner} was not allocated", policy.kind);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Drop the pools owned by the objects about to go, so no pool outlives its owner.
    fn release_owned_pool(&mut self, key: &ObjectKey, dt: DatastoreVersion) -> UpllResult {
        if dt != DatastoreVersion::Running || self.pools.is_none() {
            return Ok(());
        }
        let Some(kind) = self.managers.get(key.otype())?.owned_pool() else {
            return Ok(());
        };
        let owners = if key.is_complete() {
            vec![key.clone()]
        } else {
            let schema = self.schemas.get(key.otype(), TableKind::Main)?;
            let query = full_row_query(&schema, dt, key);
            self.store
                .read(&query)
                .absent_ok()?
                .unwrap_or_default()
                .iter()
                .map(|row| entity_from_row(&schema, row).map(|e| e.key))
                .collect::<UpllResult<Vec<_>>>()?
        };
        let Some(pools) = self.pools.as_deref_mut() else {
            return Ok(());
        };
        for owner in owners {
            if let Some(tenant) = owner.tenant() {
                pools.release_scope(kind, &PoolScope::tenant(tenant))?;
            }
        }
        Ok(())
    }

    //////////////////////////////////////////////////////////////////
    /// Restore
    //////////////////////////////////////////////////////////////////

    /// Make the subtree of `key` in `dst` a copy of the one in `src`. Returns the number of
    /// rows copied.
    pub fn restore_subtree(
        &mut self,
        key: &ObjectKey,
        src: DatastoreVersion,
        dst: DatastoreVersion,
    ) -> UpllResult<usize> {
        // the rows of `dst` are replaced, not deleted: their labels stay where they are
        let pools = self.pools.take();
        self.visited.clear();
        let deleted = self.delete_rows(key, dst);
        self.pools = pools;
        let deleted = deleted?;
        self.visited.clear();
        let copied = self.copy_rows(key, src, dst)?;
        debug!("Restored {key} in {dst} from {src}: {deleted} row(s) out, {copied} in");
        Ok(copied)
    }

    fn copy_rows(
        &mut self,
        key: &ObjectKey,
        src: DatastoreVersion,
        dst: DatastoreVersion,
    ) -> UpllResult<usize> {
        if !self.visited.insert(key.clone()) {
            return Ok(0);
        }
        let mut copied = 0;
        for schema in self.tables(key.otype())? {
            let query = full_row_query(&schema, src, key);
            let Some(rows) = self.store.read(&query).absent_ok()? else {
                continue;
            };
            for row in &rows {
                self.store.create(&copy_query(&schema, dst, row))?;
            }
            copied += rows.len();
        }
        for child in key.otype().children() {
            let pattern = key.child_pattern(*child)?;
            copied += self.copy_rows(&pattern, src, dst)?;
        }
        Ok(copied)
    }

    //////////////////////////////////////////////////////////////////
    /// Rename
    //////////////////////////////////////////////////////////////////

    /// Set `flag` on the rows of every descendant of `key` in `dt`, e.g. once a tenant got
    /// renamed on a controller. Returns the number of rows touched.
    pub fn propagate_rename(
        &mut self,
        key: &ObjectKey,
        dt: DatastoreVersion,
        flag: ScopeFlags,
    ) -> UpllResult<usize> {
        self.visited.clear();
        self.visited.insert(key.clone());
        let mut touched = 0;
        for child in key.otype().children() {
            let pattern = key.child_pattern(*child)?;
            touched += self.flag_rows(&pattern, dt, flag)?;
        }
        debug!("Flagged {touched} row(s) under {key} as {flag:?}");
        Ok(touched)
    }

    fn flag_rows(
        &mut self,
        key: &ObjectKey,
        dt: DatastoreVersion,
        flag: ScopeFlags,
    ) -> UpllResult<usize> {
        if !self.visited.insert(key.clone()) {
            return Ok(0);
        }
        let mut touched = 0;
        let schema = self.schemas.get(key.otype(), TableKind::Main)?;
        let query = full_row_query(&schema, dt, key);
        for row in self.store.read(&query).absent_ok()?.unwrap_or_default() {
            let flags = row
                .get(&Slot::Flags)
                .and_then(FieldValue::as_u8)
                .map_or(ScopeFlags::empty(), ScopeFlags::from_bits_truncate);
            if flags.contains(flag) {
                continue;
            }
            let value = FieldValue::U8((flags | flag).bits());
            self.store
                .update(&identity_update(&schema, dt, &row, [(Slot::Flags, Some(value))]))?;
            touched += 1;
        }
        for child in key.otype().children() {
            let pattern = key.child_pattern(*child)?;
            touched += self.flag_rows(&pattern, dt, flag)?;
        }
        Ok(touched)
    }
}
