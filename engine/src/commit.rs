// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Commit and abort of the CANDIDATE configuration.
//!
//! A commit applies the diffs of CANDIDATE against RUNNING to RUNNING, deletes first in
//! reverse hierarchy order, then creates and updates parents first. Statuses of the objects
//! that came or went are settled last, once RUNNING holds the new configuration.

use crate::binder::{BindFlags, DbSubOp, bind, copy_query, entity_row, identity_update};
use crate::capability::{CapabilityKind, filter_entity};
use crate::cascade::Cascade;
use crate::diff::{DiffEntry, DiffRequest, collect};
use crate::engine::{ConfigEngine, RequestHeader};
use model::schema::Slot;
use model::{
    AbsentOk, AggregateStatus, ConfigScope, ConfigStatus, DatastoreVersion, Entity, FieldValue,
    ObjectKey, ObjectType, OperStatus, Operation, TableKind, TableSchema, UpllError, UpllResult,
};
use operstatus::{StatusChange, StatusNode};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use store::Row;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// One row change pushed to a controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigChange {
    pub op: Operation,
    pub kind: TableKind,
    pub entity: Entity,
    /// Attributes the target controller does not support, left out of the change.
    pub filtered: Vec<usize>,
}

/// Outcome of a commit: the changes per controller-domain and the status transitions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub per_controller: BTreeMap<(String, String), Vec<ConfigChange>>,
    /// Changes of objects mapped to no controller.
    pub global: Vec<ConfigChange>,
    pub status_changes: Vec<StatusChange>,
}

impl CommitReport {
    fn push(&mut self, change: ConfigChange) {
        let scope = &change.entity.scope;
        match (scope.controller.clone(), scope.domain.clone()) {
            (Some(c), Some(d)) => self.per_controller.entry((c, d)).or_default().push(change),
            _ => self.global.push(change),
        }
    }

    pub fn changes(&self) -> impl Iterator<Item = &ConfigChange> {
        self.global
            .iter()
            .chain(self.per_controller.values().flatten())
    }

    #[must_use]
    pub fn for_controller(&self, controller: &str, domain: &str) -> &[ConfigChange] {
        self.per_controller
            .get(&(controller.to_owned(), domain.to_owned()))
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.per_controller.is_empty()
    }
}

/// Diffs of one table.
struct TableDiff {
    schema: Arc<TableSchema>,
    created: Vec<Entity>,
    updated: Vec<DiffEntry>,
    deleted: Vec<Entity>,
}

/// vnodes owning an object, for the children of vnodes.
fn vnode_parents(key: &ObjectKey) -> Vec<ObjectKey> {
    key.otype()
        .parents()
        .into_iter()
        .filter(|p| p.is_vnode())
        .filter_map(|p| key.parent(p))
        .collect()
}

impl ConfigEngine {
    /// Apply CANDIDATE to RUNNING, for the whole configuration or the tenant the request is
    /// fenced to.
    pub fn commit(&mut self, header: &RequestHeader) -> UpllResult<CommitReport> {
        if header.datastore != DatastoreVersion::Candidate {
            return Err(UpllError::Generic(format!(
                "cannot commit {}",
                header.datastore
            )));
        }
        info!(
            "Session {} config {}: committing {:?}",
            header.session_id, header.config_id, header.scope
        );
        let diffs = self.collect_changes(&header.scope)?;
        let mut report = CommitReport::default();
        for table in diffs.iter().rev() {
            for old in &table.deleted {
                self.commit_delete(&table.schema, old, &mut report)?;
            }
        }
        for table in &diffs {
            for new in &table.created {
                self.commit_create(&table.schema, new.clone(), &mut report)?;
            }
            for entry in &table.updated {
                self.commit_update(&table.schema, entry, &mut report)?;
            }
        }
        self.settle_status(&diffs, &mut report)?;
        self.pools.finalize(&header.scope);
        info!(
            "Session {}: committed {} change(s), {} status change(s)",
            header.session_id,
            report.changes().count(),
            report.status_changes.len()
        );
        Ok(report)
    }

    fn collect_changes(&self, scope: &ConfigScope) -> UpllResult<Vec<TableDiff>> {
        let tenant = scope.tenant();
        let mut diffs = Vec::new();
        for otype in ObjectType::hierarchy_order() {
            if tenant.is_some() && !otype.is_tenant_scoped() {
                continue;
            }
            let mut tables = vec![self.main_schema(otype)?];
            tables.extend(self.schemas.aux_tables(otype));
            for schema in tables {
                let request = |op| {
                    DiffRequest::new(
                        op,
                        DatastoreVersion::Candidate,
                        DatastoreVersion::Running,
                        schema.clone(),
                    )
                    .tenant(tenant)
                    .with_params(&self.params)
                };
                let store = self.store.as_ref();
                let created = collect(store, &request(Operation::Create))?
                    .into_iter()
                    .filter_map(|e| e.new)
                    .collect();
                let updated = collect(store, &request(Operation::Update))?;
                let deleted = collect(store, &request(Operation::Delete))?
                    .into_iter()
                    .filter_map(|e| e.old)
                    .collect();
                diffs.push(TableDiff {
                    schema,
                    created,
                    updated,
                    deleted,
                });
            }
        }
        Ok(diffs)
    }

    /// Status path of a row, if its table carries a status.
    fn row_status_path(
        schema: &TableSchema,
        entity: &Entity,
    ) -> UpllResult<Option<Vec<StatusNode>>> {
        if !schema.has_status() {
            return Ok(None);
        }
        match schema.kind() {
            TableKind::Main => Self::path_for(&entity.key, &entity.scope).map(Some),
            TableKind::Controller => {
                let (Some(t), Some(c), Some(d)) = (
                    entity.key.tenant(),
                    entity.scope.controller.as_deref(),
                    entity.scope.domain.as_deref(),
                ) else {
                    return Ok(None);
                };
                Ok(Some(vec![
                    StatusNode::tenant_controller(t, c, d),
                    StatusNode::Object(ObjectKey::vtn(t)),
                ]))
            }
            _ => Ok(None),
        }
    }

    fn commit_delete(
        &mut self,
        schema: &Arc<TableSchema>,
        old: &Entity,
        report: &mut CommitReport,
    ) -> UpllResult {
        let running = DatastoreVersion::Running;
        if let Some(path) = Self::row_status_path(schema, old)? {
            if let Some(changes) = self.status.detach(&path).absent_ok()? {
                report.status_changes.extend(changes);
            }
        }
        if schema.kind() == TableKind::Main {
            Cascade::new(self.store.as_ref(), &self.schemas, &self.managers)
                .with_pools(&mut self.pools)
                .delete_subtree(&old.key, running, &ConfigScope::Global)?;
        } else {
            let mut gone = Entity::new(old.key.clone()).with_scope(old.scope.clone());
            let sub = DbSubOp::default().with(BindFlags::SCOPE_MATCH);
            let query = bind(&mut gone, Operation::Delete, running, schema, sub)?;
            self.store.delete(&query).absent_ok()?;
        }
        trace!("Committed delete of {old} from {}", schema.name());
        report.push(ConfigChange {
            op: Operation::Delete,
            kind: schema.kind(),
            entity: old.clone(),
            filtered: Vec::new(),
        });
        Ok(())
    }

    /// Mark the configuration of an entity applied, except for what the controller it is
    /// mapped to does not support. Returns the filtered attributes.
    fn apply_capability(
        &self,
        kind: CapabilityKind,
        schema: &TableSchema,
        entity: &mut Entity,
    ) -> UpllResult<Vec<usize>> {
        entity
            .config_or_alloc(schema.config_len())
            .mark_cs(ConfigStatus::Applied);
        if schema.kind() != TableKind::Main || !schema.is_scoped() {
            return Ok(Vec::new());
        }
        let Some(controller) = entity.scope.controller.as_deref() else {
            return Ok(Vec::new());
        };
        let running = DatastoreVersion::Running;
        let Some(ctype) = self
            .controllers
            .get_controller_type(controller, running)
            .absent_ok()?
        else {
            trace!("{controller} is not registered, {} goes as is", entity.key);
            return Ok(Vec::new());
        };
        let capability = self
            .capabilities
            .capability(kind, ctype, running, schema.otype())?;
        Ok(filter_entity(entity, &capability))
    }

    /// Config-status of the committed row back into CANDIDATE, and the changed flag cleared.
    fn settle_candidate(&self, schema: &Arc<TableSchema>, row: &Row) -> UpllResult {
        let mut writes: Vec<(Slot, Option<FieldValue>)> = schema
            .fields()
            .iter()
            .filter(|d| matches!(d.slot, Slot::RowCs | Slot::ConfigCs(_)))
            .map(|d| (d.slot, row.get(&d.slot).cloned()))
            .collect();
        writes.push((Slot::Changed, Some(FieldValue::Bool(false))));
        let query = identity_update(schema, DatastoreVersion::Candidate, row, writes);
        self.store.update(&query).absent_ok()?;
        Ok(())
    }

    fn commit_create(
        &mut self,
        schema: &Arc<TableSchema>,
        mut entity: Entity,
        report: &mut CommitReport,
    ) -> UpllResult {
        let filtered = self.apply_capability(CapabilityKind::Create, schema, &mut entity)?;
        entity.changed = false;
        if schema.has_status() {
            entity.value.status = Some(AggregateStatus::uninit());
        }
        let row = entity_row(schema, &entity);
        self.store
            .create(&copy_query(schema, DatastoreVersion::Running, &row))
            .inspect_err(|e| error!("Failed to commit {entity}: {e}"))?;
        self.settle_candidate(schema, &row)?;
        trace!("Committed create of {entity} into {}", schema.name());
        report.push(ConfigChange {
            op: Operation::Create,
            kind: schema.kind(),
            entity,
            filtered,
        });
        Ok(())
    }

    fn commit_update(
        &mut self,
        schema: &Arc<TableSchema>,
        entry: &DiffEntry,
        report: &mut CommitReport,
    ) -> UpllResult {
        let Some(mut entity) = entry.new.clone() else {
            return Ok(());
        };
        let filtered = self.apply_capability(CapabilityKind::Update, schema, &mut entity)?;
        let row = entity_row(schema, &entity);
        let writes: Vec<(Slot, Option<FieldValue>)> = schema
            .fields()
            .iter()
            .filter(|d| match d.slot {
                Slot::Config(_)
                | Slot::ConfigValid(_)
                | Slot::ConfigCs(_)
                | Slot::RowCs
                | Slot::Flags => true,
                Slot::Controller | Slot::Domain => !schema.is_controller_scoped(),
                _ => false,
            })
            .map(|d| (d.slot, row.get(&d.slot).cloned()))
            .collect();
        self.store
            .update(&identity_update(schema, DatastoreVersion::Running, &row, writes))?;
        self.settle_candidate(schema, &row)?;
        trace!("Committed update of {entity} into {}", schema.name());
        report.push(ConfigChange {
            op: Operation::Update,
            kind: schema.kind(),
            entity,
            filtered,
        });
        Ok(())
    }

    //////////////////////////////////////////////////////////////////
    /// Status
    //////////////////////////////////////////////////////////////////

    /// Stand-alone status of a committed vnode, given its children in RUNNING.
    fn stand_alone_status(&self, key: &ObjectKey) -> UpllResult<Option<OperStatus>> {
        let counts = self.child_counts(key, DatastoreVersion::Running)?;
        Ok(self.managers.get(key.otype())?.stand_alone(&counts))
    }

    /// Bring the statuses in line with the committed rows. Deleted rows were detached already.
    fn settle_status(&mut self, diffs: &[TableDiff], report: &mut CommitReport) -> UpllResult {
        let mut vtns = Vec::new();
        let mut tenant_ctrlrs = Vec::new();
        let mut vnodes = Vec::new();
        let mut interfaces = Vec::new();
        let mut touched = BTreeSet::new();
        let mut settled = BTreeSet::new();
        for table in diffs {
            let kind = table.schema.kind();
            for entity in &table.created {
                let otype = entity.key.otype();
                match kind {
                    TableKind::Controller => {
                        if let Some(path) = Self::row_status_path(&table.schema, entity)? {
                            tenant_ctrlrs.push(path);
                        }
                    }
                    TableKind::Main if otype == ObjectType::Vtn => vtns.push(entity.key.clone()),
                    TableKind::Main if otype.is_vnode() => {
                        settled.insert(entity.key.clone());
                        vnodes.push(entity);
                    }
                    TableKind::Main => {
                        if otype.is_vnode_if() {
                            interfaces.push(entity);
                        }
                        touched.extend(vnode_parents(&entity.key));
                    }
                    _ => {}
                }
            }
            if kind != TableKind::Main {
                continue;
            }
            for entity in &table.deleted {
                if entity.key.otype().is_vnode() {
                    settled.insert(entity.key.clone());
                } else {
                    touched.extend(vnode_parents(&entity.key));
                }
            }
        }

        let mut changes = Vec::new();
        for vtn in &vtns {
            changes.extend(self.status.attach(&[StatusNode::Object(vtn.clone())], None)?);
        }
        for path in &tenant_ctrlrs {
            changes.extend(self.status.attach(path, None)?);
        }
        let mut pending = Vec::new();
        for vnode in vnodes {
            let path = Self::path_for(&vnode.key, &vnode.scope)?;
            let stand_alone = self.stand_alone_status(&vnode.key)?;
            changes.extend(self.status.attach(&path, stand_alone)?);
            if stand_alone.is_none() {
                pending.push(path);
            }
        }
        for interface in interfaces {
            let path = Self::path_for(&interface.key, &interface.scope)?;
            changes.extend(self.status.attach(&path, None)?);
        }
        for key in touched.difference(&settled) {
            let Some(existing) = self.fetch(key, DatastoreVersion::Running).absent_ok()? else {
                continue;
            };
            let path = Self::path_for(key, &existing.scope)?;
            let stand_alone = self.stand_alone_status(key)?;
            changes.extend(self.status.set_stand_alone(&path, stand_alone)?);
        }
        pending.extend(tenant_ctrlrs);
        pending.extend(vtns.into_iter().map(|vtn| vec![StatusNode::Object(vtn)]));
        for path in &pending {
            let Some(node) = path.first() else {
                continue;
            };
            if self.status.status(node)?.oper_status == OperStatus::Uninit {
                changes.extend(self.status.recompute(path)?);
            }
        }
        debug!("{} status change(s) on commit", changes.len());
        report.status_changes.extend(changes);
        Ok(())
    }

    //////////////////////////////////////////////////////////////////
    /// Abort
    //////////////////////////////////////////////////////////////////

    /// Throw away the uncommitted changes: CANDIDATE becomes a copy of RUNNING again, for the
    /// whole configuration or the tenant the request is fenced to. Returns the number of rows
    /// restored.
    pub fn abort(&mut self, header: &RequestHeader) -> UpllResult<usize> {
        let roots: Vec<ObjectKey> = match header.scope.tenant() {
            Some(tenant) => vec![ObjectKey::vtn(tenant)],
            None => ObjectType::hierarchy_order()
                .into_iter()
                .filter(|t| t.is_root())
                .map(ObjectKey::wildcard)
                .collect(),
        };
        let mut restored = 0;
        for root in &roots {
            restored += Cascade::new(self.store.as_ref(), &self.schemas, &self.managers)
                .restore_subtree(root, DatastoreVersion::Running, DatastoreVersion::Candidate)?;
        }
        self.pools.abort(&header.scope)?;
        self.renames
            .reload(self.store.as_ref(), &self.schemas, DatastoreVersion::Candidate)?;
        info!(
            "Session {}: aborted, {restored} row(s) restored",
            header.session_id
        );
        Ok(restored)
    }
}
