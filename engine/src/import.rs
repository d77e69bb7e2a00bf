// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Merge of the configuration imported from a controller-domain into CANDIDATE.
//!
//! vnodes whose name is taken in CANDIDATE are renamed, and the pair of names is recorded in
//! the rename table of the vnode type. Other objects that already exist are kept as they are.

use crate::binder::{BindFlags, DbSubOp, ReadShape, bind, entity_from_row, full_row_query};
use crate::cascade::{Cascade, label_owner, label_scope};
use crate::engine::ConfigEngine;
use crate::managers::LabelPolicy;
use crate::rename::name_field;
use idalloc::AllocatorError;
use model::schema::attrs;
use model::{
    AbsentOk, AttributeValidity, DatastoreVersion, Entity, FieldValue, Label, ObjectKey,
    ObjectType, Operation, ScopeData, ScopeFlags, TableKind, UpllError, UpllResult, ValueBlock,
};
use std::collections::BTreeMap;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Longest name a vnode takes.
const VNODE_NAME_WIDTH: usize = 31;

/// Outcome of a merge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub created: Vec<ObjectKey>,
    /// Imported objects that already existed and were kept.
    pub merged: Vec<ObjectKey>,
    /// vnodes created under another name, as (imported, created).
    pub renamed: Vec<(ObjectKey, ObjectKey)>,
}

fn truncated(name: &str, width: usize) -> String {
    name.chars().take(width).collect()
}

/// vnodes renamed by one merge, by tenant and imported name.
#[derive(Default)]
struct Renames(BTreeMap<(String, String), String>);

impl Renames {
    /// The key of an imported object under the new name of its vnode, if that got renamed.
    fn rekey(&self, key: &ObjectKey) -> UpllResult<ObjectKey> {
        let otype = key.otype();
        if otype.is_vnode() || !otype.is_tenant_scoped() || otype.key_arity() < 3 {
            return Ok(key.clone());
        }
        let (Some(tenant), Some(vnode)) = (key.tenant(), name_field(key, 1)) else {
            return Ok(key.clone());
        };
        let Some(new) = self.0.get(&(tenant.to_owned(), vnode)) else {
            return Ok(key.clone());
        };
        let mut rekeyed = key.clone();
        rekeyed.set_field(1, Some(FieldValue::text(new.as_str())))?;
        Ok(rekeyed)
    }
}

impl ConfigEngine {
    /// Merge the IMPORT rows of a controller-domain into CANDIDATE.
    ///
    /// Fails with [`UpllError::MergeConflict`] if the import holds vnodes of another
    /// controller-domain, if a vnode name is taken and renaming is off, if two vBridges of a
    /// tenant would share a host address, or if an imported label is already in use.
    pub fn merge_import(&mut self, controller: &str, domain: &str) -> UpllResult<MergeReport> {
        info!("Merging import of {controller}/{domain}");
        self.check_import_scope(controller, domain)?;
        let mut report = MergeReport::default();
        let mut renames = Renames::default();
        for otype in ObjectType::hierarchy_order() {
            let schema = self.main_schema(otype)?;
            let query = full_row_query(
                &schema,
                DatastoreVersion::Import,
                &ObjectKey::wildcard(otype),
            );
            let rows = self.store.read(&query).absent_ok()?.unwrap_or_default();
            for row in &rows {
                let mut entity = entity_from_row(&schema, row)?;
                entity.key = renames.rekey(&entity.key)?;
                if schema.is_scoped() {
                    entity.scope.controller = Some(controller.to_owned());
                    entity.scope.domain = Some(domain.to_owned());
                }
                self.merge_one(entity, &mut renames, &mut report)?;
            }
        }
        for (_, new) in &report.renamed {
            Cascade::new(self.store.as_ref(), &self.schemas, &self.managers).propagate_rename(
                new,
                DatastoreVersion::Candidate,
                ScopeFlags::VNODE_RENAMED,
            )?;
        }
        info!(
            "Merged import of {controller}/{domain}: {} created, {} kept, {} renamed",
            report.created.len(),
            report.merged.len(),
            report.renamed.len()
        );
        Ok(report)
    }

    /// Every imported vnode must be mapped to the controller-domain being merged.
    fn check_import_scope(&self, controller: &str, domain: &str) -> UpllResult {
        for otype in ObjectType::hierarchy_order()
            .into_iter()
            .filter(|t| t.is_vnode())
        {
            let schema = self.main_schema(otype)?;
            let text = format!(
                "SELECT ctrlr_name, domain_id, COUNT(*) FROM {} GROUP BY ctrlr_name, domain_id",
                schema.table_name(DatastoreVersion::Import)
            );
            let mut cursor = self.store.execute_raw_query(&text, &[])?;
            while let Some(group) = cursor.next_row()? {
                let (Some(c), Some(d)) = (
                    group.first().and_then(FieldValue::as_str),
                    group.get(1).and_then(FieldValue::as_str),
                ) else {
                    continue;
                };
                if c != controller || d != domain {
                    let count = group.get(2).and_then(FieldValue::as_u64).unwrap_or_default();
                    warn!("Import of {controller}/{domain} holds {count} {otype} of {c}/{d}");
                    return Err(UpllError::MergeConflict(format!(
                        "{count} {otype} of {c}/{d} in the import of {controller}/{domain}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn merge_one(
        &mut self,
        mut entity: Entity,
        renames: &mut Renames,
        report: &mut MergeReport,
    ) -> UpllResult {
        let dt = DatastoreVersion::Candidate;
        let otype = entity.key.otype();
        let schema = self.main_schema(otype)?;
        let imported = entity.key.clone();
        if self.exists(&entity.key, dt)? {
            if !otype.is_vnode() {
                trace!("{imported} already configured, kept");
                report.merged.push(imported);
                return Ok(());
            }
            if !self.params.auto_rename {
                return Err(UpllError::MergeConflict(format!(
                    "{imported} is already configured"
                )));
            }
            let renamed = self.rename_imported(&mut entity)?;
            if let (Some(tenant), Some(old), Some(new)) =
                (imported.tenant(), imported.name(), renamed.name())
            {
                renames.0.insert((tenant.to_owned(), old), new);
            }
            report.renamed.push((imported.clone(), renamed));
        }
        if otype == ObjectType::Vbridge {
            self.check_host_addr(&entity)?;
        }
        let label_policy = self.managers.get(otype)?.label_policy();
        if let Some(policy) = label_policy.filter(|p| p.table == TableKind::Main) {
            self.reserve_imported_label(&entity, policy)?;
        }
        entity.changed = true;
        let sub = DbSubOp::default().with(BindFlags::CHANGED);
        self.store
            .create(&bind(&mut entity, Operation::Create, dt, &schema, sub)?)?;
        if otype.is_vnode() {
            self.adjust_ref_count(&entity, dt, true)?;
        }
        debug!("Merged {entity}");
        report.created.push(entity.key);
        Ok(())
    }

    /// Give an imported vnode a free name and record the rename. Returns the new key.
    fn rename_imported(&mut self, entity: &mut Entity) -> UpllResult<ObjectKey> {
        let (Some(controller), Some(domain)) =
            (entity.scope.controller.clone(), entity.scope.domain.clone())
        else {
            return Err(UpllError::Generic(format!(
                "cannot rename {} without a controller-domain",
                entity.key
            )));
        };
        let (Some(tenant), Some(name)) = (entity.key.tenant().map(str::to_owned), entity.key.name())
        else {
            return Err(UpllError::Generic(format!("cannot rename {}", entity.key)));
        };
        let base = truncated(
            &format!("{}{name}", self.params.rename_prefix),
            VNODE_NAME_WIDTH,
        );
        let mut candidate = base.clone();
        let mut n = 1usize;
        let new_key = loop {
            let mut key = entity.key.clone();
            key.set_field(1, Some(FieldValue::text(candidate.as_str())))?;
            if !self.exists(&key, DatastoreVersion::Candidate)?
                && !self.renames.is_mapped(&key, &controller, &domain)
            {
                break key;
            }
            let suffix = format!("_{n}");
            candidate = format!(
                "{}{suffix}",
                truncated(&base, VNODE_NAME_WIDTH.saturating_sub(suffix.len()))
            );
            n += 1;
        };

        let rename_schema = self.schemas.get(entity.key.otype(), TableKind::Rename)?;
        let mut config = ValueBlock::new(rename_schema.config_len());
        config.set(attrs::vnode_rename::CTRLR_VTN_NAME, tenant.as_str())?;
        config.set(attrs::vnode_rename::CTRLR_VNODE_NAME, name.as_str())?;
        let mut rename_row = Entity::new(new_key.clone())
            .with_scope(ScopeData::new(&controller, &domain))
            .with_config(config);
        rename_row.changed = true;
        let sub = DbSubOp::default().with(BindFlags::CHANGED);
        self.store.create(&bind(
            &mut rename_row,
            Operation::Create,
            DatastoreVersion::Candidate,
            &rename_schema,
            sub,
        )?)?;
        self.renames
            .register(&new_key, &entity.key, &controller, &domain)?;
        info!("Imported {} renamed to {new_key}", entity.key);
        entity.key = new_key.clone();
        entity.scope.mark_renamed(ScopeFlags::VNODE_RENAMED);
        Ok(new_key)
    }

    /// vBridges of a tenant do not share a host address.
    fn check_host_addr(&self, entity: &Entity) -> UpllResult {
        let Some(addr) = entity.config_value(attrs::vbr::HOST_ADDR).cloned() else {
            return Ok(());
        };
        let Some(tenant) = entity.key.tenant() else {
            return Ok(());
        };
        let schema = self.main_schema(ObjectType::Vbridge)?;
        let mut pattern = ObjectKey::wildcard(ObjectType::Vbridge);
        pattern.set_field(0, Some(FieldValue::text(tenant)))?;
        let mut config = ValueBlock::new(schema.config_len());
        config.set(attrs::vbr::HOST_ADDR, addr.clone())?;
        let mut probe = Entity::new(pattern).with_config(config);
        let sub = DbSubOp::new(ReadShape::Exists).with(BindFlags::VALUE_MATCH);
        let query = bind(
            &mut probe,
            Operation::Read,
            DatastoreVersion::Candidate,
            &schema,
            sub,
        )?;
        if self.store.record_exists(&query)? {
            return Err(UpllError::MergeConflict(format!(
                "host address {addr} of {} is in use in {tenant}",
                entity.key
            )));
        }
        Ok(())
    }

    fn reserve_imported_label(&mut self, entity: &Entity, policy: LabelPolicy) -> UpllResult {
        let Some(raw) = entity
            .config()
            .and_then(|c| c.attr(policy.attr))
            .filter(|a| a.valid == AttributeValidity::Valid)
            .and_then(|a| a.value.as_ref())
            .and_then(FieldValue::as_u32)
        else {
            return Ok(());
        };
        let label = Label::new_checked(raw)?;
        let scope = label_scope(policy.kind, &entity.key, &entity.scope)?;
        let owner = label_owner(&entity.key, &entity.scope);
        match self.pools.reserve(policy.kind, &scope, label, &owner) {
            Ok(()) => Ok(()),
            Err(AllocatorError::AlreadyAllocated(_)) => Err(UpllError::MergeConflict(format!(
                "{} {label} of {} is in use in {scope}",
                policy.kind, entity.key
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
