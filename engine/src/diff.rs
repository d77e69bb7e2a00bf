// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Diff Engine: created, updated and deleted rows of one table between two datastore
//! versions.

use crate::binder::{BindFlags, DbSubOp, ReadShape, bind, entity_from_row};
use crate::params::EngineParams;
use model::{
    ConfigStatus, DatastoreVersion, Entity, FieldValue, ObjectKey, Operation, TableSchema,
    UpllError, UpllResult, ValueBlock,
};
use std::sync::Arc;
use store::{RowCursor, RowPair, VersionedStore};
#[allow(unused)]
use tracing::{debug, error};

/// What to diff.
#[derive(Clone, Debug)]
pub struct DiffRequest {
    pub op: Operation,
    pub a: DatastoreVersion,
    pub b: DatastoreVersion,
    pub schema: Arc<TableSchema>,
    /// Controller and domain the rows must be mapped to.
    pub scope: Option<(String, String)>,
    pub tenant: Option<String>,
    /// Only rows flagged as changed in `a` (update diffs).
    pub changed_only: bool,
    /// Audit diffs leave out changed rows.
    pub audit_skip_changed: bool,
    /// Honour the changed flag when `a` is IMPORT.
    pub import_flag_aware: bool,
    /// Compare config-status against the STATE projection of `b`.
    pub config_status: bool,
}

impl DiffRequest {
    #[must_use]
    pub fn new(
        op: Operation,
        a: DatastoreVersion,
        b: DatastoreVersion,
        schema: Arc<TableSchema>,
    ) -> Self {
        Self {
            op,
            a,
            b,
            schema,
            scope: None,
            tenant: None,
            changed_only: true,
            audit_skip_changed: true,
            import_flag_aware: false,
            config_status: false,
        }
    }

    #[must_use]
    pub fn scoped(mut self, controller: &str, domain: &str) -> Self {
        self.scope = Some((controller.to_owned(), domain.to_owned()));
        self
    }

    #[must_use]
    pub fn tenant(mut self, tenant: Option<&str>) -> Self {
        self.tenant = tenant.map(str::to_owned);
        self
    }

    #[must_use]
    pub fn whole_rows(mut self) -> Self {
        self.changed_only = false;
        self
    }

    #[must_use]
    pub fn config_status(mut self) -> Self {
        self.config_status = true;
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: &EngineParams) -> Self {
        self.audit_skip_changed = params.audit_skip_changed;
        self.import_flag_aware = params.import_flag_aware;
        self
    }

    /// Pattern entity carrying the tenant, scope and flag filters of the request.
    fn pattern(&self) -> UpllResult<(Entity, DbSubOp)> {
        let otype = self.schema.otype();
        let mut key = ObjectKey::wildcard(otype);
        if let Some(tenant) = &self.tenant {
            if otype.is_tenant_scoped() {
                key.set_field(0, Some(FieldValue::text(tenant.as_str())))?;
            }
        }
        let mut pattern = Entity::new(key);
        let shape = if self.op == Operation::Update {
            ReadShape::DiffForUpdate
        } else {
            ReadShape::Diff
        };
        let mut sub = DbSubOp::new(shape);
        if let Some((controller, domain)) = &self.scope {
            if self.schema.is_scoped() {
                pattern.scope.controller = Some(controller.clone());
                pattern.scope.domain = Some(domain.clone());
                sub = sub.with(BindFlags::SCOPE_MATCH);
            }
        }
        if self.op == Operation::Delete {
            // rows come from `b`: nothing but the scope constrains them
            return Ok((pattern, sub));
        }
        if self.b == DatastoreVersion::Audit {
            let mut expected = ValueBlock::new(self.schema.config_len());
            expected.row_cs = ConfigStatus::Applied;
            pattern.value.config = Some(expected);
            sub = sub.with(BindFlags::CS_MATCH);
            if self.audit_skip_changed {
                pattern.changed = false;
                sub = sub.with(BindFlags::CHANGED_MATCH);
            }
        }
        let flag_aware = self.a != DatastoreVersion::Import || self.import_flag_aware;
        if self.op == Operation::Update
            && self.changed_only
            && self.a.tracks_changes()
            && flag_aware
        {
            pattern.changed = true;
            sub = sub.with(BindFlags::CHANGED_MATCH);
        }
        if self.op == Operation::Update && self.config_status {
            sub = sub.with(BindFlags::CS_COMPARE);
        }
        Ok((pattern, sub))
    }
}

/// One row of a diff result, as entities.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffEntry {
    pub old: Option<Entity>,
    pub new: Option<Entity>,
}

impl DiffEntry {
    /// The entity the entry is about: the new one when it exists.
    #[must_use]
    pub fn entity(&self) -> Option<&Entity> {
        self.new.as_ref().or(self.old.as_ref())
    }
}

/// Cursor over a diff result. Owns the store cursor, which is released when this is dropped.
pub struct DiffCursor {
    cursor: RowCursor,
    schema: Arc<TableSchema>,
    exhausted: bool,
}

impl DiffCursor {
    /// Next entry. Fails with [`UpllError::NoSuchInstance`] once exhausted: callers translate
    /// it into "no more changes".
    pub fn next_entry(&mut self) -> UpllResult<DiffEntry> {
        if self.exhausted {
            return Err(UpllError::NoSuchInstance);
        }
        let pair = self.cursor.next_row().inspect_err(|e| {
            error!("Diff of {} failed: {e}", self.schema.name());
        })?;
        let Some(RowPair { new, old }) = pair else {
            self.exhausted = true;
            return Err(UpllError::NoSuchInstance);
        };
        let convert = |row: Option<store::Row>| {
            row.map(|r| entity_from_row(&self.schema, &r)).transpose()
        };
        Ok(DiffEntry {
            old: convert(old)?,
            new: convert(new)?,
        })
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }
}

impl Iterator for DiffCursor {
    type Item = UpllResult<DiffEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Err(UpllError::NoSuchInstance) => None,
            other => Some(other),
        }
    }
}

/// Run a diff.
pub fn diff(store: &dyn VersionedStore, req: &DiffRequest) -> UpllResult<DiffCursor> {
    let (mut pattern, sub) = req.pattern()?;
    let other = if req.config_status && req.op == Operation::Update {
        DatastoreVersion::State
    } else {
        req.b
    };
    let cursor = match req.op {
        Operation::Create => {
            let query = bind(&mut pattern, Operation::Read, req.a, &req.schema, sub)?;
            store.get_created(other, &query)?
        }
        Operation::Update => {
            let query = bind(&mut pattern, Operation::Read, req.a, &req.schema, sub)?;
            store.get_updated(other, &query)?
        }
        Operation::Delete => {
            let query = bind(&mut pattern, Operation::Read, req.a, &req.schema, sub)?;
            store.get_deleted(other, &query)?
        }
        op => {
            error!("No diff for {op}");
            return Err(UpllError::Generic(format!("cannot diff for {op}")));
        }
    };
    debug!(
        "Diffing {} {} against {other} ({})",
        req.op,
        req.schema.table_name(req.a),
        req.tenant.as_deref().unwrap_or("all tenants")
    );
    Ok(DiffCursor {
        cursor,
        schema: req.schema.clone(),
        exhausted: false,
    })
}

/// Collect a whole diff.
pub fn collect(store: &dyn VersionedStore, req: &DiffRequest) -> UpllResult<Vec<DiffEntry>> {
    diff(store, req)?.collect()
}
