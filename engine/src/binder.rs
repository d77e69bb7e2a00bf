// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Entity Binder: turns an entity, an operation and a sub-operation policy into a
//! [`BoundQuery`], and maps result rows back onto entities.
//!
//! Every column is handled according to its [`Role`] and the [`Slot`] it maps onto; there is
//! no per-type code.

use bitflags::bitflags;
use model::schema::{FieldDescriptor, Role, Slot, TableSchema};
use model::{
    AggregateStatus, AttributeValidity, ConfigStatus, DatastoreVersion, Entity, FieldValue,
    ObjectKey, OperStatus, Operation, UpllError, UpllResult,
};
use std::sync::Arc;
use store::{BindDir, BoundQuery, Row};
#[allow(unused)]
use tracing::{debug, error, trace};

/// Shape of the rows a call asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display)]
pub enum ReadShape {
    #[default]
    Single,
    Exists,
    Count,
    Multi,
    Diff,
    DiffForUpdate,
}

impl ReadShape {
    fn binds_values(self) -> bool {
        !matches!(self, ReadShape::Exists | ReadShape::Count)
    }

    fn is_diff(self) -> bool {
        matches!(self, ReadShape::Diff | ReadShape::DiffForUpdate)
    }
}

bitflags! {
    /// Which optional roles a call binds, and how.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BindFlags: u16 {
        /// Write controller and domain.
        const SCOPE_IN     = 0x0001;
        /// Write the rename/convert flags (always written on create).
        const FLAGS_IN     = 0x0002;
        /// Match on controller and domain when they are set.
        const SCOPE_MATCH  = 0x0004;
        /// Write the config-status of the row and of present attributes.
        const CS_IN        = 0x0008;
        /// Present attributes filter the rows instead of being written or read.
        const VALUE_MATCH  = 0x0010;
        /// Match the changed flag against the one of the entity.
        const CHANGED_MATCH = 0x0020;
        /// Match the row config-status against the one of the entity.
        const CS_MATCH     = 0x0040;
        /// Write the changed flag of the entity.
        const CHANGED      = 0x0080;
        /// Write the aggregate status of the entity.
        const STATUS_IN    = 0x0100;
        /// Update diffs compare config-status columns instead of configured values.
        const CS_COMPARE   = 0x0200;
    }
}

/// Sub-operation policy of a call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DbSubOp {
    pub shape: ReadShape,
    pub flags: BindFlags,
}

impl DbSubOp {
    #[must_use]
    pub fn new(shape: ReadShape) -> Self {
        Self {
            shape,
            flags: BindFlags::empty(),
        }
    }

    #[must_use]
    pub fn with(mut self, flags: BindFlags) -> Self {
        self.flags |= flags;
        self
    }

    fn has(&self, flag: BindFlags) -> bool {
        self.flags.contains(flag)
    }
}

fn text(s: Option<&String>) -> Option<FieldValue> {
    s.map(|s| FieldValue::text(s.as_str()))
}

/// Controller or domain of the entity, for a scope slot.
fn scope_value(entity: &Entity, slot: Slot) -> Option<FieldValue> {
    match slot {
        Slot::Controller => text(entity.scope.controller.as_ref()),
        Slot::Domain => text(entity.scope.domain.as_ref()),
        _ => None,
    }
}

struct Binder<'a> {
    entity: &'a Entity,
    op: Operation,
    dt: DatastoreVersion,
    sub: DbSubOp,
    query: BoundQuery,
}

impl Binder<'_> {
    fn key(&mut self, d: &FieldDescriptor) -> UpllResult {
        let value = match d.slot {
            Slot::Key(i) => self.entity.key.field(i).cloned(),
            slot => scope_value(self.entity, slot),
        };
        match self.op {
            Operation::Create => {
                let Some(value) = value else {
                    error!("Cannot create {}: {} is not set", self.entity.key, d.column);
                    return Err(UpllError::Generic(format!(
                        "incomplete identity for {}: {}",
                        self.entity.key, d.column
                    )));
                };
                self.query.bind(d.slot, BindDir::INPUT, Some(value));
            }
            Operation::Update | Operation::Delete => {
                if value.is_some() {
                    self.query.bind(d.slot, BindDir::MATCH, value);
                }
            }
            _ => {
                let output = self.sub.shape.binds_values();
                match value {
                    Some(v) if output => {
                        self.query.bind(d.slot, BindDir::MATCH | BindDir::OUTPUT, Some(v));
                    }
                    Some(v) => self.query.bind(d.slot, BindDir::MATCH, Some(v)),
                    None if output => self.query.bind(d.slot, BindDir::OUTPUT, None),
                    None => {}
                }
            }
        }
        Ok(())
    }

    fn scope(&mut self, d: &FieldDescriptor) {
        if d.slot == Slot::Flags {
            let flags = Some(FieldValue::U8(self.entity.scope.flags().bits()));
            match self.op {
                Operation::Create => self.query.bind(d.slot, BindDir::INPUT, flags),
                Operation::Update if self.sub.has(BindFlags::FLAGS_IN) => {
                    self.query.bind(d.slot, BindDir::INPUT, flags);
                }
                op if op.is_read() && self.sub.shape.binds_values() => {
                    self.query.bind(d.slot, BindDir::OUTPUT, None);
                }
                _ => {}
            }
            return;
        }
        let value = scope_value(self.entity, d.slot);
        let matching = self.sub.has(BindFlags::SCOPE_MATCH) && value.is_some();
        match self.op {
            Operation::Create => {
                if self.sub.has(BindFlags::SCOPE_IN) || value.is_some() {
                    self.query.bind(d.slot, BindDir::INPUT, value);
                }
            }
            Operation::Update => {
                if matching {
                    self.query.bind(d.slot, BindDir::MATCH, value.clone());
                }
                if self.sub.has(BindFlags::SCOPE_IN) && value.is_some() {
                    self.query.bind(d.slot, BindDir::INPUT, value);
                }
            }
            Operation::Delete => {
                if matching {
                    self.query.bind(d.slot, BindDir::MATCH, value);
                }
            }
            _ => {
                if matching {
                    self.query.bind(d.slot, BindDir::MATCH, value);
                }
                if self.sub.shape.binds_values() {
                    self.query.bind(d.slot, BindDir::OUTPUT, None);
                }
            }
        }
    }

    fn value(&mut self, d: &FieldDescriptor) {
        let (Slot::Config(i) | Slot::ConfigValid(i)) = d.slot else {
            return;
        };
        let attr = self.entity.config().and_then(|c| c.attr(i));
        let valid = attr.map_or(AttributeValidity::Invalid, |a| a.valid);
        let value_slot = d.slot == Slot::Config(i);
        match self.op {
            Operation::Create | Operation::Update => {
                if !valid.is_present() {
                    return;
                }
                if self.sub.has(BindFlags::VALUE_MATCH) {
                    if value_slot && valid == AttributeValidity::Valid {
                        self.query
                            .bind(d.slot, BindDir::MATCH, attr.and_then(|a| a.value.clone()));
                    }
                    return;
                }
                let (value, stored) = match valid {
                    AttributeValidity::ValidNoValue if self.op == Operation::Update => {
                        (None, AttributeValidity::Invalid)
                    }
                    AttributeValidity::ValidNoValue => (None, AttributeValidity::ValidNoValue),
                    _ => (attr.and_then(|a| a.value.clone()), valid),
                };
                if value_slot {
                    self.query.bind(d.slot, BindDir::INPUT, value);
                } else {
                    self.query
                        .bind(d.slot, BindDir::INPUT, Some(FieldValue::U8(stored.as_u8())));
                }
            }
            Operation::Delete => {}
            _ => {
                if self.sub.has(BindFlags::VALUE_MATCH) {
                    if value_slot && valid == AttributeValidity::Valid {
                        self.query
                            .bind(d.slot, BindDir::MATCH, attr.and_then(|a| a.value.clone()));
                    }
                } else if self.sub.shape.binds_values() {
                    let mut dir = BindDir::OUTPUT;
                    if self.sub.shape == ReadShape::DiffForUpdate
                        && !self.sub.has(BindFlags::CS_COMPARE)
                    {
                        dir |= BindDir::COMPARE;
                    }
                    self.query.bind(d.slot, dir, None);
                }
            }
        }
    }

    fn changed(&mut self, d: &FieldDescriptor) {
        let changed = Some(FieldValue::Bool(self.entity.changed));
        match self.op {
            Operation::Create | Operation::Update => {
                if self.sub.has(BindFlags::CHANGED) {
                    self.query.bind(d.slot, BindDir::INPUT, changed.clone());
                }
                if self.op == Operation::Update && self.sub.has(BindFlags::CHANGED_MATCH) {
                    self.query.bind(d.slot, BindDir::MATCH, changed);
                }
            }
            Operation::Delete => {}
            _ => {
                if self.sub.has(BindFlags::CHANGED_MATCH) {
                    self.query.bind(d.slot, BindDir::MATCH, changed);
                }
                if self.sub.shape.binds_values() {
                    self.query.bind(d.slot, BindDir::OUTPUT, None);
                }
            }
        }
    }

    fn state(&mut self, d: &FieldDescriptor) {
        if self.op.is_read() && self.dt == DatastoreVersion::State && self.sub.shape.binds_values()
        {
            self.query.bind(d.slot, BindDir::OUTPUT, None);
        }
    }

    fn config_status(&mut self, d: &FieldDescriptor) {
        let cs = match d.slot {
            Slot::RowCs => self.entity.config().map(|c| c.row_cs),
            Slot::ConfigCs(i) => self.entity.config().and_then(|c| c.attr(i)).map(|a| a.cs),
            _ => None,
        };
        let cs_value = cs.map(|cs| FieldValue::U8(cs.as_u8()));
        match self.op {
            Operation::Create | Operation::Update => {
                if self.sub.has(BindFlags::CS_IN) && cs.is_some() {
                    self.query.bind(d.slot, BindDir::INPUT, cs_value);
                }
            }
            Operation::Delete => {}
            _ => {
                if !self.sub.shape.binds_values() {
                    return;
                }
                let mut dir = BindDir::OUTPUT;
                if self.sub.shape.is_diff()
                    && self.sub.has(BindFlags::CS_MATCH)
                    && d.slot == Slot::RowCs
                {
                    dir |= BindDir::MATCH;
                }
                if self.sub.shape == ReadShape::DiffForUpdate
                    && self.sub.has(BindFlags::CS_COMPARE)
                {
                    dir |= BindDir::COMPARE;
                }
                let value = if dir.contains(BindDir::MATCH) {
                    cs_value
                } else {
                    None
                };
                self.query.bind(d.slot, dir, value);
            }
        }
    }

    fn status(&mut self, d: &FieldDescriptor) {
        let status = self.entity.status().copied().unwrap_or_default();
        let value = match d.slot {
            Slot::OperStatus => FieldValue::U8(status.oper_status.as_u8()),
            Slot::DownCount => FieldValue::U32(status.down_count),
            Slot::UnknownCount => FieldValue::U32(status.unknown_count),
            _ => return,
        };
        match self.op {
            Operation::Create => self.query.bind(d.slot, BindDir::INPUT, Some(value)),
            Operation::Update if self.sub.has(BindFlags::STATUS_IN) => {
                self.query.bind(d.slot, BindDir::INPUT, Some(value));
            }
            op if op.is_read()
                && matches!(self.sub.shape, ReadShape::Single | ReadShape::Multi) =>
            {
                self.query.bind(d.slot, BindDir::OUTPUT, None);
            }
            _ => {}
        }
    }
}

/// Bind an entity for one call into the store.
///
/// Reads allocate, on the entity, the value blocks their outputs land in; hence the mutable
/// borrow. Fails with a generic error if the entity and the schema disagree on the type.
pub fn bind(
    entity: &mut Entity,
    op: Operation,
    dt: DatastoreVersion,
    schema: &Arc<TableSchema>,
    sub: DbSubOp,
) -> UpllResult<BoundQuery> {
    if entity.key.otype() != schema.otype() {
        error!(
            "Cannot bind {} onto table {} of {}",
            entity.key,
            schema.name(),
            schema.otype()
        );
        return Err(UpllError::Generic(format!(
            "{} does not belong to table {}",
            entity.key,
            schema.name()
        )));
    }
    if op.is_read() && sub.shape.binds_values() {
        if schema.config_len() > 0 {
            entity.config_or_alloc(schema.config_len());
        }
        if dt == DatastoreVersion::State && schema.state_len() > 0 {
            entity.state_or_alloc(schema.state_len());
        }
        if schema.has_status() && entity.value.status.is_none() {
            entity.value.status = Some(AggregateStatus::uninit());
        }
    }
    let mut binder = Binder {
        entity,
        op,
        dt,
        sub,
        query: BoundQuery::new(schema.clone(), dt),
    };
    for d in schema.fields() {
        match d.role {
            Role::Key => binder.key(d)?,
            Role::ScopeValue => binder.scope(d),
            Role::Value => binder.value(d),
            Role::MetaValue if d.slot == Slot::Changed => binder.changed(d),
            Role::MetaValue => binder.value(d),
            Role::StateValue | Role::StateMeta => binder.state(d),
            Role::ConfigStatusValue => binder.config_status(d),
            Role::DerivedDefaultValue => binder.status(d),
        }
    }
    trace!("Bound {op}: {}", binder.query);
    Ok(binder.query)
}

/// Copy the columns of a result row into an entity.
///
/// Values whose stored validity is not [`AttributeValidity::Valid`] are dropped, so that the
/// defaults served for erased columns never surface as values.
pub fn apply_outputs(schema: &TableSchema, row: &Row, entity: &mut Entity) -> UpllResult {
    let mut status = entity.value.status.unwrap_or_default();
    let mut has_status = entity.value.status.is_some();
    for (slot, value) in row {
        match *slot {
            Slot::Key(i) => entity.key.set_field(i, Some(value.clone()))?,
            Slot::Controller => entity.scope.controller = non_empty(value),
            Slot::Domain => entity.scope.domain = non_empty(value),
            Slot::Flags => entity.scope.load_flags(value.as_u8().unwrap_or_default()),
            Slot::Config(i) => {
                entity.config_or_alloc(schema.config_len()).attr_mut(i)?.value =
                    Some(value.clone());
            }
            Slot::ConfigValid(i) => {
                entity.config_or_alloc(schema.config_len()).attr_mut(i)?.valid =
                    AttributeValidity::from_u8(value.as_u8().unwrap_or_default());
            }
            Slot::ConfigCs(i) => {
                entity.config_or_alloc(schema.config_len()).attr_mut(i)?.cs =
                    ConfigStatus::from_u8(value.as_u8().unwrap_or_default());
            }
            Slot::RowCs => {
                entity.config_or_alloc(schema.config_len()).row_cs =
                    ConfigStatus::from_u8(value.as_u8().unwrap_or_default());
            }
            Slot::State(i) => {
                entity.state_or_alloc(schema.state_len()).attr_mut(i)?.value =
                    Some(value.clone());
            }
            Slot::StateValid(i) => {
                entity.state_or_alloc(schema.state_len()).attr_mut(i)?.valid =
                    AttributeValidity::from_u8(value.as_u8().unwrap_or_default());
            }
            Slot::Changed => entity.changed = value.as_bool().unwrap_or_default(),
            Slot::OperStatus => {
                status.oper_status = OperStatus::from_u8(value.as_u8().unwrap_or_default());
                has_status = true;
            }
            Slot::DownCount => {
                status.down_count = value.as_u32().unwrap_or_default();
                has_status = true;
            }
            Slot::UnknownCount => {
                status.unknown_count = value.as_u32().unwrap_or_default();
                has_status = true;
            }
        }
    }
    if has_status {
        entity.value.status = Some(status);
    }
    for block in [entity.value.config.as_mut(), entity.value.state.as_mut()]
        .into_iter()
        .flatten()
    {
        for i in 0..block.len() {
            let attr = block.attr_mut(i)?;
            if attr.valid != AttributeValidity::Valid {
                attr.value = None;
            }
        }
    }
    Ok(())
}

fn non_empty(value: &FieldValue) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_owned)
}

/// Build an entity out of a result row.
pub fn entity_from_row(schema: &TableSchema, row: &Row) -> UpllResult<Entity> {
    let mut entity = Entity::new(ObjectKey::wildcard(schema.otype()));
    apply_outputs(schema, row, &mut entity)?;
    Ok(entity)
}

/// A query writing every column of a row, used to copy rows across versions.
#[must_use]
pub fn copy_query(schema: &Arc<TableSchema>, dt: DatastoreVersion, row: &Row) -> BoundQuery {
    let mut query = BoundQuery::new(schema.clone(), dt);
    for (slot, value) in row {
        query.bind(*slot, BindDir::INPUT, Some(value.clone()));
    }
    query
}

/// A query reading every column of the rows matched by a key pattern.
#[must_use]
pub fn full_row_query(
    schema: &Arc<TableSchema>,
    dt: DatastoreVersion,
    pattern: &ObjectKey,
) -> BoundQuery {
    let mut query = BoundQuery::new(schema.clone(), dt);
    for d in schema.fields() {
        let bound = match d.slot {
            Slot::Key(i) => pattern.field(i).cloned(),
            _ => None,
        };
        match bound {
            Some(v) => query.bind(d.slot, BindDir::MATCH | BindDir::OUTPUT, Some(v)),
            None => query.bind(d.slot, BindDir::OUTPUT, None),
        }
    }
    query
}

/// The row an entity stands for: every column of the table the entity gives a value.
#[must_use]
pub fn entity_row(schema: &TableSchema, entity: &Entity) -> Row {
    let config = entity.value.config.as_ref();
    let state = entity.value.state.as_ref();
    let status = entity.value.status;
    let code = |v: u8| Some(FieldValue::U8(v));
    schema
        .fields()
        .iter()
        .filter_map(|d| {
            let value = match d.slot {
                Slot::Key(i) => entity.key.field(i).cloned(),
                Slot::Controller | Slot::Domain => scope_value(entity, d.slot),
                Slot::Flags => code(entity.scope.flags().bits()),
                Slot::Config(i) => config.and_then(|c| c.value(i)).cloned(),
                Slot::ConfigValid(i) => config
                    .and_then(|c| c.attr(i))
                    .and_then(|a| code(a.valid.as_u8())),
                Slot::ConfigCs(i) => config.and_then(|c| c.attr(i)).and_then(|a| code(a.cs.as_u8())),
                Slot::RowCs => config.and_then(|c| code(c.row_cs.as_u8())),
                Slot::State(i) => state.and_then(|s| s.value(i)).cloned(),
                Slot::StateValid(i) => state
                    .and_then(|s| s.attr(i))
                    .and_then(|a| code(a.valid.as_u8())),
                Slot::Changed => Some(FieldValue::Bool(entity.changed)),
                Slot::OperStatus => status.map(|s| FieldValue::U8(s.oper_status.as_u8())),
                Slot::DownCount => status.map(|s| FieldValue::U32(s.down_count)),
                Slot::UnknownCount => status.map(|s| FieldValue::U32(s.unknown_count)),
            };
            value.map(|v| (d.slot, v))
        })
        .collect()
}

/// A query selecting one row by identity and writing the given columns.
#[must_use]
pub fn identity_update(
    schema: &Arc<TableSchema>,
    dt: DatastoreVersion,
    row: &Row,
    writes: impl IntoIterator<Item = (Slot, Option<FieldValue>)>,
) -> BoundQuery {
    let mut query = BoundQuery::new(schema.clone(), dt);
    for slot in schema.identity() {
        if let Some(v) = row.get(&slot) {
            query.bind(slot, BindDir::MATCH, Some(v.clone()));
        }
    }
    for (slot, value) in writes {
        query.bind(slot, BindDir::INPUT, value);
    }
    query
}

#[cfg(test)]
mod test {
    use super::*;
    use model::schema::attrs;
    use model::{ObjectType, SchemaRegistry, ScopeData, TableKind, ValueBlock};
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;
    use store::mem::MemStore;
    use store::VersionedStore;

    fn vbr_schema(reg: &SchemaRegistry) -> Arc<TableSchema> {
        reg.get(ObjectType::Vbridge, TableKind::Main).unwrap()
    }

    fn vbr(desc: &str) -> Entity {
        let mut config = ValueBlock::new(3);
        config.set(attrs::vbr::DESCRIPTION, FieldValue::text(desc)).unwrap();
        config
            .set(attrs::vbr::HOST_ADDR, FieldValue::Ipv4(Ipv4Addr::new(10, 0, 0, 1)))
            .unwrap();
        Entity::new(ObjectKey::vbridge("T1", "B1"))
            .with_scope(ScopeData::new("c1", "d1"))
            .with_config(config)
    }

    #[test]
    fn create_binds_present_attributes() {
        let reg = SchemaRegistry::builtin().unwrap();
        let schema = vbr_schema(&reg);
        let q = bind(
            &mut vbr("bridge"),
            Operation::Create,
            DatastoreVersion::Candidate,
            &schema,
            DbSubOp::default(),
        )
        .unwrap();
        let row = q.input_row();
        assert_eq!(row.get(&Slot::Key(1)), Some(&FieldValue::text("B1")));
        assert_eq!(row.get(&Slot::Controller), Some(&FieldValue::text("c1")));
        assert_eq!(row.get(&Slot::ConfigValid(0)), Some(&FieldValue::U8(1)));
        assert!(!row.contains_key(&Slot::Config(attrs::vbr::HOST_ADDR_PREFIXLEN)));
        assert!(!row.contains_key(&Slot::ConfigValid(attrs::vbr::HOST_ADDR_PREFIXLEN)));
        assert_eq!(row.get(&Slot::OperStatus), Some(&FieldValue::U8(0)));
    }

    #[test]
    fn create_rejects_wildcards() {
        let reg = SchemaRegistry::builtin().unwrap();
        let mut e = Entity::new(ObjectKey::wildcard(ObjectType::Vbridge));
        let r = bind(
            &mut e,
            Operation::Create,
            DatastoreVersion::Candidate,
            &vbr_schema(&reg),
            DbSubOp::default(),
        );
        assert!(matches!(r, Err(UpllError::Generic(_))));
    }

    #[test]
    fn schema_mismatch_is_generic() {
        let reg = SchemaRegistry::builtin().unwrap();
        let mut e = Entity::new(ObjectKey::vtn("T1"));
        let r = bind(
            &mut e,
            Operation::Read,
            DatastoreVersion::Candidate,
            &vbr_schema(&reg),
            DbSubOp::default(),
        );
        assert!(matches!(r, Err(UpllError::Generic(_))));
    }

    #[test]
    fn update_normalizes_cleared_attributes() {
        let reg = SchemaRegistry::builtin().unwrap();
        let mut e = vbr("x");
        e.value.config.as_mut().unwrap().clear(attrs::vbr::HOST_ADDR).unwrap();
        let q = bind(
            &mut e,
            Operation::Update,
            DatastoreVersion::Candidate,
            &vbr_schema(&reg),
            DbSubOp::default(),
        )
        .unwrap();
        let erase = q.binding(Slot::Config(attrs::vbr::HOST_ADDR)).unwrap();
        assert_eq!((erase.dir, erase.value.clone()), (BindDir::INPUT, None));
        let valid = q.binding(Slot::ConfigValid(attrs::vbr::HOST_ADDR)).unwrap();
        assert_eq!(valid.value, Some(FieldValue::U8(0)));
        assert_eq!(q.binding(Slot::Key(0)).unwrap().dir, BindDir::MATCH);
        assert!(q.binding(Slot::OperStatus).is_none());
    }

    #[test]
    fn update_binds_and_matches_the_changed_flag() {
        let reg = SchemaRegistry::builtin().unwrap();
        let mut e = vbr("x");
        e.changed = true;
        let q = bind(
            &mut e,
            Operation::Update,
            DatastoreVersion::Candidate,
            &vbr_schema(&reg),
            DbSubOp::default().with(BindFlags::CHANGED | BindFlags::CHANGED_MATCH),
        )
        .unwrap();
        let changed = q.binding(Slot::Changed).unwrap();
        assert_eq!(changed.dir, BindDir::INPUT | BindDir::MATCH);
        assert_eq!(changed.value, Some(FieldValue::Bool(true)));
    }

    #[test]
    fn delete_binds_only_identity_and_scope() {
        let reg = SchemaRegistry::builtin().unwrap();
        let q = bind(
            &mut vbr("x"),
            Operation::Delete,
            DatastoreVersion::Candidate,
            &vbr_schema(&reg),
            DbSubOp::default().with(BindFlags::SCOPE_MATCH),
        )
        .unwrap();
        assert!(q.bindings().iter().all(|b| b.dir == BindDir::MATCH));
        let slots: Vec<_> = q.bindings().iter().map(|b| b.slot).collect();
        assert_eq!(
            slots,
            vec![Slot::Key(0), Slot::Key(1), Slot::Controller, Slot::Domain]
        );
    }

    #[test]
    fn counts_bind_no_values() {
        let reg = SchemaRegistry::builtin().unwrap();
        let mut e = Entity::new(ObjectKey::wildcard(ObjectType::Vbridge));
        e.key.set_field(0, Some(FieldValue::text("T1"))).unwrap();
        let q = bind(
            &mut e,
            Operation::ReadSiblingCount,
            DatastoreVersion::Candidate,
            &vbr_schema(&reg),
            DbSubOp::new(ReadShape::Count),
        )
        .unwrap();
        assert_eq!(q.outputs().count(), 0);
        assert_eq!(q.matches().count(), 1);
        assert!(e.config().is_none());
    }

    #[test]
    fn state_reads_allocate_state_block() {
        let reg = SchemaRegistry::builtin().unwrap();
        let schema = reg.get(ObjectType::Vtn, TableKind::Main).unwrap();
        let mut e = Entity::new(ObjectKey::vtn("T1"));
        let q = bind(
            &mut e,
            Operation::Read,
            DatastoreVersion::State,
            &schema,
            DbSubOp::default(),
        )
        .unwrap();
        assert!(q.binding(Slot::State(0)).is_some());
        assert_eq!(e.value.state.as_ref().map(ValueBlock::len), Some(2));
        assert_eq!(e.status(), Some(&AggregateStatus::uninit()));
    }

    #[test]
    fn diff_for_update_compares_config() {
        let reg = SchemaRegistry::builtin().unwrap();
        let mut e = Entity::new(ObjectKey::wildcard(ObjectType::Vbridge));
        let q = bind(
            &mut e,
            Operation::Read,
            DatastoreVersion::Candidate,
            &vbr_schema(&reg),
            DbSubOp::new(ReadShape::DiffForUpdate),
        )
        .unwrap();
        let compared: Vec<_> = q.compares().map(|b| b.slot).collect();
        assert_eq!(compared, vbr_schema(&reg).compare_slots());
        let q = bind(
            &mut e,
            Operation::Read,
            DatastoreVersion::Candidate,
            &vbr_schema(&reg),
            DbSubOp::new(ReadShape::DiffForUpdate).with(BindFlags::CS_COMPARE),
        )
        .unwrap();
        assert!(q.compares().all(|b| matches!(b.slot, Slot::RowCs | Slot::ConfigCs(_))));
    }

    #[test]
    fn round_trip_through_store() {
        let reg = Arc::new(SchemaRegistry::builtin().unwrap());
        let store = MemStore::new(reg.clone());
        let schema = vbr_schema(&reg);
        let mut created = vbr("bridge one");
        created
            .value
            .config
            .as_mut()
            .unwrap()
            .clear(attrs::vbr::HOST_ADDR_PREFIXLEN)
            .unwrap();
        let q = bind(
            &mut created,
            Operation::Create,
            DatastoreVersion::Candidate,
            &schema,
            DbSubOp::default(),
        )
        .unwrap();
        store.create(&q).unwrap();

        let mut read = Entity::new(ObjectKey::vbridge("T1", "B1"));
        let q = bind(
            &mut read,
            Operation::Read,
            DatastoreVersion::Candidate,
            &schema,
            DbSubOp::default(),
        )
        .unwrap();
        let rows = store.read(&q).unwrap();
        apply_outputs(&schema, &rows[0], &mut read).unwrap();

        let config = read.config().unwrap();
        for (i, attr) in created.config().unwrap().iter() {
            if attr.valid == AttributeValidity::Valid {
                assert_eq!(config.value(i), attr.value.as_ref());
            }
        }
        assert_eq!(
            config.attr(attrs::vbr::HOST_ADDR_PREFIXLEN).unwrap().valid,
            AttributeValidity::ValidNoValue
        );
        assert_eq!(config.attr(attrs::vbr::HOST_ADDR_PREFIXLEN).unwrap().value, None);
        assert!(read.scope.is("c1", "d1"));
        assert_eq!(read.key, ObjectKey::vbridge("T1", "B1"));
    }
}
