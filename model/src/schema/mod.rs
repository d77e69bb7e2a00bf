// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Schema Registry: for each object type, the backing tables and the ordered descriptors of
//! their columns.
//!
//! A descriptor names a column, gives it a storage [`Role`] and tells which part of an
//! [`crate::Entity`] it maps onto ([`Slot`]). Binding logic dispatches on the slot; there is no
//! per-type accessor code.

mod builtin;

pub use builtin::attrs;

use crate::datastore::DatastoreVersion;
use crate::errors::{UpllError, UpllResult};
use crate::key::ObjectType;
use crate::value::FieldKind;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error};

/// Storage role of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum Role {
    Key,
    Value,
    /// Validity of a value attribute, and the changed flag.
    MetaValue,
    StateValue,
    StateMeta,
    /// Controller, domain and flags.
    ScopeValue,
    ConfigStatusValue,
    /// Aggregate status columns. Defaulted on create, owned by the aggregator afterwards.
    DerivedDefaultValue,
}

/// The part of an entity a column maps onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Key(usize),
    Config(usize),
    ConfigValid(usize),
    ConfigCs(usize),
    State(usize),
    StateValid(usize),
    Controller,
    Domain,
    Flags,
    RowCs,
    Changed,
    OperStatus,
    DownCount,
    UnknownCount,
}

impl Slot {
    /// Tell if this slot is a configured value or its validity.
    #[must_use]
    pub fn is_config(self) -> bool {
        matches!(self, Slot::Config(_) | Slot::ConfigValid(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub column: String,
    pub role: Role,
    pub kind: FieldKind,
    /// Maximum length of text columns. Unused for other kinds.
    pub width: usize,
    pub slot: Slot,
}

/// The tables backing an object type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumIter)]
pub enum TableKind {
    #[strum(serialize = "main")]
    Main,
    /// Per controller-domain rows of an object spanning several controllers.
    #[strum(serialize = "ctrlr")]
    Controller,
    /// Controller-side names of renamed objects.
    #[strum(serialize = "rename")]
    Rename,
    /// Converted (virtual) copies of user objects.
    #[strum(serialize = "convert")]
    Convert,
}

impl TableKind {
    fn suffix(self) -> &'static str {
        match self {
            TableKind::Main => "tbl",
            TableKind::Controller => "ctrlr_tbl",
            TableKind::Rename => "rename_tbl",
            TableKind::Convert => "convert_tbl",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct TableSchema {
    otype: ObjectType,
    kind: TableKind,
    name: String,
    fields: Vec<FieldDescriptor>,
    config_len: usize,
    state_len: usize,
    scoped: bool,
    controller_scoped: bool,
    has_status: bool,
}

impl TableSchema {
    #[must_use]
    pub fn otype(&self) -> ObjectType {
        self.otype
    }
    #[must_use]
    pub fn kind(&self) -> TableKind {
        self.kind
    }
    /// Table name, without datastore prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Table name in a datastore version, e.g. `ca_vbr_tbl`.
    #[must_use]
    pub fn table_name(&self, dt: DatastoreVersion) -> String {
        format!("{}_{}", dt.table_prefix(), self.name)
    }
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
    #[must_use]
    pub fn key_len(&self) -> usize {
        self.otype.key_arity()
    }
    #[must_use]
    pub fn config_len(&self) -> usize {
        self.config_len
    }
    #[must_use]
    pub fn state_len(&self) -> usize {
        self.state_len
    }
    /// Tell if rows carry a controller and domain.
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        self.scoped
    }
    /// Tell if controller and domain are part of the row identity.
    #[must_use]
    pub fn is_controller_scoped(&self) -> bool {
        self.controller_scoped
    }
    #[must_use]
    pub fn has_status(&self) -> bool {
        self.has_status
    }

    #[must_use]
    pub fn descriptor(&self, slot: Slot) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.slot == slot)
    }

    #[must_use]
    pub fn descriptor_by_column(&self, column: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.column == column)
    }

    /// Index of a configured attribute by column name.
    #[must_use]
    pub fn config_index(&self, column: &str) -> Option<usize> {
        match self.descriptor_by_column(column)?.slot {
            Slot::Config(i) => Some(i),
            _ => None,
        }
    }

    pub fn fields_by_role(&self, role: Role) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(move |f| f.role == role)
    }

    /// Slots identifying a row: the key fields, plus controller and domain for
    /// controller-scoped tables.
    #[must_use]
    pub fn identity(&self) -> Vec<Slot> {
        let mut slots: Vec<Slot> = (0..self.key_len()).map(Slot::Key).collect();
        if self.controller_scoped {
            slots.push(Slot::Controller);
            slots.push(Slot::Domain);
        }
        slots
    }

    /// Slots compared by an update diff.
    #[must_use]
    pub fn compare_slots(&self) -> Vec<Slot> {
        self.fields
            .iter()
            .filter(|f| f.slot.is_config())
            .map(|f| f.slot)
            .collect()
    }
}

impl Display for TableSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "table {} ({} {}):", self.name, self.otype, self.kind)?;
        for d in &self.fields {
            writeln!(f, "  {:<28} {:<20} {:<5} {:?}", d.column, d.role, d.kind, d.slot)?;
        }
        Ok(())
    }
}

/// Declares a table once. The validity and config-status columns of every value attribute,
/// the scope columns, the status columns, the row config-status and the changed flag are
/// derived.
#[derive(Debug)]
pub struct TableSchemaBuilder {
    otype: ObjectType,
    kind: TableKind,
    keys: Vec<(String, FieldKind, usize)>,
    values: Vec<(String, FieldKind, usize)>,
    states: Vec<(String, FieldKind, usize)>,
    scoped: bool,
    controller_scoped: bool,
    has_status: bool,
}

const NAME_WIDTH: usize = 31;

impl TableSchemaBuilder {
    #[must_use]
    pub fn new(otype: ObjectType, kind: TableKind) -> Self {
        Self {
            otype,
            kind,
            keys: Vec::new(),
            values: Vec::new(),
            states: Vec::new(),
            scoped: false,
            controller_scoped: false,
            has_status: false,
        }
    }

    #[must_use]
    pub fn key(mut self, column: &str, kind: FieldKind, width: usize) -> Self {
        self.keys.push((column.to_owned(), kind, width));
        self
    }

    /// A text key of the usual name width.
    #[must_use]
    pub fn name_key(self, column: &str) -> Self {
        self.key(column, FieldKind::Text, NAME_WIDTH)
    }

    #[must_use]
    pub fn value(mut self, column: &str, kind: FieldKind, width: usize) -> Self {
        self.values.push((column.to_owned(), kind, width));
        self
    }

    #[must_use]
    pub fn state(mut self, column: &str, kind: FieldKind, width: usize) -> Self {
        self.states.push((column.to_owned(), kind, width));
        self
    }

    /// Rows carry a controller and a domain.
    #[must_use]
    pub fn scoped(mut self) -> Self {
        self.scoped = true;
        self
    }

    /// Rows are identified by key, controller and domain.
    #[must_use]
    pub fn controller_scoped(mut self) -> Self {
        self.scoped = true;
        self.controller_scoped = true;
        self
    }

    #[must_use]
    pub fn with_status(mut self) -> Self {
        self.has_status = true;
        self
    }

    /// # Errors
    ///
    /// Fails with [`UpllError::Generic`] if the keys do not match the arity of the type or if
    /// a column name is used twice.
    pub fn build(self) -> UpllResult<TableSchema> {
        let otype = self.otype;
        if self.keys.len() != otype.key_arity() {
            return Err(UpllError::Generic(format!(
                "{otype}: {} key columns declared, {} expected",
                self.keys.len(),
                otype.key_arity()
            )));
        }
        let mut fields = Vec::new();
        let mut push = |column: String, role, kind, width, slot| {
            fields.push(FieldDescriptor {
                column,
                role,
                kind,
                width,
                slot,
            });
        };
        for (i, (column, kind, width)) in self.keys.into_iter().enumerate() {
            push(column, Role::Key, kind, width, Slot::Key(i));
        }
        if self.controller_scoped {
            // part of the identity, declared right after the keys
            push("ctrlr_name".to_owned(), Role::Key, FieldKind::Text, NAME_WIDTH, Slot::Controller);
            push("domain_id".to_owned(), Role::Key, FieldKind::Text, NAME_WIDTH, Slot::Domain);
        }
        let config_len = self.values.len();
        for (i, (column, kind, width)) in self.values.iter().cloned().enumerate() {
            push(column, Role::Value, kind, width, Slot::Config(i));
        }
        let state_len = self.states.len();
        for (i, (column, kind, width)) in self.states.iter().cloned().enumerate() {
            push(column, Role::StateValue, kind, width, Slot::State(i));
        }
        if self.scoped && !self.controller_scoped {
            push("ctrlr_name".to_owned(), Role::ScopeValue, FieldKind::Text, NAME_WIDTH, Slot::Controller);
            push("domain_id".to_owned(), Role::ScopeValue, FieldKind::Text, NAME_WIDTH, Slot::Domain);
        }
        push("flags".to_owned(), Role::ScopeValue, FieldKind::U8, 0, Slot::Flags);
        if self.has_status {
            push("oper_status".to_owned(), Role::DerivedDefaultValue, FieldKind::U8, 0, Slot::OperStatus);
            push("down_count".to_owned(), Role::DerivedDefaultValue, FieldKind::U32, 0, Slot::DownCount);
            push("unknown_count".to_owned(), Role::DerivedDefaultValue, FieldKind::U32, 0, Slot::UnknownCount);
        }
        for (i, (column, _, _)) in self.values.iter().enumerate() {
            push(format!("valid_{column}"), Role::MetaValue, FieldKind::U8, 0, Slot::ConfigValid(i));
        }
        for (i, (column, _, _)) in self.states.iter().enumerate() {
            push(format!("valid_{column}"), Role::StateMeta, FieldKind::U8, 0, Slot::StateValid(i));
        }
        push("cs_rowstatus".to_owned(), Role::ConfigStatusValue, FieldKind::U8, 0, Slot::RowCs);
        for (i, (column, _, _)) in self.values.iter().enumerate() {
            push(format!("cs_{column}"), Role::ConfigStatusValue, FieldKind::U8, 0, Slot::ConfigCs(i));
        }
        push("changed".to_owned(), Role::MetaValue, FieldKind::Bool, 0, Slot::Changed);

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = fields.iter().find(|f| !seen.insert(f.column.as_str())) {
            return Err(UpllError::Generic(format!(
                "{otype}: column {} declared twice",
                dup.column
            )));
        }
        let name = format!("{otype}_{}", self.kind.suffix());
        Ok(TableSchema {
            otype,
            kind: self.kind,
            name,
            fields,
            config_len,
            state_len,
            scoped: self.scoped,
            controller_scoped: self.controller_scoped,
            has_status: self.has_status,
        })
    }
}

/// Lookup of the schema of every (object type, table kind) pair.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: HashMap<(ObjectType, TableKind), Arc<TableSchema>>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, replacing any prior one for the same pair.
    pub fn register(&mut self, schema: TableSchema) {
        debug!("Registering schema for table {}", schema.name);
        self.tables
            .insert((schema.otype, schema.kind), Arc::new(schema));
    }

    /// # Errors
    ///
    /// Fails with [`UpllError::Generic`] if no schema exists for the pair.
    pub fn get(&self, otype: ObjectType, kind: TableKind) -> UpllResult<Arc<TableSchema>> {
        self.tables.get(&(otype, kind)).cloned().ok_or_else(|| {
            error!("No schema for {otype} {kind} table");
            UpllError::Generic(format!("no schema for {otype} {kind} table"))
        })
    }

    #[must_use]
    pub fn main(&self, otype: ObjectType) -> Option<Arc<TableSchema>> {
        self.tables.get(&(otype, TableKind::Main)).cloned()
    }

    #[must_use]
    pub fn has(&self, otype: ObjectType, kind: TableKind) -> bool {
        self.tables.contains_key(&(otype, kind))
    }

    /// Auxiliary tables of a type (all but the main table) in the order they are deleted.
    #[must_use]
    pub fn aux_tables(&self, otype: ObjectType) -> Vec<Arc<TableSchema>> {
        [TableKind::Convert, TableKind::Rename, TableKind::Controller]
            .into_iter()
            .filter_map(|kind| self.tables.get(&(otype, kind)).cloned())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TableSchema>> {
        self.tables.values()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builder_derives_meta_columns() {
        let schema = TableSchemaBuilder::new(ObjectType::Vbridge, TableKind::Main)
            .name_key("vtn_name")
            .name_key("vbr_name")
            .value("description", FieldKind::Text, 127)
            .scoped()
            .with_status()
            .build()
            .unwrap();
        assert_eq!(schema.name(), "vbr_tbl");
        assert_eq!(schema.table_name(DatastoreVersion::State), "ru_vbr_tbl");
        assert_eq!(schema.config_len(), 1);
        assert_eq!(schema.identity(), vec![Slot::Key(0), Slot::Key(1)]);
        let valid = schema.descriptor(Slot::ConfigValid(0)).unwrap();
        assert_eq!(valid.column, "valid_description");
        assert_eq!(valid.role, Role::MetaValue);
        let cs = schema.descriptor(Slot::ConfigCs(0)).unwrap();
        assert_eq!(cs.column, "cs_description");
        assert_eq!(schema.fields_by_role(Role::DerivedDefaultValue).count(), 3);
        assert_eq!(schema.fields_by_role(Role::ScopeValue).count(), 3);
        assert!(schema.descriptor(Slot::Changed).is_some());
        assert_eq!(schema.config_index("description"), Some(0));
        assert_eq!(
            schema.compare_slots(),
            vec![Slot::Config(0), Slot::ConfigValid(0)]
        );
    }

    #[test]
    fn controller_scoped_identity() {
        let schema = TableSchemaBuilder::new(ObjectType::Vtn, TableKind::Controller)
            .name_key("vtn_name")
            .value("ref_count", FieldKind::U32, 0)
            .controller_scoped()
            .build()
            .unwrap();
        assert_eq!(schema.name(), "vtn_ctrlr_tbl");
        assert_eq!(
            schema.identity(),
            vec![Slot::Key(0), Slot::Controller, Slot::Domain]
        );
        assert_eq!(schema.descriptor(Slot::Controller).unwrap().role, Role::Key);
    }

    #[test]
    fn ill_formed_declarations_are_rejected() {
        assert!(
            TableSchemaBuilder::new(ObjectType::Vbridge, TableKind::Main)
                .name_key("vtn_name")
                .build()
                .is_err()
        );
        assert!(
            TableSchemaBuilder::new(ObjectType::Vtn, TableKind::Main)
                .name_key("vtn_name")
                .value("vtn_name", FieldKind::Text, 31)
                .build()
                .is_err()
        );
    }

    #[test]
    fn missing_schema_is_generic_error() {
        let registry = SchemaRegistry::new();
        assert!(matches!(
            registry.get(ObjectType::Vtn, TableKind::Main),
            Err(UpllError::Generic(_))
        ));
    }
}
