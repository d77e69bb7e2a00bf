// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bound queries: the per-call description of which columns match, are written or are read.

use bitflags::bitflags;
use model::schema::{Slot, TableSchema};
use model::{DatastoreVersion, FieldValue};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

/// A stored row, by slot. A missing slot reads as the default of its column kind.
pub type Row = BTreeMap<Slot, FieldValue>;

bitflags! {
    /// How a column participates in a call.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BindDir: u8 {
        /// Row must hold the bound value.
        const MATCH   = 0x01;
        /// Bound value is written.
        const INPUT   = 0x02;
        /// Column is read back.
        const OUTPUT  = 0x04;
        /// Column is compared across versions by an update diff.
        const COMPARE = 0x08;
    }
}

impl Display for BindDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (flag, c) in [
            (BindDir::MATCH, 'm'),
            (BindDir::INPUT, 'i'),
            (BindDir::OUTPUT, 'o'),
            (BindDir::COMPARE, 'c'),
        ] {
            if self.contains(flag) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub slot: Slot,
    pub dir: BindDir,
    /// Value to match or write. `None` on an input erases the column.
    pub value: Option<FieldValue>,
}

/// The outcome of binding an entity for one call into the store.
#[derive(Clone, Debug)]
pub struct BoundQuery {
    schema: Arc<TableSchema>,
    datastore: DatastoreVersion,
    bindings: Vec<Binding>,
    /// Only rows whose identity sorts after this one (sibling reads).
    after: Option<Vec<FieldValue>>,
    limit: Option<usize>,
}

impl BoundQuery {
    #[must_use]
    pub fn new(schema: Arc<TableSchema>, datastore: DatastoreVersion) -> Self {
        Self {
            schema,
            datastore,
            bindings: Vec::new(),
            after: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    #[must_use]
    pub fn datastore(&self) -> DatastoreVersion {
        self.datastore
    }

    /// Bind a slot. Binding a slot twice merges the directions; a later value wins.
    pub fn bind(&mut self, slot: Slot, dir: BindDir, value: Option<FieldValue>) {
        if let Some(b) = self.bindings.iter_mut().find(|b| b.slot == slot) {
            b.dir |= dir;
            if value.is_some() {
                b.value = value;
            }
        } else {
            self.bindings.push(Binding { slot, dir, value });
        }
    }

    /// Remove a direction from a slot, dropping the binding once it has none left.
    pub fn unbind(&mut self, slot: Slot, dir: BindDir) {
        for b in &mut self.bindings {
            if b.slot == slot {
                b.dir.remove(dir);
            }
        }
        self.bindings.retain(|b| !b.dir.is_empty());
    }

    #[must_use]
    pub fn with_after(mut self, identity: Vec<FieldValue>) -> Self {
        self.after = Some(identity);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn after(&self) -> Option<&[FieldValue]> {
        self.after.as_deref()
    }

    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    #[must_use]
    pub fn binding(&self, slot: Slot) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.slot == slot)
    }

    fn with_dir(&self, dir: BindDir) -> impl Iterator<Item = &Binding> {
        self.bindings.iter().filter(move |b| b.dir.contains(dir))
    }

    pub fn matches(&self) -> impl Iterator<Item = &Binding> {
        self.with_dir(BindDir::MATCH)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Binding> {
        self.with_dir(BindDir::INPUT)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Binding> {
        self.with_dir(BindDir::OUTPUT)
    }

    pub fn compares(&self) -> impl Iterator<Item = &Binding> {
        self.with_dir(BindDir::COMPARE)
    }

    /// Value of a slot in a row, defaulted from the column kind when the row lacks it.
    #[must_use]
    pub fn column_value(&self, row: &Row, slot: Slot) -> Option<FieldValue> {
        row.get(&slot).cloned().or_else(|| {
            self.schema
                .descriptor(slot)
                .map(|d| FieldValue::default_of(d.kind))
        })
    }

    /// Tell if a row satisfies every match binding.
    #[must_use]
    pub fn accepts(&self, row: &Row) -> bool {
        self.accepts_on(row, |_| true)
    }

    /// Tell if a row satisfies the match bindings on the slots selected by `filter`.
    pub fn accepts_on(&self, row: &Row, filter: impl Fn(Slot) -> bool) -> bool {
        self.matches()
            .filter(|b| filter(b.slot))
            .all(|b| match &b.value {
                Some(v) => self.column_value(row, b.slot).as_ref() == Some(v),
                None => true,
            })
    }

    /// Project a row onto the output bindings.
    #[must_use]
    pub fn project(&self, row: &Row) -> Row {
        self.outputs()
            .filter_map(|b| self.column_value(row, b.slot).map(|v| (b.slot, v)))
            .collect()
    }

    /// Build a row out of the input bindings.
    #[must_use]
    pub fn input_row(&self) -> Row {
        self.inputs()
            .filter_map(|b| b.value.clone().map(|v| (b.slot, v)))
            .collect()
    }

    /// Identity of a row.
    #[must_use]
    pub fn identity_of(&self, row: &Row) -> Option<Vec<FieldValue>> {
        self.schema
            .identity()
            .into_iter()
            .map(|slot| row.get(&slot).cloned())
            .collect()
    }
}

impl Display for BoundQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.schema.table_name(self.datastore))?;
        for b in &self.bindings {
            let column = self
                .schema
                .descriptor(b.slot)
                .map_or("?", |d| d.column.as_str());
            write!(f, " {column}[{}]", b.dir)?;
            if let Some(v) = &b.value {
                write!(f, "={v}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use model::SchemaRegistry;
    use model::{ObjectType, TableKind};

    fn vbr_query() -> BoundQuery {
        let reg = SchemaRegistry::builtin().unwrap();
        BoundQuery::new(
            reg.get(ObjectType::Vbridge, TableKind::Main).unwrap(),
            DatastoreVersion::Candidate,
        )
    }

    #[test]
    fn bindings_merge() {
        let mut q = vbr_query();
        q.bind(Slot::Key(0), BindDir::MATCH, Some(FieldValue::text("T1")));
        q.bind(Slot::Key(0), BindDir::OUTPUT, None);
        assert_eq!(q.bindings().len(), 1);
        assert_eq!(
            q.binding(Slot::Key(0)).unwrap().dir,
            BindDir::MATCH | BindDir::OUTPUT
        );
        assert_eq!(
            q.binding(Slot::Key(0)).unwrap().value,
            Some(FieldValue::text("T1"))
        );
        q.unbind(Slot::Key(0), BindDir::MATCH);
        assert_eq!(q.binding(Slot::Key(0)).unwrap().dir, BindDir::OUTPUT);
        q.unbind(Slot::Key(0), BindDir::OUTPUT);
        assert!(q.bindings().is_empty());
    }

    #[test]
    fn missing_columns_match_their_default() {
        let mut q = vbr_query();
        q.bind(Slot::Changed, BindDir::MATCH, Some(FieldValue::Bool(false)));
        let row = Row::new();
        assert!(q.accepts(&row));
        let mut row = Row::new();
        row.insert(Slot::Changed, FieldValue::Bool(true));
        assert!(!q.accepts(&row));
        assert!(q.accepts_on(&row, |s| s != Slot::Changed));
    }

    #[test]
    fn display() {
        let mut q = vbr_query();
        q.bind(Slot::Key(1), BindDir::MATCH, Some(FieldValue::text("B1")));
        assert_eq!(q.to_string(), "ca_vbr_tbl: vbr_name[m]=B1");
    }
}
