// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! An in-memory [`VersionedStore`].
//!
//! Tables are kept per datastore version, rows are keyed by their identity. Besides serving as
//! reference implementation, the store counts open cursors and can be told to fail upcoming
//! calls, so that tests can check that resources are released on every path.

mod raw;

use crate::cursor::{CursorHook, RawCursor, RowCursor, RowPair, VecCursor};
use crate::query::{BoundQuery, Row};
use crate::versioned::VersionedStore;
use model::schema::{SchemaRegistry, TableSchema};
use model::{DatastoreVersion, FieldValue, UpllError, UpllResult};
use raw::AggregateQuery;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
#[allow(unused)]
use tracing::{debug, error, trace, warn};

type Table = BTreeMap<Vec<FieldValue>, Row>;

/// Fault injection and cursor accounting, shared with the cursors handed out.
#[derive(Debug, Default)]
struct Faults {
    countdown: Mutex<Option<usize>>,
    open_cursors: AtomicUsize,
}

impl Faults {
    fn check(&self, what: &str) -> UpllResult {
        let mut countdown = self.countdown.lock().unwrap_or_else(PoisonError::into_inner);
        match *countdown {
            Some(0) => {
                *countdown = None;
                error!("Injected failure on {what}");
                Err(UpllError::DbAccess(format!("injected failure on {what}")))
            }
            Some(n) => {
                *countdown = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl CursorHook for Faults {
    fn on_fetch(&self) -> UpllResult {
        self.check("fetch")
    }
    fn on_close(&self) {
        self.open_cursors.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Tables are stored under the version that physically holds them.
fn table_key(dt: DatastoreVersion, table: &str) -> (DatastoreVersion, String) {
    (dt.storage(), table.to_owned())
}

pub struct MemStore {
    schemas: Arc<SchemaRegistry>,
    tables: RwLock<BTreeMap<(DatastoreVersion, String), Table>>,
    faults: Arc<Faults>,
}

impl MemStore {
    /// Create an empty store. The schemas resolve table names in raw queries.
    #[must_use]
    pub fn new(schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            schemas,
            tables: RwLock::new(BTreeMap::new()),
            faults: Arc::new(Faults::default()),
        }
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, BTreeMap<(DatastoreVersion, String), Table>> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, BTreeMap<(DatastoreVersion, String), Table>> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next call (or cursor fetch) with a database access error.
    pub fn fail_next(&self) {
        self.fail_after(0);
    }

    /// Let `calls` calls or fetches succeed, then fail the following one.
    pub fn fail_after(&self, calls: usize) {
        *self
            .faults
            .countdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(calls);
    }

    pub fn clear_faults(&self) {
        *self
            .faults
            .countdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Number of cursors handed out and not dropped yet.
    #[must_use]
    pub fn open_cursors(&self) -> usize {
        self.faults.open_cursors.load(Ordering::Relaxed)
    }

    /// Every row of a table, in identity order.
    #[must_use]
    pub fn rows(&self, dt: DatastoreVersion, schema: &TableSchema) -> Vec<Row> {
        self.read_lock()
            .get(&table_key(dt, schema.name()))
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Replace every table of `dst` with a copy of the tables of `src`.
    pub fn clone_datastore(&self, src: DatastoreVersion, dst: DatastoreVersion) {
        let mut tables = self.write_lock();
        tables.retain(|(dt, _), _| *dt != dst.storage());
        let copies: Vec<_> = tables
            .iter()
            .filter(|((dt, _), _)| *dt == src.storage())
            .map(|((_, name), table)| ((dst.storage(), name.clone()), table.clone()))
            .collect();
        tables.extend(copies);
        debug!("Cloned datastore {src} into {dst}");
    }

    fn cursor<T: Send + 'static>(&self, rows: Vec<T>) -> Box<VecCursor<T>> {
        self.faults.open_cursors.fetch_add(1, Ordering::Relaxed);
        let hook: Arc<dyn CursorHook> = self.faults.clone();
        Box::new(VecCursor::new(rows).with_hook(hook))
    }

    fn identity(query: &BoundQuery, row: &Row) -> UpllResult<Vec<FieldValue>> {
        query.identity_of(row).ok_or_else(|| {
            error!("Row identity is incomplete: {query}");
            UpllError::Generic(format!(
                "incomplete identity for {}",
                query.schema().name()
            ))
        })
    }

    /// Rows of the query version matching the query, with the rows of `other`.
    fn both_versions(&self, other: DatastoreVersion, query: &BoundQuery) -> (Table, Table) {
        let tables = self.read_lock();
        let name = query.schema().name();
        let mine = tables
            .get(&table_key(query.datastore(), name))
            .cloned()
            .unwrap_or_default();
        let theirs = tables
            .get(&table_key(other, name))
            .cloned()
            .unwrap_or_default();
        (mine, theirs)
    }

    fn resolve_table(&self, table: &str) -> UpllResult<(DatastoreVersion, Arc<TableSchema>)> {
        let unknown = || {
            error!("Unknown table {table}");
            UpllError::DbAccess(format!("unknown table {table}"))
        };
        let (prefix, name) = table.split_once('_').ok_or_else(unknown)?;
        let dt = [
            DatastoreVersion::Candidate,
            DatastoreVersion::Running,
            DatastoreVersion::Startup,
            DatastoreVersion::Import,
            DatastoreVersion::Audit,
        ]
        .into_iter()
        .find(|dt| dt.table_prefix() == prefix)
        .ok_or_else(unknown)?;
        let schema = self
            .schemas
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(unknown)?;
        Ok((dt, schema))
    }
}

impl VersionedStore for MemStore {
    fn create(&self, query: &BoundQuery) -> UpllResult {
        self.faults.check("create")?;
        let row = query.input_row();
        let id = Self::identity(query, &row)?;
        let mut tables = self.write_lock();
        let table = tables
            .entry(table_key(query.datastore(), query.schema().name()))
            .or_default();
        if table.contains_key(&id) {
            debug!("Create rejected, row exists: {query}");
            return Err(UpllError::InstanceExists);
        }
        trace!("Created row: {query}");
        table.insert(id, row);
        Ok(())
    }

    fn update(&self, query: &BoundQuery) -> UpllResult<usize> {
        self.faults.check("update")?;
        let mut tables = self.write_lock();
        let Some(table) = tables.get_mut(&table_key(query.datastore(), query.schema().name()))
        else {
            return Err(UpllError::NoSuchInstance);
        };
        let targets: Vec<_> = table
            .iter()
            .filter(|(_, row)| query.accepts(row))
            .map(|(id, _)| id.clone())
            .collect();
        if targets.is_empty() {
            return Err(UpllError::NoSuchInstance);
        }
        for id in &targets {
            let Some(mut row) = table.remove(id) else {
                continue;
            };
            for b in query.inputs() {
                match &b.value {
                    Some(v) => row.insert(b.slot, v.clone()),
                    None => row.remove(&b.slot),
                };
            }
            let new_id = Self::identity(query, &row)?;
            table.insert(new_id, row);
        }
        trace!("Updated {} row(s): {query}", targets.len());
        Ok(targets.len())
    }

    fn delete(&self, query: &BoundQuery) -> UpllResult<usize> {
        self.faults.check("delete")?;
        let mut tables = self.write_lock();
        let Some(table) = tables.get_mut(&table_key(query.datastore(), query.schema().name()))
        else {
            return Err(UpllError::NoSuchInstance);
        };
        let before = table.len();
        table.retain(|_, row| !query.accepts(row));
        let removed = before - table.len();
        if removed == 0 {
            return Err(UpllError::NoSuchInstance);
        }
        trace!("Deleted {removed} row(s): {query}");
        Ok(removed)
    }

    fn read(&self, query: &BoundQuery) -> UpllResult<Vec<Row>> {
        self.faults.check("read")?;
        let tables = self.read_lock();
        let Some(table) = tables.get(&table_key(query.datastore(), query.schema().name())) else {
            return Err(UpllError::NoSuchInstance);
        };
        let rows: Vec<Row> = table
            .iter()
            .filter(|(id, _)| query.after().is_none_or(|after| id.as_slice() > after))
            .filter(|(_, row)| query.accepts(row))
            .take(query.limit().unwrap_or(usize::MAX))
            .map(|(_, row)| query.project(row))
            .collect();
        if rows.is_empty() {
            return Err(UpllError::NoSuchInstance);
        }
        Ok(rows)
    }

    fn record_count(&self, query: &BoundQuery) -> UpllResult<usize> {
        self.faults.check("count")?;
        Ok(self
            .read_lock()
            .get(&table_key(query.datastore(), query.schema().name()))
            .map_or(0, |table| table.values().filter(|row| query.accepts(row)).count()))
    }

    fn get_created(&self, other: DatastoreVersion, query: &BoundQuery) -> UpllResult<RowCursor> {
        self.faults.check("get_created")?;
        let (mine, theirs) = self.both_versions(other, query);
        let rows: Vec<RowPair> = mine
            .iter()
            .filter(|(id, row)| !theirs.contains_key(*id) && query.accepts(row))
            .map(|(_, row)| RowPair {
                new: Some(query.project(row)),
                old: None,
            })
            .collect();
        debug!(
            "{} created row(s) in {} against {other}",
            rows.len(),
            query.schema().table_name(query.datastore())
        );
        Ok(self.cursor(rows))
    }

    fn get_updated(&self, other: DatastoreVersion, query: &BoundQuery) -> UpllResult<RowCursor> {
        self.faults.check("get_updated")?;
        let (mine, theirs) = self.both_versions(other, query);
        let rows: Vec<RowPair> = mine
            .iter()
            .filter(|(_, row)| query.accepts(row))
            .filter_map(|(id, row)| theirs.get(id).map(|old| (row, old)))
            .filter(|(row, old)| {
                query
                    .compares()
                    .any(|b| query.column_value(row, b.slot) != query.column_value(old, b.slot))
            })
            .map(|(row, old)| RowPair {
                new: Some(query.project(row)),
                old: Some(query.project(old)),
            })
            .collect();
        debug!(
            "{} updated row(s) in {} against {other}",
            rows.len(),
            query.schema().table_name(query.datastore())
        );
        Ok(self.cursor(rows))
    }

    fn get_deleted(&self, other: DatastoreVersion, query: &BoundQuery) -> UpllResult<RowCursor> {
        self.faults.check("get_deleted")?;
        let (mine, theirs) = self.both_versions(other, query);
        let rows: Vec<RowPair> = theirs
            .iter()
            .filter(|(id, row)| !mine.contains_key(*id) && query.accepts(row))
            .map(|(_, row)| RowPair {
                new: None,
                old: Some(query.project(row)),
            })
            .collect();
        debug!(
            "{} deleted row(s) in {} against {other}",
            rows.len(),
            query.schema().table_name(query.datastore())
        );
        Ok(self.cursor(rows))
    }

    fn execute_raw_query(&self, text: &str, params: &[FieldValue]) -> UpllResult<RawCursor> {
        self.faults.check("raw query")?;
        let aggregate = AggregateQuery::parse(text)?;
        if aggregate.filters.len() != params.len() {
            error!(
                "Query takes {} parameter(s), {} given",
                aggregate.filters.len(),
                params.len()
            );
            return Err(UpllError::DbAccess(format!(
                "parameter count mismatch in {text}"
            )));
        }
        let (dt, schema) = self.resolve_table(&aggregate.table)?;
        let slot_of = |column: &str| {
            schema.descriptor_by_column(column).map(|d| d.slot).ok_or_else(|| {
                error!("Unknown column {column} in {}", aggregate.table);
                UpllError::DbAccess(format!("unknown column {column}"))
            })
        };
        let group: Vec<_> = aggregate
            .group
            .iter()
            .map(|c| slot_of(c))
            .collect::<UpllResult<_>>()?;
        let filters: Vec<_> = aggregate
            .filters
            .iter()
            .map(|c| slot_of(c))
            .collect::<UpllResult<_>>()?;

        // rows lacking a column read its default, as for bound queries
        let query = BoundQuery::new(schema.clone(), dt);
        let mut counts: BTreeMap<Vec<FieldValue>, u64> = BTreeMap::new();
        if let Some(table) = self.read_lock().get(&table_key(dt, schema.name())) {
            for row in table.values() {
                let selected = filters
                    .iter()
                    .zip(params)
                    .all(|(slot, p)| query.column_value(row, *slot).as_ref() == Some(p));
                if selected {
                    let key: Vec<_> = group
                        .iter()
                        .filter_map(|slot| query.column_value(row, *slot))
                        .collect();
                    *counts.entry(key).or_default() += 1;
                }
            }
        }
        let rows: Vec<Vec<FieldValue>> = counts
            .into_iter()
            .map(|(mut key, count)| {
                key.push(FieldValue::U64(count));
                key
            })
            .collect();
        debug!("Raw query returned {} group(s): {text}", rows.len());
        Ok(self.cursor(rows))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::query::BindDir;
    use model::schema::Slot;
    use model::{ObjectType, TableKind};
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    fn setup() -> (MemStore, Arc<TableSchema>) {
        let schemas = Arc::new(SchemaRegistry::builtin().unwrap());
        let schema = schemas.get(ObjectType::Vbridge, TableKind::Main).unwrap();
        (MemStore::new(schemas), schema)
    }

    fn vbr(schema: &Arc<TableSchema>, dt: DatastoreVersion, name: &str, desc: &str) -> BoundQuery {
        let mut q = BoundQuery::new(schema.clone(), dt);
        q.bind(Slot::Key(0), BindDir::INPUT, Some(FieldValue::text("T1")));
        q.bind(Slot::Key(1), BindDir::INPUT, Some(FieldValue::text(name)));
        q.bind(Slot::Config(0), BindDir::INPUT, Some(FieldValue::text(desc)));
        q.bind(Slot::Controller, BindDir::INPUT, Some(FieldValue::text("pfc1")));
        q.bind(Slot::Domain, BindDir::INPUT, Some(FieldValue::text("d1")));
        q
    }

    fn full_read(schema: &Arc<TableSchema>, dt: DatastoreVersion) -> BoundQuery {
        let mut q = BoundQuery::new(schema.clone(), dt);
        for slot in [Slot::Key(0), Slot::Key(1), Slot::Config(0)] {
            q.bind(slot, BindDir::OUTPUT | BindDir::COMPARE, None);
        }
        q
    }

    fn drain(mut cursor: RowCursor) -> Vec<RowPair> {
        let mut out = Vec::new();
        while let Some(pair) = cursor.next_row().unwrap() {
            out.push(pair);
        }
        out
    }

    #[test]
    #[traced_test]
    fn crud() {
        let (store, schema) = setup();
        let dt = DatastoreVersion::Candidate;
        store.create(&vbr(&schema, dt, "B1", "one")).unwrap();
        assert_eq!(
            store.create(&vbr(&schema, dt, "B1", "again")),
            Err(UpllError::InstanceExists)
        );
        store.create(&vbr(&schema, dt, "B2", "two")).unwrap();

        let mut upd = BoundQuery::new(schema.clone(), dt);
        upd.bind(Slot::Key(1), BindDir::MATCH, Some(FieldValue::text("B2")));
        upd.bind(Slot::Config(0), BindDir::INPUT, Some(FieldValue::text("deux")));
        assert_eq!(store.update(&upd), Ok(1));

        let rows = store.read(&full_read(&schema, dt)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get(&Slot::Config(0)), Some(&FieldValue::text("deux")));
        // a state read is served from running, which is empty
        assert_eq!(
            store.read(&full_read(&schema, DatastoreVersion::State)),
            Err(UpllError::NoSuchInstance)
        );

        let siblings = store
            .read(&full_read(&schema, dt).with_after(vec![FieldValue::text("T1"), FieldValue::text("B1")]))
            .unwrap();
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].get(&Slot::Key(1)), Some(&FieldValue::text("B2")));

        let mut del = BoundQuery::new(schema.clone(), dt);
        del.bind(Slot::Key(0), BindDir::MATCH, Some(FieldValue::text("T1")));
        assert_eq!(store.record_count(&del), Ok(2));
        assert_eq!(store.delete(&del), Ok(2));
        assert_eq!(store.delete(&del), Err(UpllError::NoSuchInstance));
        assert_eq!(store.record_exists(&del), Ok(false));
    }

    #[test]
    fn diff_partitions_rows() {
        let (store, schema) = setup();
        let (a, b) = (DatastoreVersion::Candidate, DatastoreVersion::Running);
        store.create(&vbr(&schema, b, "same", "x")).unwrap();
        store.create(&vbr(&schema, b, "changed", "old")).unwrap();
        store.create(&vbr(&schema, b, "gone", "x")).unwrap();
        store.create(&vbr(&schema, a, "same", "x")).unwrap();
        store.create(&vbr(&schema, a, "changed", "new")).unwrap();
        store.create(&vbr(&schema, a, "fresh", "x")).unwrap();

        let q = full_read(&schema, a);
        let created = drain(store.get_created(b, &q).unwrap());
        let updated = drain(store.get_updated(b, &q).unwrap());
        let deleted = drain(store.get_deleted(b, &q).unwrap());
        let name = |r: &Option<Row>| r.as_ref().and_then(|r| r.get(&Slot::Key(1)).cloned());
        assert_eq!(created.len(), 1);
        assert_eq!(name(&created[0].new), Some(FieldValue::text("fresh")));
        assert_eq!(updated.len(), 1);
        assert_eq!(
            updated[0].old.as_ref().and_then(|r| r.get(&Slot::Config(0)).cloned()),
            Some(FieldValue::text("old"))
        );
        assert_eq!(deleted.len(), 1);
        assert_eq!(name(&deleted[0].old), Some(FieldValue::text("gone")));
        assert!(deleted[0].new.is_none());
        assert_eq!(store.open_cursors(), 0);
    }

    #[test]
    fn cursors_are_tracked_and_faults_injected() {
        let (store, schema) = setup();
        let dt = DatastoreVersion::Candidate;
        store.create(&vbr(&schema, dt, "B1", "one")).unwrap();
        store.create(&vbr(&schema, dt, "B2", "two")).unwrap();
        let q = full_read(&schema, dt);
        {
            let mut cursor = store.get_created(DatastoreVersion::Running, &q).unwrap();
            assert_eq!(store.open_cursors(), 1);
            store.fail_after(1);
            assert!(cursor.next_row().unwrap().is_some());
            assert!(matches!(cursor.next_row(), Err(UpllError::DbAccess(_))));
        }
        assert_eq!(store.open_cursors(), 0);

        store.fail_next();
        assert!(matches!(store.read(&q), Err(UpllError::DbAccess(_))));
        assert!(store.read(&q).is_ok());
    }

    #[test]
    fn raw_aggregate() {
        let (store, schema) = setup();
        let dt = DatastoreVersion::Candidate;
        store.create(&vbr(&schema, dt, "B1", "x")).unwrap();
        store.create(&vbr(&schema, dt, "B2", "x")).unwrap();
        let mut mv = vbr(&schema, dt, "B3", "x");
        mv.bind(Slot::Domain, BindDir::INPUT, Some(FieldValue::text("d2")));
        store.create(&mv).unwrap();

        let mut cursor = store
            .execute_raw_query(
                "SELECT ctrlr_name, domain_id, COUNT(*) FROM ca_vbr_tbl WHERE vtn_name = ? GROUP BY ctrlr_name, domain_id",
                &[FieldValue::text("T1")],
            )
            .unwrap();
        let mut groups = Vec::new();
        while let Some(row) = cursor.next_row().unwrap() {
            groups.push(row);
        }
        drop(cursor);
        assert_eq!(
            groups,
            vec![
                vec![FieldValue::text("pfc1"), FieldValue::text("d1"), FieldValue::U64(2)],
                vec![FieldValue::text("pfc1"), FieldValue::text("d2"), FieldValue::U64(1)],
            ]
        );
        assert!(store.execute_raw_query("SELECT a, COUNT(*) FROM xx_vbr_tbl GROUP BY a", &[]).is_err());
        assert!(
            store
                .execute_raw_query("SELECT domain_id, COUNT(*) FROM ca_vbr_tbl WHERE vtn_name = ? GROUP BY domain_id", &[])
                .is_err()
        );
        assert_eq!(store.open_cursors(), 0);
    }

    #[test]
    fn raw_aggregate_ignores_keyword_case() {
        let (store, schema) = setup();
        let dt = DatastoreVersion::Candidate;
        store.create(&vbr(&schema, dt, "B1", "x")).unwrap();
        let mut mv = vbr(&schema, dt, "B2", "x");
        mv.bind(Slot::Domain, BindDir::INPUT, Some(FieldValue::text("d2")));
        store.create(&mv).unwrap();

        let mut cursor = store
            .execute_raw_query(
                "select domain_id, count(*)\n  from ca_vbr_tbl\n  where vtn_name = ? and ctrlr_name = ?\n  group by domain_id",
                &[FieldValue::text("T1"), FieldValue::text("pfc1")],
            )
            .unwrap();
        let mut groups = Vec::new();
        while let Some(row) = cursor.next_row().unwrap() {
            groups.push(row);
        }
        drop(cursor);
        assert_eq!(
            groups,
            vec![
                vec![FieldValue::text("d1"), FieldValue::U64(1)],
                vec![FieldValue::text("d2"), FieldValue::U64(1)],
            ]
        );
        assert_eq!(store.open_cursors(), 0);
    }

    #[test]
    fn clone_datastore_replaces_destination() {
        let (store, schema) = setup();
        store.create(&vbr(&schema, DatastoreVersion::Running, "B1", "x")).unwrap();
        store.create(&vbr(&schema, DatastoreVersion::Audit, "stale", "x")).unwrap();
        store.clone_datastore(DatastoreVersion::Running, DatastoreVersion::Audit);
        let rows = store.rows(DatastoreVersion::Audit, &schema);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(&Slot::Key(1)), Some(&FieldValue::text("B1")));
    }
}
