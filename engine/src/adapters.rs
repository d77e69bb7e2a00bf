// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Aggregate statuses kept in the status columns of RUNNING rows.

use model::schema::Slot;
use model::{
    AggregateStatus, DatastoreVersion, FieldValue, ObjectType, OperStatus, SchemaRegistry,
    TableKind, TableSchema, UpllError, UpllResult,
};
use operstatus::{StatusNode, StatusRepository};
use std::sync::Arc;
use store::{BindDir, BoundQuery, VersionedStore};
#[allow(unused)]
use tracing::{debug, error, trace};

const STATUS_SLOTS: [Slot; 3] = [Slot::OperStatus, Slot::DownCount, Slot::UnknownCount];

/// A [`StatusRepository`] over the main tables of status-carrying types, and over the VTN
/// controller table for tenant-controller nodes.
pub struct StoreStatusRepository {
    store: Arc<dyn VersionedStore>,
    schemas: Arc<SchemaRegistry>,
}

impl StoreStatusRepository {
    #[must_use]
    pub fn new(store: Arc<dyn VersionedStore>, schemas: Arc<SchemaRegistry>) -> Self {
        Self { store, schemas }
    }

    /// The table and identity values of the row carrying the status of a node.
    fn locate(&self, node: &StatusNode) -> UpllResult<(Arc<TableSchema>, Vec<(Slot, FieldValue)>)> {
        match node {
            StatusNode::Object(key) => {
                let schema = self.schemas.get(key.otype(), TableKind::Main)?;
                if !schema.has_status() {
                    trace!("{key} carries no status");
                    return Err(UpllError::NoSuchInstance);
                }
                let identity = key
                    .fields()
                    .iter()
                    .enumerate()
                    .map(|(i, f)| f.clone().map(|v| (Slot::Key(i), v)))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| {
                        UpllError::Generic(format!("status of incomplete key {key}"))
                    })?;
                Ok((schema, identity))
            }
            StatusNode::TenantController {
                tenant,
                controller,
                domain,
            } => {
                let schema = self.schemas.get(ObjectType::Vtn, TableKind::Controller)?;
                let identity = vec![
                    (Slot::Key(0), FieldValue::text(tenant.as_str())),
                    (Slot::Controller, FieldValue::text(controller.as_str())),
                    (Slot::Domain, FieldValue::text(domain.as_str())),
                ];
                Ok((schema, identity))
            }
        }
    }

    fn query(schema: Arc<TableSchema>, identity: Vec<(Slot, FieldValue)>) -> BoundQuery {
        let mut query = BoundQuery::new(schema, DatastoreVersion::Running);
        for (slot, value) in identity {
            query.bind(slot, BindDir::MATCH, Some(value));
        }
        query
    }

    fn write(&self, node: &StatusNode, status: &AggregateStatus) -> UpllResult {
        let (schema, identity) = self.locate(node)?;
        let mut query = Self::query(schema, identity);
        query.bind(
            Slot::OperStatus,
            BindDir::INPUT,
            Some(FieldValue::U8(status.oper_status.as_u8())),
        );
        query.bind(Slot::DownCount, BindDir::INPUT, Some(FieldValue::U32(status.down_count)));
        query.bind(
            Slot::UnknownCount,
            BindDir::INPUT,
            Some(FieldValue::U32(status.unknown_count)),
        );
        self.store.update(&query).map(|_| ())
    }
}

impl StatusRepository for StoreStatusRepository {
    fn load(&self, node: &StatusNode) -> UpllResult<AggregateStatus> {
        let (schema, identity) = self.locate(node)?;
        let mut query = Self::query(schema, identity);
        for slot in STATUS_SLOTS {
            query.bind(slot, BindDir::OUTPUT, None);
        }
        let rows = self.store.read(&query)?;
        let Some(row) = rows.first() else {
            return Err(UpllError::NoSuchInstance);
        };
        let get = |slot: Slot| row.get(&slot).and_then(FieldValue::as_u32).unwrap_or_default();
        Ok(AggregateStatus {
            oper_status: OperStatus::from_u8(
                row.get(&Slot::OperStatus)
                    .and_then(FieldValue::as_u8)
                    .unwrap_or_default(),
            ),
            down_count: get(Slot::DownCount),
            unknown_count: get(Slot::UnknownCount),
        })
    }

    fn store(&self, node: &StatusNode, status: &AggregateStatus) -> UpllResult {
        self.write(node, status)
    }

    /// The row outlives its status: the columns go back to their creation default.
    fn remove(&self, node: &StatusNode) -> UpllResult {
        self.write(node, &AggregateStatus::uninit())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::binder::{DbSubOp, bind};
    use model::{Entity, ObjectKey, Operation, ScopeData, STAND_ALONE_SENTINEL};
    use pretty_assertions::assert_eq;
    use store::mem::MemStore;

    fn fixture() -> (Arc<MemStore>, StoreStatusRepository) {
        let schemas = Arc::new(SchemaRegistry::builtin().unwrap());
        let store = Arc::new(MemStore::new(schemas.clone()));
        let repo = StoreStatusRepository::new(store.clone(), schemas.clone());
        for (mut entity, kind) in [
            (Entity::new(ObjectKey::vbridge("T1", "B1")), TableKind::Main),
            (
                Entity::new(ObjectKey::vtn("T1")).with_scope(ScopeData::new("pfc1", "d1")),
                TableKind::Controller,
            ),
        ] {
            let schema = schemas.get(entity.key.otype(), kind).unwrap();
            let q = bind(
                &mut entity,
                Operation::Create,
                DatastoreVersion::Running,
                &schema,
                DbSubOp::default(),
            )
            .unwrap();
            store.create(&q).unwrap();
        }
        (store, repo)
    }

    #[test]
    fn object_status_lives_in_running() {
        let (_store, repo) = fixture();
        let node = StatusNode::Object(ObjectKey::vbridge("T1", "B1"));
        assert_eq!(repo.load(&node).unwrap(), AggregateStatus::uninit());
        let status = AggregateStatus::stand_alone(OperStatus::Down);
        repo.store(&node, &status).unwrap();
        let loaded = repo.load(&node).unwrap();
        assert_eq!(loaded.down_count, STAND_ALONE_SENTINEL);
        assert_eq!(loaded.oper_status, OperStatus::Down);
        repo.remove(&node).unwrap();
        assert_eq!(repo.load(&node).unwrap(), AggregateStatus::uninit());
    }

    #[test]
    fn tenant_controller_status() {
        let (_store, repo) = fixture();
        let node = StatusNode::tenant_controller("T1", "pfc1", "d1");
        let status = AggregateStatus {
            oper_status: OperStatus::Down,
            down_count: 1,
            unknown_count: 0,
        };
        repo.store(&node, &status).unwrap();
        assert_eq!(repo.load(&node).unwrap(), status);
        let other = StatusNode::tenant_controller("T1", "pfc1", "d2");
        assert_eq!(repo.load(&other), Err(UpllError::NoSuchInstance));
        assert_eq!(repo.store(&other, &status), Err(UpllError::NoSuchInstance));
    }

    #[test]
    fn types_without_status() {
        let (_store, repo) = fixture();
        let node = StatusNode::Object(ObjectKey::vlan_map("T1", "B1", "lp1"));
        assert_eq!(repo.load(&node), Err(UpllError::NoSuchInstance));
        let missing = StatusNode::Object(ObjectKey::vbridge("T1", "B9"));
        assert_eq!(repo.load(&missing), Err(UpllError::NoSuchInstance));
    }
}
