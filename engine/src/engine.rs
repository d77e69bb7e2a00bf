// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The configuration engine: request entry points over the Versioned Store.

use crate::adapters::StoreStatusRepository;
use crate::binder::{
    BindFlags, DbSubOp, ReadShape, apply_outputs, bind, entity_from_row, identity_update,
};
use crate::capability::CapabilityProvider;
use crate::cascade::{Cascade, label_owner, label_scope};
use crate::managers::{ChildCounts, ManagerRegistry};
use crate::params::EngineParams;
use crate::rename::RenameRegistry;
use idalloc::{IdPools, MemPoolBackend, PoolBackend, PoolKind};
use model::schema::{Slot, attrs};
use model::{
    AbsentOk, AggregateStatus, AttributeValidity, ConfigScope, DatastoreVersion, Entity,
    FieldValue, Label, ObjectKey, ObjectType, Operation, SchemaRegistry, ScopeData, TableKind,
    TableSchema, UpllError, UpllResult, ValueBlock,
};
use operstatus::{
    AlarmSink, Aggregator, ControllerRegistry, StatusChange, StatusEvent, StatusNode,
};
use std::sync::Arc;
use store::VersionedStore;
use tracectl::TracingControl;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Per-request context supplied by the transaction coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestHeader {
    pub session_id: u32,
    pub config_id: u32,
    pub scope: ConfigScope,
    pub datastore: DatastoreVersion,
}

impl RequestHeader {
    /// A request on the whole datastore.
    #[must_use]
    pub fn new(session_id: u32, config_id: u32, datastore: DatastoreVersion) -> Self {
        Self {
            session_id,
            config_id,
            scope: ConfigScope::Global,
            datastore,
        }
    }

    /// Fence the request to the rows of one tenant.
    #[must_use]
    pub fn fenced(mut self, tenant: &str) -> Self {
        self.scope = ConfigScope::PerTenant(tenant.to_owned());
        self
    }
}

/// The configuration engine. Owns the registries, the identifier pools, the status aggregator
/// and the rename registry, and runs one request at a time.
pub struct ConfigEngine {
    pub(crate) params: EngineParams,
    pub(crate) store: Arc<dyn VersionedStore>,
    pub(crate) schemas: Arc<SchemaRegistry>,
    pub(crate) managers: ManagerRegistry,
    pub(crate) pools: IdPools,
    pub(crate) status: Aggregator,
    pub(crate) renames: RenameRegistry,
    pub(crate) capabilities: Arc<dyn CapabilityProvider>,
    pub(crate) controllers: Arc<dyn ControllerRegistry>,
}

impl ConfigEngine {
    /// Build an engine over a store, with identifier pools kept in memory.
    pub fn new(
        params: EngineParams,
        store: Arc<dyn VersionedStore>,
        capabilities: Arc<dyn CapabilityProvider>,
        controllers: Arc<dyn ControllerRegistry>,
        alarms: Arc<dyn AlarmSink>,
    ) -> UpllResult<Self> {
        Self::with_pool_backend(
            params,
            store,
            Arc::new(MemPoolBackend::new()),
            capabilities,
            controllers,
            alarms,
        )
    }

    pub fn with_pool_backend(
        params: EngineParams,
        store: Arc<dyn VersionedStore>,
        pool_backend: Arc<dyn PoolBackend>,
        capabilities: Arc<dyn CapabilityProvider>,
        controllers: Arc<dyn ControllerRegistry>,
        alarms: Arc<dyn AlarmSink>,
    ) -> UpllResult<Self> {
        if let Some(config) = params.tracing.as_deref() {
            TracingControl::init(Some(config)).map_err(|e| {
                error!("Bad tracing configuration '{config}': {e}");
                UpllError::Generic(format!("tracing configuration: {e}"))
            })?;
        }
        info!("{params}");
        let schemas = Arc::new(SchemaRegistry::builtin()?);
        let repo = Arc::new(StoreStatusRepository::new(store.clone(), schemas.clone()));
        let mut renames = RenameRegistry::new();
        renames.reload(store.as_ref(), &schemas, DatastoreVersion::Candidate)?;
        Ok(Self {
            pools: IdPools::new(pool_backend, params.vbid_pool, params.gvtnid_pool),
            status: Aggregator::new(repo, alarms, controllers.clone()),
            managers: ManagerRegistry::builtin(),
            params,
            store,
            schemas,
            renames,
            capabilities,
            controllers,
        })
    }

    #[must_use]
    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn VersionedStore> {
        &self.store
    }

    #[must_use]
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    #[must_use]
    pub fn renames(&self) -> &RenameRegistry {
        &self.renames
    }

    #[must_use]
    pub fn aggregator(&self) -> &Aggregator {
        &self.status
    }

    pub fn pools_mut(&mut self) -> &mut IdPools {
        &mut self.pools
    }

    //////////////////////////////////////////////////////////////////
    /// Row helpers
    //////////////////////////////////////////////////////////////////

    pub(crate) fn main_schema(&self, otype: ObjectType) -> UpllResult<Arc<TableSchema>> {
        self.schemas.get(otype, TableKind::Main)
    }

    /// Number of main rows matching `key` (a complete key or a pattern) in `dt`.
    pub(crate) fn count(&self, key: &ObjectKey, dt: DatastoreVersion) -> UpllResult<usize> {
        let schema = self.main_schema(key.otype())?;
        let mut pattern = Entity::new(key.clone());
        let sub = DbSubOp::new(ReadShape::Count);
        let query = bind(&mut pattern, Operation::Read, dt, &schema, sub)?;
        self.store.record_count(&query)
    }

    pub(crate) fn exists(&self, key: &ObjectKey, dt: DatastoreVersion) -> UpllResult<bool> {
        let schema = self.main_schema(key.otype())?;
        let mut pattern = Entity::new(key.clone());
        let sub = DbSubOp::new(ReadShape::Exists);
        let query = bind(&mut pattern, Operation::Read, dt, &schema, sub)?;
        self.store.record_exists(&query)
    }

    /// The main row of an object. Fails with [`UpllError::NoSuchInstance`] if it is absent.
    pub(crate) fn fetch(&self, key: &ObjectKey, dt: DatastoreVersion) -> UpllResult<Entity> {
        let schema = self.main_schema(key.otype())?;
        let mut entity = Entity::new(key.clone());
        let query = bind(&mut entity, Operation::Read, dt, &schema, DbSubOp::default())?;
        let rows = self.store.read(&query)?;
        let Some(row) = rows.first() else {
            return Err(UpllError::NoSuchInstance);
        };
        apply_outputs(&schema, row, &mut entity)?;
        Ok(entity)
    }

    /// Number of children of each type under an object.
    pub(crate) fn child_counts(
        &self,
        key: &ObjectKey,
        dt: DatastoreVersion,
    ) -> UpllResult<ChildCounts> {
        let mut counts = ChildCounts::new();
        for child in key.otype().children() {
            counts.insert(*child, self.count(&key.child_pattern(*child)?, dt)?);
        }
        Ok(counts)
    }

    //////////////////////////////////////////////////////////////////
    /// Checks
    //////////////////////////////////////////////////////////////////

    fn check_write(header: &RequestHeader, key: &ObjectKey) -> UpllResult {
        if !matches!(
            header.datastore,
            DatastoreVersion::Candidate | DatastoreVersion::Import | DatastoreVersion::Audit
        ) {
            error!(
                "Session {}: cannot write {key} into {}",
                header.session_id, header.datastore
            );
            return Err(UpllError::Generic(format!(
                "{} is not writable by requests",
                header.datastore
            )));
        }
        if !header.scope.admits(key) {
            debug!(
                "Session {}: {key} is outside of {:?}",
                header.session_id, header.scope
            );
            return Err(UpllError::CfgSemantic(format!(
                "{key} is outside of the config scope"
            )));
        }
        check_complete(key)
    }

    /// The first existing parent of an object; `None` for roots.
    fn find_parent(
        &self,
        parents: &[ObjectKey],
        dt: DatastoreVersion,
    ) -> UpllResult<Option<Entity>> {
        if parents.is_empty() {
            return Ok(None);
        }
        for parent in parents {
            if let Some(entity) = self.fetch(parent, dt).absent_ok()? {
                return Ok(Some(entity));
            }
        }
        let names: Vec<String> = parents.iter().map(ToString::to_string).collect();
        debug!("None of {names:?} exists in {dt}");
        Err(UpllError::ParentDoesNotExist(names.join(" | ")))
    }

    fn check_instance_limit(
        &self,
        entity: &Entity,
        schema: &Arc<TableSchema>,
        dt: DatastoreVersion,
    ) -> UpllResult {
        if !schema.is_scoped() || !entity.scope.is_complete() {
            return Ok(());
        }
        let Some(controller) = entity.scope.controller.as_deref() else {
            return Ok(());
        };
        let Some(ctype) = self
            .controllers
            .get_controller_type(controller, dt)
            .absent_ok()?
        else {
            return Ok(());
        };
        let capability = self
            .capabilities
            .get_create_capability(ctype, dt, schema.otype())?;
        let Some(max) = capability.max_instances else {
            return Ok(());
        };
        let mut pattern =
            Entity::new(ObjectKey::wildcard(schema.otype())).with_scope(entity.scope.clone());
        let sub = DbSubOp::new(ReadShape::Count).with(BindFlags::SCOPE_MATCH);
        let query = bind(&mut pattern, Operation::Read, dt, schema, sub)?;
        let count = self.store.record_count(&query)?;
        if count >= max as usize {
            debug!(
                "{}: {count} instance(s) at {}, {ctype} takes {max}",
                entity.key, entity.scope
            );
            return Err(UpllError::ExceedsResourceLimit(format!(
                "{ctype} supports {max} {} per controller-domain",
                schema.otype()
            )));
        }
        Ok(())
    }

    //////////////////////////////////////////////////////////////////
    /// Writes
    //////////////////////////////////////////////////////////////////

    /// Create an object.
    ///
    /// One of its parents must exist, and it must not. Scoped objects created without a
    /// controller-domain inherit the one of their parent. vnodes account for themselves in
    /// the controller row of their tenant.
    pub fn create(&mut self, header: &RequestHeader, mut entity: Entity) -> UpllResult {
        Self::check_write(header, &entity.key)?;
        let dt = header.datastore;
        let otype = entity.key.otype();
        let schema = self.main_schema(otype)?;
        let manager = self.managers.get(otype)?;
        manager.validate(&entity, &schema)?;
        let parents = manager.parent_keys(&entity.key);
        let label_policy = manager.label_policy();

        let parent = self.find_parent(&parents, dt)?;
        if self.exists(&entity.key, dt)? {
            debug!("Session {}: {} exists in {dt}", header.session_id, entity.key);
            return Err(UpllError::InstanceExists);
        }
        if schema.is_scoped() && !entity.scope.is_complete() {
            if let Some(parent) = parent.filter(|p| p.scope.is_complete()) {
                entity.scope.controller = parent.scope.controller;
                entity.scope.domain = parent.scope.domain;
            }
        }
        self.check_instance_limit(&entity, &schema, dt)?;

        let mut allocated = None;
        if let Some(policy) = label_policy.filter(|p| p.table == TableKind::Main) {
            if dt == DatastoreVersion::Candidate {
                allocated = self.assign_label(&mut entity, policy.kind, policy.attr, &schema)?;
            }
        }
        entity.changed = dt.tracks_changes();
        let sub = DbSubOp::default().with(BindFlags::CHANGED);
        let written = bind(&mut entity, Operation::Create, dt, &schema, sub)
            .and_then(|query| self.store.create(&query));
        if let Err(e) = written {
            if let Some((kind, scope, label)) = allocated {
                self.pools.deallocate(kind, &scope, label)?;
            }
            return Err(e);
        }
        if otype.is_vnode() {
            self.adjust_ref_count(&entity, dt, true)?;
        }
        debug!(
            "Session {}: created {entity} in {dt}",
            header.session_id
        );
        Ok(())
    }

    /// Give an object the label it carries, or a fresh one. Returns what was newly allocated.
    fn assign_label(
        &mut self,
        entity: &mut Entity,
        kind: PoolKind,
        attr: usize,
        schema: &TableSchema,
    ) -> UpllResult<Option<(PoolKind, idalloc::PoolScope, Label)>> {
        let scope = label_scope(kind, &entity.key, &entity.scope)?;
        let carried = entity
            .config_value(attr)
            .and_then(FieldValue::as_u32)
            .filter(|raw| *raw != 0)
            .map(Label::new_checked)
            .transpose()?;
        let owner = label_owner(&entity.key, &entity.scope);
        if let Some(label) = carried {
            self.pools.reserve(kind, &scope, label, &owner)?;
            debug!("{} keeps {kind} {label}", entity.key);
            return Ok(Some((kind, scope, label)));
        }
        let label = self.pools.allocate(kind, &scope, &owner, &[])?;
        entity
            .config_or_alloc(schema.config_len())
            .set(attr, label.as_u32())?;
        Ok(Some((kind, scope, label)))
    }

    /// Count a vnode in, or out of, the controller row of its tenant. The row is created with
    /// the first vnode and removed with the last one.
    pub(crate) fn adjust_ref_count(
        &self,
        vnode: &Entity,
        dt: DatastoreVersion,
        up: bool,
    ) -> UpllResult {
        let (Some(tenant), Some(controller), Some(domain)) = (
            vnode.key.tenant(),
            vnode.scope.controller.as_deref(),
            vnode.scope.domain.as_deref(),
        ) else {
            trace!("{} is not mapped to a controller-domain", vnode.key);
            return Ok(());
        };
        let schema = self.schemas.get(ObjectType::Vtn, TableKind::Controller)?;
        let mut row_entity =
            Entity::new(ObjectKey::vtn(tenant)).with_scope(ScopeData::new(controller, domain));
        let query = bind(
            &mut row_entity,
            Operation::Read,
            dt,
            &schema,
            DbSubOp::default(),
        )?;
        let Some(row) = self.store.read(&query).absent_ok()?.and_then(|mut r| r.pop()) else {
            if !up {
                warn!("No controller row of {tenant} at {controller}/{domain} to count out of");
                return Ok(());
            }
            let mut config = ValueBlock::new(schema.config_len());
            config.set(attrs::vtn_ctrlr::REF_COUNT, 1u32)?;
            let mut created = Entity::new(ObjectKey::vtn(tenant))
                .with_scope(ScopeData::new(controller, domain))
                .with_config(config);
            created.changed = dt.tracks_changes();
            let sub = DbSubOp::default().with(BindFlags::CHANGED);
            self.store
                .create(&bind(&mut created, Operation::Create, dt, &schema, sub)?)?;
            debug!("{tenant} now spans {controller}/{domain}");
            return Ok(());
        };
        let current = entity_from_row(&schema, &row)?
            .config_value(attrs::vtn_ctrlr::REF_COUNT)
            .and_then(FieldValue::as_u32)
            .unwrap_or_default();
        let count = if up {
            current.saturating_add(1)
        } else {
            current.saturating_sub(1)
        };
        if count == 0 {
            let mut gone = Entity::new(ObjectKey::vtn(tenant))
                .with_scope(ScopeData::new(controller, domain));
            self.store.delete(&bind(
                &mut gone,
                Operation::Delete,
                dt,
                &schema,
                DbSubOp::default(),
            )?)?;
            debug!("{tenant} no longer spans {controller}/{domain}");
            return Ok(());
        }
        let valid = AttributeValidity::Valid.as_u8();
        let writes = [
            (Slot::Config(attrs::vtn_ctrlr::REF_COUNT), Some(FieldValue::U32(count))),
            (Slot::ConfigValid(attrs::vtn_ctrlr::REF_COUNT), Some(FieldValue::U8(valid))),
            (Slot::Changed, Some(FieldValue::Bool(dt.tracks_changes()))),
        ];
        self.store
            .update(&identity_update(&schema, dt, &row, writes))?;
        trace!("{tenant} at {controller}/{domain}: {count} vnode(s)");
        Ok(())
    }

    /// Update the present attributes of an object.
    pub fn update(&mut self, header: &RequestHeader, mut entity: Entity) -> UpllResult {
        Self::check_write(header, &entity.key)?;
        let dt = header.datastore;
        let schema = self.main_schema(entity.key.otype())?;
        self.managers
            .get(entity.key.otype())?
            .validate(&entity, &schema)?;
        entity.changed = dt.tracks_changes();
        let sub = DbSubOp::default().with(BindFlags::CHANGED);
        let query = bind(&mut entity, Operation::Update, dt, &schema, sub)?;
        self.store.update(&query)?;
        debug!("Session {}: updated {} in {dt}", header.session_id, entity.key);
        Ok(())
    }

    /// Delete an object and everything under it. Returns the number of rows removed.
    ///
    /// Fails with [`UpllError::NoSuchInstance`] if the object does not exist.
    pub fn delete(&mut self, header: &RequestHeader, key: &ObjectKey) -> UpllResult<usize> {
        Self::check_write(header, key)?;
        let dt = header.datastore;
        let existing = self.fetch(key, dt)?;
        let removed = Cascade::new(self.store.as_ref(), &self.schemas, &self.managers)
            .with_pools(&mut self.pools)
            .delete_subtree(key, dt, &header.scope)?;
        if key.otype().is_vnode() {
            self.adjust_ref_count(&existing, dt, false)?;
        }
        if dt == DatastoreVersion::Candidate {
            self.forget_renames(&existing);
        }
        debug!(
            "Session {}: deleted {key} from {dt}, {removed} row(s)",
            header.session_id
        );
        Ok(removed)
    }

    fn forget_renames(&mut self, entity: &Entity) {
        match entity.key.otype() {
            ObjectType::Vtn => {
                if let Some(tenant) = entity.key.tenant() {
                    self.renames.remove_tenant(tenant);
                }
            }
            otype if otype.is_vnode() => {
                let (Some(c), Some(d)) = (
                    entity.scope.controller.as_deref(),
                    entity.scope.domain.as_deref(),
                ) else {
                    return;
                };
                if self.renames.remove(&entity.key, c, d).is_ok() {
                    debug!("{} lost its name at {c}/{d}", entity.key);
                }
            }
            _ => {}
        }
    }

    /// Create the converted copy of a vBridge at a controller-domain, labelled with a VBID of
    /// its tenant. Returns the label.
    pub fn create_converted(
        &mut self,
        header: &RequestHeader,
        vbridge: &ObjectKey,
        controller: &str,
        domain: &str,
    ) -> UpllResult<Label> {
        Self::check_write(header, vbridge)?;
        if vbridge.otype() != ObjectType::Vbridge || header.datastore != DatastoreVersion::Candidate
        {
            return Err(UpllError::Generic(format!(
                "cannot convert {vbridge} in {}",
                header.datastore
            )));
        }
        let dt = header.datastore;
        if !self.exists(vbridge, dt)? {
            return Err(UpllError::ParentDoesNotExist(vbridge.to_string()));
        }
        let schema = self.schemas.get(ObjectType::Vbridge, TableKind::Convert)?;
        let mut scope = ScopeData::new(controller, domain);
        scope.mark_converted();
        let pool = label_scope(PoolKind::Vbid, vbridge, &scope)?;
        let owner = label_owner(vbridge, &scope);
        let label = self.pools.allocate(PoolKind::Vbid, &pool, &owner, &[])?;

        let mut config = ValueBlock::new(schema.config_len());
        config.set(attrs::vbr_convert::CONV_VBR_NAME, format!("vbr_{label}"))?;
        config.set(attrs::vbr_convert::LABEL, label.as_u32())?;
        let mut converted = Entity::new(vbridge.clone())
            .with_scope(scope)
            .with_config(config);
        converted.changed = true;
        let sub = DbSubOp::default().with(BindFlags::CHANGED);
        let written = bind(&mut converted, Operation::Create, dt, &schema, sub)
            .and_then(|query| self.store.create(&query));
        if let Err(e) = written {
            error!("Could not convert {vbridge} at {controller}/{domain}: {e}");
            self.pools.deallocate(PoolKind::Vbid, &pool, label)?;
            return Err(e);
        }
        debug!("Converted {vbridge} at {controller}/{domain} with vbid {label}");
        Ok(label)
    }

    //////////////////////////////////////////////////////////////////
    /// Reads
    //////////////////////////////////////////////////////////////////

    pub fn read(&self, header: &RequestHeader, key: &ObjectKey) -> UpllResult<Entity> {
        check_complete(key)?;
        self.fetch(key, header.datastore)
    }

    /// Siblings of `key` sorting after it, at most `max_read_records` of them.
    pub fn read_sibling(&self, header: &RequestHeader, key: &ObjectKey) -> UpllResult<Vec<Entity>> {
        check_complete(key)?;
        let after: Vec<FieldValue> = key.fields().iter().flatten().cloned().collect();
        self.read_siblings(header, key, Some(after))
    }

    /// Siblings of `key` from the first one, whatever its last key field.
    pub fn read_sibling_begin(
        &self,
        header: &RequestHeader,
        key: &ObjectKey,
    ) -> UpllResult<Vec<Entity>> {
        self.read_siblings(header, key, None)
    }

    pub fn read_sibling_count(&self, header: &RequestHeader, key: &ObjectKey) -> UpllResult<usize> {
        self.count(&sibling_pattern(key)?, header.datastore)
    }

    fn read_siblings(
        &self,
        header: &RequestHeader,
        key: &ObjectKey,
        after: Option<Vec<FieldValue>>,
    ) -> UpllResult<Vec<Entity>> {
        let schema = self.main_schema(key.otype())?;
        let mut pattern = Entity::new(sibling_pattern(key)?);
        let sub = DbSubOp::new(ReadShape::Multi);
        let mut query = bind(&mut pattern, Operation::Read, header.datastore, &schema, sub)?
            .with_limit(self.params.max_read_records);
        if let Some(after) = after {
            query = query.with_after(after);
        }
        let rows = self.store.read(&query).absent_ok()?.unwrap_or_default();
        trace!("{} sibling(s) of {key} in {}", rows.len(), header.datastore);
        rows.iter()
            .map(|row| entity_from_row(&schema, row))
            .collect()
    }

    //////////////////////////////////////////////////////////////////
    /// Status
    //////////////////////////////////////////////////////////////////

    /// Status path of an object mapped to a controller-domain: the object, its vnode for an
    /// interface, the tenant-controller node and the tenant.
    pub(crate) fn path_for(key: &ObjectKey, scope: &ScopeData) -> UpllResult<Vec<StatusNode>> {
        let otype = key.otype();
        let tenant = key
            .tenant()
            .ok_or_else(|| UpllError::Generic(format!("{key} has no status path")))?;
        let mut path = vec![StatusNode::Object(key.clone())];
        if otype == ObjectType::Vtn {
            return Ok(path);
        }
        if otype.is_vnode_if() {
            let vnode = otype
                .parents()
                .into_iter()
                .find_map(|p| key.parent(p))
                .ok_or_else(|| UpllError::Generic(format!("{key} has no vnode")))?;
            path.push(StatusNode::Object(vnode));
        } else if !otype.is_vnode() {
            return Err(UpllError::Generic(format!("{otype} carries no status")));
        }
        if let (Some(c), Some(d)) = (scope.controller.as_deref(), scope.domain.as_deref()) {
            path.push(StatusNode::tenant_controller(tenant, c, d));
        }
        path.push(StatusNode::Object(ObjectKey::vtn(tenant)));
        Ok(path)
    }

    /// Status path of a committed object.
    pub fn status_path(&self, key: &ObjectKey) -> UpllResult<Vec<StatusNode>> {
        let scope = if key.otype() == ObjectType::Vtn {
            ScopeData::default()
        } else {
            self.fetch(key, DatastoreVersion::Running)?.scope
        };
        Self::path_for(key, &scope)
    }

    pub fn status(&self, key: &ObjectKey) -> UpllResult<AggregateStatus> {
        self.status.status(&StatusNode::Object(key.clone()))
    }

    /// Hand a notification about a committed object to the aggregator.
    pub fn notify(
        &mut self,
        key: &ObjectKey,
        event: StatusEvent,
    ) -> UpllResult<Vec<StatusChange>> {
        let path = self.status_path(key)?;
        self.status.notify(&path, event)
    }
}

fn check_complete(key: &ObjectKey) -> UpllResult {
    if key.is_complete() {
        Ok(())
    } else {
        Err(UpllError::Generic(format!("incomplete key {key}")))
    }
}

/// The key with its last field left open.
fn sibling_pattern(key: &ObjectKey) -> UpllResult<ObjectKey> {
    let mut pattern = key.clone();
    pattern.set_field(key.otype().key_arity() - 1, None)?;
    Ok(pattern)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capability::{Capability, CapabilityKind, StaticCapabilities};
    use model::ControllerType;
    use operstatus::{RecordingAlarmSink, StaticControllerRegistry};
    use pretty_assertions::assert_eq;
    use store::mem::MemStore;
    use tracing_test::traced_test;

    fn engine_with(caps: StaticCapabilities) -> (Arc<MemStore>, ConfigEngine) {
        let schemas = Arc::new(SchemaRegistry::builtin().unwrap());
        let store = Arc::new(MemStore::new(schemas));
        let controllers = Arc::new(StaticControllerRegistry::new().with("pfc1", ControllerType::Pfc));
        let engine = ConfigEngine::new(
            EngineParams::default(),
            store.clone(),
            Arc::new(caps),
            controllers,
            Arc::new(RecordingAlarmSink::new()),
        )
        .unwrap();
        (store, engine)
    }

    fn candidate() -> RequestHeader {
        RequestHeader::new(1, 1, DatastoreVersion::Candidate)
    }

    fn vbr(tenant: &str, name: &str) -> Entity {
        Entity::new(ObjectKey::vbridge(tenant, name)).with_scope(ScopeData::new("pfc1", "d1"))
    }

    fn ref_count(engine: &ConfigEngine, tenant: &str) -> Option<u32> {
        let schema = engine.schemas.get(ObjectType::Vtn, TableKind::Controller).unwrap();
        let mut row =
            Entity::new(ObjectKey::vtn(tenant)).with_scope(ScopeData::new("pfc1", "d1"));
        let query = bind(
            &mut row,
            Operation::Read,
            DatastoreVersion::Candidate,
            &schema,
            DbSubOp::default(),
        )
        .unwrap();
        let rows = engine.store.read(&query).absent_ok().unwrap()?;
        entity_from_row(&schema, &rows[0])
            .unwrap()
            .config_value(attrs::vtn_ctrlr::REF_COUNT)
            .and_then(FieldValue::as_u32)
    }

    #[test]
    #[traced_test]
    fn create_checks_parent_and_duplicates() {
        let (_store, mut engine) = engine_with(StaticCapabilities::new());
        let h = candidate();
        assert!(matches!(
            engine.create(&h, vbr("T1", "B1")),
            Err(UpllError::ParentDoesNotExist(_))
        ));
        engine.create(&h, Entity::new(ObjectKey::vtn("T1"))).unwrap();
        engine.create(&h, vbr("T1", "B1")).unwrap();
        assert_eq!(engine.create(&h, vbr("T1", "B1")), Err(UpllError::InstanceExists));
        let read = engine.read(&h, &ObjectKey::vbridge("T1", "B1")).unwrap();
        assert!(read.changed);
        assert_eq!(read.scope, ScopeData::new("pfc1", "d1"));
    }

    #[test]
    fn interfaces_inherit_the_scope_of_their_vnode() {
        let (_store, mut engine) = engine_with(StaticCapabilities::new());
        let h = candidate();
        engine.create(&h, Entity::new(ObjectKey::vtn("T1"))).unwrap();
        engine.create(&h, vbr("T1", "B1")).unwrap();
        engine
            .create(&h, Entity::new(ObjectKey::vbr_if("T1", "B1", "If1")))
            .unwrap();
        let read = engine.read(&h, &ObjectKey::vbr_if("T1", "B1", "If1")).unwrap();
        assert!(read.scope.is("pfc1", "d1"));
    }

    #[test]
    fn tenant_fence() {
        let (_store, mut engine) = engine_with(StaticCapabilities::new());
        let h = candidate().fenced("T2");
        assert!(matches!(
            engine.create(&h, Entity::new(ObjectKey::vtn("T1"))),
            Err(UpllError::CfgSemantic(_))
        ));
        engine.create(&h, Entity::new(ObjectKey::vtn("T2"))).unwrap();
        let running = RequestHeader::new(1, 1, DatastoreVersion::Running);
        assert!(matches!(
            engine.create(&running, Entity::new(ObjectKey::vtn("T3"))),
            Err(UpllError::Generic(_))
        ));
    }

    #[test]
    fn vnodes_maintain_the_controller_row() {
        let (_store, mut engine) = engine_with(StaticCapabilities::new());
        let h = candidate();
        engine.create(&h, Entity::new(ObjectKey::vtn("T1"))).unwrap();
        engine.create(&h, vbr("T1", "B1")).unwrap();
        engine.create(&h, vbr("T1", "B2")).unwrap();
        assert_eq!(ref_count(&engine, "T1"), Some(2));
        engine.delete(&h, &ObjectKey::vbridge("T1", "B1")).unwrap();
        assert_eq!(ref_count(&engine, "T1"), Some(1));
        engine.delete(&h, &ObjectKey::vbridge("T1", "B2")).unwrap();
        assert_eq!(ref_count(&engine, "T1"), None);
        assert_eq!(
            engine.delete(&h, &ObjectKey::vbridge("T1", "B2")),
            Err(UpllError::NoSuchInstance)
        );
    }

    #[test]
    fn instance_limit() {
        let caps = StaticCapabilities::new().with(
            CapabilityKind::Create,
            ControllerType::Pfc,
            ObjectType::Vbridge,
            Capability::full().with_max_instances(1),
        );
        let (_store, mut engine) = engine_with(caps);
        let h = candidate();
        engine.create(&h, Entity::new(ObjectKey::vtn("T1"))).unwrap();
        engine.create(&h, vbr("T1", "B1")).unwrap();
        assert!(matches!(
            engine.create(&h, vbr("T1", "B2")),
            Err(UpllError::ExceedsResourceLimit(_))
        ));
        // unknown controllers are not limited
        let other = Entity::new(ObjectKey::vbridge("T1", "B3"))
            .with_scope(ScopeData::new("odc9", "d1"));
        engine.create(&h, other).unwrap();
    }

    #[test]
    fn update_and_validation() {
        let (_store, mut engine) = engine_with(StaticCapabilities::new());
        let h = candidate();
        engine.create(&h, Entity::new(ObjectKey::vtn("T1"))).unwrap();
        engine.create(&h, vbr("T1", "B1")).unwrap();
        let mut config = ValueBlock::new(3);
        config.set(attrs::vbr::DESCRIPTION, "edge").unwrap();
        engine
            .update(&h, Entity::new(ObjectKey::vbridge("T1", "B1")).with_config(config))
            .unwrap();
        let read = engine.read(&h, &ObjectKey::vbridge("T1", "B1")).unwrap();
        assert_eq!(
            read.config_value(attrs::vbr::DESCRIPTION),
            Some(&FieldValue::text("edge"))
        );
        let mut bad = ValueBlock::new(3);
        bad.set(attrs::vbr::HOST_ADDR_PREFIXLEN, 24u8).unwrap();
        assert!(matches!(
            engine.update(&h, Entity::new(ObjectKey::vbridge("T1", "B1")).with_config(bad)),
            Err(UpllError::CfgSemantic(_))
        ));
        assert_eq!(
            engine.update(&h, vbr("T1", "B9")),
            Err(UpllError::NoSuchInstance)
        );
    }

    #[test]
    fn sibling_reads() {
        let (_store, mut engine) = engine_with(StaticCapabilities::new());
        let h = candidate();
        engine.create(&h, Entity::new(ObjectKey::vtn("T1"))).unwrap();
        for name in ["B1", "B2", "B3"] {
            engine.create(&h, vbr("T1", name)).unwrap();
        }
        engine.create(&h, Entity::new(ObjectKey::vtn("T2"))).unwrap();
        engine.create(&h, vbr("T2", "B0")).unwrap();
        let names = |entities: Vec<Entity>| -> Vec<String> {
            entities.iter().filter_map(|e| e.key.name()).collect()
        };
        let first = ObjectKey::vbridge("T1", "B1");
        assert_eq!(names(engine.read_sibling(&h, &first).unwrap()), vec!["B2", "B3"]);
        assert_eq!(
            names(engine.read_sibling_begin(&h, &first).unwrap()),
            vec!["B1", "B2", "B3"]
        );
        assert_eq!(engine.read_sibling_count(&h, &first).unwrap(), 3);
        let last = ObjectKey::vbridge("T1", "B3");
        assert!(engine.read_sibling(&h, &last).unwrap().is_empty());
    }

    #[test]
    fn sibling_reads_are_capped() {
        let schemas = Arc::new(SchemaRegistry::builtin().unwrap());
        let store = Arc::new(MemStore::new(schemas));
        let params = crate::params::EngineParamsBuilder::default()
            .max_read_records(2usize)
            .build()
            .unwrap();
        let mut engine = ConfigEngine::new(
            params,
            store,
            Arc::new(StaticCapabilities::new()),
            Arc::new(StaticControllerRegistry::new()),
            Arc::new(RecordingAlarmSink::new()),
        )
        .unwrap();
        let h = candidate();
        engine.create(&h, Entity::new(ObjectKey::vtn("T1"))).unwrap();
        for name in ["B1", "B2", "B3"] {
            engine.create(&h, vbr("T1", name)).unwrap();
        }
        let pattern = ObjectKey::vbridge("T1", "B1");
        assert_eq!(engine.read_sibling_begin(&h, &pattern).unwrap().len(), 2);
        assert_eq!(engine.read_sibling_count(&h, &pattern).unwrap(), 3);
    }

    #[test]
    fn unified_bindings_get_a_gvtnid() {
        let (_store, mut engine) = engine_with(StaticCapabilities::new());
        let h = candidate();
        engine.create(&h, Entity::new(ObjectKey::vtn("T1"))).unwrap();
        let binding = |name: &str| {
            Entity::new(ObjectKey::vtn_unified("T1", name))
                .with_scope(ScopeData::new("spine", "D1"))
        };
        engine.create(&h, binding("U1")).unwrap();
        let read = engine.read(&h, &ObjectKey::vtn_unified("T1", "U1")).unwrap();
        let label = read
            .config_value(attrs::vtn_unified::LABEL)
            .and_then(FieldValue::as_u32)
            .unwrap();
        assert!(label >= Label::MIN);
        let scope = idalloc::PoolScope::controller_domain("spine", "D1");
        assert_eq!(engine.pools_mut().allocated_count(PoolKind::Gvtnid, &scope).unwrap(), 1);

        // the label goes pending with its owner
        engine.delete(&h, &ObjectKey::vtn_unified("T1", "U1")).unwrap();
        assert_eq!(engine.pools_mut().allocated_count(PoolKind::Gvtnid, &scope).unwrap(), 0);
    }

    #[test]
    fn converted_bridges_are_labelled() {
        let (store, mut engine) = engine_with(StaticCapabilities::new());
        let h = candidate();
        engine.create(&h, Entity::new(ObjectKey::vtn("T1"))).unwrap();
        engine.create(&h, vbr("T1", "B1")).unwrap();
        let key = ObjectKey::vbridge("T1", "B1");
        let label = engine.create_converted(&h, &key, "pfc1", "d2").unwrap();
        let schema = engine.schemas.get(ObjectType::Vbridge, TableKind::Convert).unwrap();
        let rows = store.rows(DatastoreVersion::Candidate, &schema);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get(&Slot::Config(attrs::vbr_convert::LABEL)),
            Some(&FieldValue::U32(label.as_u32()))
        );
        // a second copy at the same place is refused and its label given back
        let pool = idalloc::PoolScope::tenant("T1");
        assert_eq!(
            engine.create_converted(&h, &key, "pfc1", "d2"),
            Err(UpllError::InstanceExists)
        );
        assert_eq!(engine.pools_mut().allocated_count(PoolKind::Vbid, &pool).unwrap(), 1);
        assert!(matches!(
            engine.create_converted(&h, &ObjectKey::vbridge("T1", "B9"), "pfc1", "d2"),
            Err(UpllError::ParentDoesNotExist(_))
        ));
    }
}
