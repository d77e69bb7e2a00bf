// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![allow(dead_code)]

use model::{ControllerType, DatastoreVersion, Entity, ObjectKey, SchemaRegistry, ScopeData};
use operstatus::{RecordingAlarmSink, StaticControllerRegistry};
use std::sync::Arc;
use store::mem::MemStore;
use upll_engine::{ConfigEngine, EngineParams, RequestHeader, StaticCapabilities};

pub struct Fixture {
    pub store: Arc<MemStore>,
    pub alarms: Arc<RecordingAlarmSink>,
    pub controllers: Arc<StaticControllerRegistry>,
    pub engine: ConfigEngine,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with(EngineParams::default(), StaticCapabilities::new())
    }

    pub fn with(params: EngineParams, capabilities: StaticCapabilities) -> Self {
        let schemas = Arc::new(SchemaRegistry::builtin().unwrap());
        let store = Arc::new(MemStore::new(schemas));
        let alarms = Arc::new(RecordingAlarmSink::new());
        let controllers =
            Arc::new(StaticControllerRegistry::new().with("pfc1", ControllerType::Pfc));
        let engine = ConfigEngine::new(
            params,
            store.clone(),
            Arc::new(capabilities),
            controllers.clone(),
            alarms.clone(),
        )
        .unwrap();
        Self {
            store,
            alarms,
            controllers,
            engine,
        }
    }

    pub fn create(&mut self, entity: Entity) {
        self.engine.create(&candidate(), entity).unwrap();
    }

    pub fn commit(&mut self) -> upll_engine::CommitReport {
        self.engine.commit(&candidate()).unwrap()
    }
}

pub fn candidate() -> RequestHeader {
    RequestHeader::new(1, 1, DatastoreVersion::Candidate)
}

pub fn running() -> RequestHeader {
    RequestHeader::new(1, 1, DatastoreVersion::Running)
}

pub fn at(key: ObjectKey, controller: &str, domain: &str) -> Entity {
    Entity::new(key).with_scope(ScopeData::new(controller, domain))
}
