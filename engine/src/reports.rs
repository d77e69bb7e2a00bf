// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Aggregate reports over the configuration.

use crate::engine::ConfigEngine;
use model::{DatastoreVersion, FieldValue, ObjectType, UpllResult};
use std::collections::BTreeMap;
#[allow(unused)]
use tracing::{debug, trace};

impl ConfigEngine {
    /// Number of vnodes mapped to each controller-domain in `dt`, for one tenant or all.
    pub fn vnode_count_by_domain(
        &self,
        dt: DatastoreVersion,
        tenant: Option<&str>,
    ) -> UpllResult<BTreeMap<(String, String), u64>> {
        let mut counts = BTreeMap::new();
        let params: Vec<FieldValue> = tenant.map(FieldValue::text).into_iter().collect();
        for otype in ObjectType::hierarchy_order()
            .into_iter()
            .filter(|t| t.is_vnode())
        {
            let schema = self.main_schema(otype)?;
            let filter = if tenant.is_some() {
                " WHERE vtn_name = ?"
            } else {
                ""
            };
            let text = format!(
                "SELECT ctrlr_name, domain_id, COUNT(*) FROM {}{filter} GROUP BY ctrlr_name, domain_id",
                schema.table_name(dt)
            );
            let mut cursor = self.store.execute_raw_query(&text, &params)?;
            while let Some(group) = cursor.next_row()? {
                let (Some(c), Some(d), Some(n)) = (
                    group.first().and_then(FieldValue::as_str),
                    group.get(1).and_then(FieldValue::as_str),
                    group.get(2).and_then(FieldValue::as_u64),
                ) else {
                    continue;
                };
                *counts.entry((c.to_owned(), d.to_owned())).or_default() += n;
            }
            trace!("Counted {otype} of {}", schema.table_name(dt));
        }
        debug!("vnodes by controller-domain in {dt}: {counts:?}");
        Ok(counts)
    }
}

#[cfg(test)]
mod test {
    use crate::capability::StaticCapabilities;
    use crate::engine::{ConfigEngine, RequestHeader};
    use crate::params::EngineParams;
    use model::{
        DatastoreVersion, Entity, ObjectKey, SchemaRegistry, ScopeData, UpllError,
    };
    use operstatus::{RecordingAlarmSink, StaticControllerRegistry};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use store::mem::MemStore;

    fn at(key: ObjectKey, controller: &str, domain: &str) -> Entity {
        Entity::new(key).with_scope(ScopeData::new(controller, domain))
    }

    #[test]
    fn vnodes_by_controller_domain() {
        let schemas = Arc::new(SchemaRegistry::builtin().unwrap());
        let store = Arc::new(MemStore::new(schemas));
        let mut engine = ConfigEngine::new(
            EngineParams::default(),
            store.clone(),
            Arc::new(StaticCapabilities::new()),
            Arc::new(StaticControllerRegistry::new()),
            Arc::new(RecordingAlarmSink::new()),
        )
        .unwrap();
        let h = RequestHeader::new(1, 1, DatastoreVersion::Candidate);
        for vtn in ["T1", "T2"] {
            engine.create(&h, Entity::new(ObjectKey::vtn(vtn))).unwrap();
        }
        engine.create(&h, at(ObjectKey::vbridge("T1", "B1"), "c1", "d1")).unwrap();
        engine.create(&h, at(ObjectKey::vrouter("T1", "R1"), "c1", "d1")).unwrap();
        engine.create(&h, at(ObjectKey::vbridge("T1", "B2"), "c2", "d1")).unwrap();
        engine.create(&h, at(ObjectKey::vbridge("T2", "B1"), "c1", "d1")).unwrap();

        let all = engine
            .vnode_count_by_domain(DatastoreVersion::Candidate, None)
            .unwrap();
        let expected: BTreeMap<(String, String), u64> = [
            (("c1".to_owned(), "d1".to_owned()), 3),
            (("c2".to_owned(), "d1".to_owned()), 1),
        ]
        .into();
        assert_eq!(all, expected);

        let t2 = engine
            .vnode_count_by_domain(DatastoreVersion::Candidate, Some("T2"))
            .unwrap();
        assert_eq!(t2.get(&("c1".to_owned(), "d1".to_owned())), Some(&1));
        assert_eq!(t2.len(), 1);
        assert!(engine
            .vnode_count_by_domain(DatastoreVersion::Running, None)
            .unwrap()
            .is_empty());
        assert_eq!(store.open_cursors(), 0);
    }

    #[test]
    fn cursors_are_released_on_failure() {
        let schemas = Arc::new(SchemaRegistry::builtin().unwrap());
        let store = Arc::new(MemStore::new(schemas));
        let engine = ConfigEngine::new(
            EngineParams::default(),
            store.clone(),
            Arc::new(StaticCapabilities::new()),
            Arc::new(StaticControllerRegistry::new()),
            Arc::new(RecordingAlarmSink::new()),
        )
        .unwrap();
        store.fail_after(2);
        assert!(matches!(
            engine.vnode_count_by_domain(DatastoreVersion::Candidate, None),
            Err(UpllError::DbAccess(_))
        ));
        assert_eq!(store.open_cursors(), 0);
    }
}
