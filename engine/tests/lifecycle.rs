// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Edit, commit, abort and audit cycles.

mod common;

use common::{Fixture, at, candidate, running};
use idalloc::{PoolGeometry, PoolKind, PoolScope};
use model::schema::attrs;
use model::{
    ControllerType, DatastoreVersion, Entity, FieldValue, Label, ObjectKey, ObjectType,
    Operation, TableKind, UpllError, ValueBlock,
};
use pretty_assertions::assert_eq;
use std::net::Ipv4Addr;
use tracing_test::traced_test;
use upll_engine::{
    Capability, CapabilityKind, EngineParamsBuilder, RequestHeader, StaticCapabilities,
};

fn described(key: ObjectKey, text: &str) -> Entity {
    let mut config = ValueBlock::new(3);
    config.set(attrs::vbr::DESCRIPTION, text).unwrap();
    at(key, "pfc1", "d1").with_config(config)
}

#[test]
#[traced_test]
fn objects_need_a_parent() {
    let mut f = Fixture::new();
    assert!(matches!(
        f.engine
            .create(&candidate(), at(ObjectKey::vbridge("T1", "B1"), "pfc1", "d1")),
        Err(UpllError::ParentDoesNotExist(_))
    ));
    f.create(Entity::new(ObjectKey::vtn("T1")));
    assert!(matches!(
        f.engine
            .create(&candidate(), Entity::new(ObjectKey::vbr_if("T1", "B1", "If1"))),
        Err(UpllError::ParentDoesNotExist(_))
    ));
}

#[test]
#[traced_test]
fn commit_then_abort() {
    let mut f = Fixture::new();
    f.create(Entity::new(ObjectKey::vtn("T1")));
    f.create(described(ObjectKey::vbridge("T1", "B1"), "first"));
    let report = f.commit();
    assert_eq!(report.for_controller("pfc1", "d1").len(), 2);
    assert!(f.engine.read(&running(), &ObjectKey::vbridge("T1", "B1")).is_ok());
    assert!(f.commit().is_empty());

    // uncommitted edits go away on abort
    f.create(at(ObjectKey::vbridge("T1", "B2"), "pfc1", "d1"));
    f.engine
        .update(&candidate(), described(ObjectKey::vbridge("T1", "B1"), "second"))
        .unwrap();
    f.engine.abort(&candidate()).unwrap();
    assert_eq!(
        f.engine.read(&candidate(), &ObjectKey::vbridge("T1", "B2")),
        Err(UpllError::NoSuchInstance)
    );
    let b1 = f
        .engine
        .read(&candidate(), &ObjectKey::vbridge("T1", "B1"))
        .unwrap();
    assert_eq!(
        b1.config_value(attrs::vbr::DESCRIPTION)
            .and_then(FieldValue::as_str),
        Some("first")
    );
    assert!(f.commit().is_empty());
}

#[test]
fn deleting_a_tenant_cascades_through_commit() {
    let mut f = Fixture::new();
    f.create(Entity::new(ObjectKey::vtn("T1")));
    f.create(at(ObjectKey::vbridge("T1", "B1"), "pfc1", "d1"));
    f.create(Entity::new(ObjectKey::vbr_if("T1", "B1", "If1")));
    f.create(Entity::new(ObjectKey::vlan_map("T1", "B1", "lp1")));
    f.commit();

    let removed = f.engine.delete(&candidate(), &ObjectKey::vtn("T1")).unwrap();
    assert!(removed >= 4);
    assert_eq!(
        f.engine.delete(&candidate(), &ObjectKey::vtn("T1")),
        Err(UpllError::NoSuchInstance)
    );
    let report = f.commit();
    assert!(report.changes().all(|c| c.op == Operation::Delete));
    for key in [
        ObjectKey::vtn("T1"),
        ObjectKey::vbridge("T1", "B1"),
        ObjectKey::vbr_if("T1", "B1", "If1"),
        ObjectKey::vlan_map("T1", "B1", "lp1"),
    ] {
        assert_eq!(f.engine.read(&running(), &key), Err(UpllError::NoSuchInstance));
    }
}

#[test]
#[traced_test]
fn unsupported_attributes_are_reported_per_controller() {
    let caps = StaticCapabilities::new().with(
        CapabilityKind::Create,
        ControllerType::Pfc,
        ObjectType::Vbridge,
        Capability::full().supporting([attrs::vbr::DESCRIPTION]),
    );
    let mut f = Fixture::with(upll_engine::EngineParams::default(), caps);
    f.create(Entity::new(ObjectKey::vtn("T1")));
    let mut config = ValueBlock::new(3);
    config.set(attrs::vbr::DESCRIPTION, "bridge").unwrap();
    config
        .set(attrs::vbr::HOST_ADDR, Ipv4Addr::new(10, 0, 0, 1))
        .unwrap();
    config.set(attrs::vbr::HOST_ADDR_PREFIXLEN, 24u8).unwrap();
    f.create(at(ObjectKey::vbridge("T1", "B1"), "pfc1", "d1").with_config(config));

    let report = f.commit();
    let vbr = report
        .for_controller("pfc1", "d1")
        .iter()
        .find(|c| c.entity.key == ObjectKey::vbridge("T1", "B1") && c.kind == TableKind::Main)
        .unwrap();
    assert_eq!(vbr.op, Operation::Create);
    assert_eq!(
        vbr.filtered,
        vec![attrs::vbr::HOST_ADDR, attrs::vbr::HOST_ADDR_PREFIXLEN]
    );
    let committed = f
        .engine
        .read(&running(), &ObjectKey::vbridge("T1", "B1"))
        .unwrap();
    assert_eq!(
        committed
            .config_value(attrs::vbr::DESCRIPTION)
            .and_then(FieldValue::as_str),
        Some("bridge")
    );
    assert_eq!(committed.config_value(attrs::vbr::HOST_ADDR), None);
}

#[test]
fn instance_limits_apply_per_controller_domain() {
    let caps = StaticCapabilities::new().with(
        CapabilityKind::Create,
        ControllerType::Pfc,
        ObjectType::Vbridge,
        Capability::full().with_max_instances(1),
    );
    let mut f = Fixture::with(upll_engine::EngineParams::default(), caps);
    f.create(Entity::new(ObjectKey::vtn("T1")));
    f.create(at(ObjectKey::vbridge("T1", "B1"), "pfc1", "d1"));
    assert!(matches!(
        f.engine
            .create(&candidate(), at(ObjectKey::vbridge("T1", "B2"), "pfc1", "d1")),
        Err(UpllError::ExceedsResourceLimit(_))
    ));
    f.create(at(ObjectKey::vbridge("T1", "B2"), "pfc1", "d2"));
    // unregistered controllers are not limited
    f.create(at(ObjectKey::vbridge("T1", "B3"), "odc9", "d1"));
    f.create(at(ObjectKey::vbridge("T1", "B4"), "odc9", "d1"));
}

#[test]
fn unified_bindings_exhaust_their_gvtnid_pool() {
    let small = PoolGeometry {
        bits: 40,
        rows: 2,
        bucket_rows: Some(1),
    };
    let params = EngineParamsBuilder::default()
        .gvtnid_pool(small)
        .build()
        .unwrap();
    let mut f = Fixture::with(params, StaticCapabilities::new());
    f.create(Entity::new(ObjectKey::vtn("T1")));
    let binding =
        |i: u32| at(ObjectKey::vtn_unified("T1", &format!("U{i}")), "spine", "D1");
    for i in 0..40 {
        f.create(binding(i));
    }
    assert!(matches!(
        f.engine.create(&candidate(), binding(40)),
        Err(UpllError::ExceedsResourceLimit(_))
    ));
    // no row was left behind by the failed create
    assert_eq!(
        f.engine
            .read(&candidate(), &ObjectKey::vtn_unified("T1", "U40")),
        Err(UpllError::NoSuchInstance)
    );
    // another controller-domain draws from its own pool
    f.create(at(ObjectKey::vtn_unified("T1", "U40"), "spine", "D2"));

    let scope = PoolScope::controller_domain("spine", "D1");
    assert_eq!(
        f.engine
            .pools_mut()
            .allocated_count(PoolKind::Gvtnid, &scope)
            .unwrap(),
        40
    );
    f.engine
        .delete(&candidate(), &ObjectKey::vtn_unified("T1", "U0"))
        .unwrap();
    // never committed, so its label is free at once
    f.create(binding(41));
}

fn fenced(tenant: &str) -> RequestHeader {
    RequestHeader::new(2, 2, DatastoreVersion::Candidate).fenced(tenant)
}

fn gvtnid(f: &Fixture, key: &ObjectKey) -> Label {
    let raw = f
        .engine
        .read(&candidate(), key)
        .unwrap()
        .config_value(attrs::vtn_unified::LABEL)
        .and_then(FieldValue::as_u32)
        .unwrap();
    Label::new_checked(raw).unwrap()
}

#[test]
#[traced_test]
fn fenced_transactions_keep_to_their_tenant_labels() {
    let mut f = Fixture::new();
    let d1 = PoolScope::controller_domain("spine", "D1");
    let unified = |tenant: &str, name: &str| {
        at(ObjectKey::vtn_unified(tenant, name), "spine", "D1")
    };
    f.create(Entity::new(ObjectKey::vtn("T1")));
    f.create(Entity::new(ObjectKey::vtn("T2")));
    f.create(unified("T2", "U9"));
    f.commit();
    let committed = gvtnid(&f, &ObjectKey::vtn_unified("T2", "U9"));

    // T2 keeps an uncommitted binding and deletes a committed one
    f.engine.create(&fenced("T2"), unified("T2", "U2")).unwrap();
    let held = gvtnid(&f, &ObjectKey::vtn_unified("T2", "U2"));
    f.engine
        .delete(&fenced("T2"), &ObjectKey::vtn_unified("T2", "U9"))
        .unwrap();

    // T1 edits the same pool and aborts
    f.engine.create(&fenced("T1"), unified("T1", "U1")).unwrap();
    let dropped = gvtnid(&f, &ObjectKey::vtn_unified("T1", "U1"));
    f.engine.abort(&fenced("T1")).unwrap();
    let pools = f.engine.pools_mut();
    assert!(!pools.is_allocated(PoolKind::Gvtnid, &d1, dropped).unwrap());
    assert!(pools.is_allocated(PoolKind::Gvtnid, &d1, held).unwrap());
    assert_eq!(pools.pending(PoolKind::Gvtnid, &d1).len(), 1);

    // T1 commits: later bindings never take the labels T2 holds or may take back
    f.engine.create(&fenced("T1"), unified("T1", "U1")).unwrap();
    let kept = gvtnid(&f, &ObjectKey::vtn_unified("T1", "U1"));
    assert_ne!(kept, held);
    f.engine.commit(&fenced("T1")).unwrap();
    f.engine.create(&fenced("T1"), unified("T1", "U3")).unwrap();
    let later = gvtnid(&f, &ObjectKey::vtn_unified("T1", "U3"));
    assert!(![held, committed].contains(&later));

    // the binding T2 deleted gets its own label back
    f.engine.create(&fenced("T2"), unified("T2", "U9")).unwrap();
    assert_eq!(gvtnid(&f, &ObjectKey::vtn_unified("T2", "U9")), committed);

    // T2 aborts: only its own allocation goes
    f.engine.abort(&fenced("T2")).unwrap();
    let pools = f.engine.pools_mut();
    assert!(!pools.is_allocated(PoolKind::Gvtnid, &d1, held).unwrap());
    assert!(pools.is_allocated(PoolKind::Gvtnid, &d1, committed).unwrap());
    assert!(pools.is_allocated(PoolKind::Gvtnid, &d1, kept).unwrap());
    assert!(pools.is_allocated(PoolKind::Gvtnid, &d1, later).unwrap());
}

#[test]
#[traced_test]
fn audit_reports_drift() {
    let mut f = Fixture::new();
    f.create(Entity::new(ObjectKey::vtn("T1")));
    f.create(described(ObjectKey::vbridge("T1", "B1"), "bridge"));
    f.create(Entity::new(ObjectKey::vlan_map("T1", "B1", "lp1")));
    f.commit();

    f.store
        .clone_datastore(DatastoreVersion::Running, DatastoreVersion::Audit);
    assert!(f.engine.audit("pfc1", "d1").unwrap().is_clean());

    let audit = RequestHeader::new(1, 1, DatastoreVersion::Audit);
    f.engine
        .delete(&audit, &ObjectKey::vlan_map("T1", "B1", "lp1"))
        .unwrap();
    f.engine
        .update(&audit, described(ObjectKey::vbridge("T1", "B1"), "drifted"))
        .unwrap();
    let report = f.engine.audit("pfc1", "d1").unwrap();
    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].key, ObjectKey::vlan_map("T1", "B1", "lp1"));
    assert!(report.extra.is_empty());
    assert_eq!(report.differing.len(), 1);
    assert_eq!(
        report.differing[0].new.as_ref().map(|e| e.key.clone()),
        Some(ObjectKey::vbridge("T1", "B1"))
    );

    // other controller-domains are not concerned
    assert!(f.engine.audit("pfc1", "d2").unwrap().is_clean());
}
