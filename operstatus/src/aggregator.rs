// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The status aggregation state machine.
//!
//! Every operation takes a *status path*: the node the operation is about, followed by its
//! ancestors up to the tenant, e.g. `[vbr_if, vbr, vtn_ctrlr, vtn]`. Ancestors that carry no
//! status stop the propagation.

use crate::collab::{AlarmSink, ControllerRegistry, PathFaultAction, StatusRepository};
use crate::event::{StatusEvent, apply, subtract};
use crate::node::StatusNode;
use model::{AbsentOk, AggregateStatus, DatastoreVersion, OperStatus, UpllResult};
use std::collections::BTreeSet;
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error, warn};

/// A change of derived status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub node: StatusNode,
    pub from: OperStatus,
    pub to: OperStatus,
}

pub struct Aggregator {
    repo: Arc<dyn StatusRepository>,
    alarms: Arc<dyn AlarmSink>,
    controllers: Arc<dyn ControllerRegistry>,
    /// Raised path-fault alarms, as (controller, domain, tenant).
    path_faults: BTreeSet<(String, String, String)>,
}

impl Aggregator {
    #[must_use]
    pub fn new(
        repo: Arc<dyn StatusRepository>,
        alarms: Arc<dyn AlarmSink>,
        controllers: Arc<dyn ControllerRegistry>,
    ) -> Self {
        Self {
            repo,
            alarms,
            controllers,
            path_faults: BTreeSet::new(),
        }
    }

    pub fn status(&self, node: &StatusNode) -> UpllResult<AggregateStatus> {
        self.repo.load(node)
    }

    /// Tell if a path-fault alarm is currently raised.
    #[must_use]
    pub fn path_fault_raised(&self, controller: &str, domain: &str, tenant: &str) -> bool {
        self.path_faults.contains(&(
            controller.to_owned(),
            domain.to_owned(),
            tenant.to_owned(),
        ))
    }

    /// Start tracking the first node of the path, and any untracked ancestor.
    ///
    /// With `stand_alone`, the node gets the stand-alone marker and the given status right
    /// away, and its parent learns about it.
    pub fn attach(
        &mut self,
        path: &[StatusNode],
        stand_alone: Option<OperStatus>,
    ) -> UpllResult<Vec<StatusChange>> {
        let mut changes = Vec::new();
        let Some(node) = path.first() else {
            return Ok(changes);
        };
        for ancestor in path.iter().skip(1) {
            if self.repo.load(ancestor).absent_ok()?.is_none() {
                debug!("Tracking status of {ancestor}");
                self.repo.store(ancestor, &AggregateStatus::uninit())?;
            }
        }
        // a node still at its creation default may be given its initial status
        if let Some(existing) = self.repo.load(node).absent_ok()? {
            if existing != AggregateStatus::uninit() || stand_alone.is_none() {
                debug!("Status of {node} already tracked");
                return Ok(changes);
            }
        }
        let status = match stand_alone {
            Some(st) => AggregateStatus::stand_alone(st),
            None => AggregateStatus::uninit(),
        };
        debug!("Tracking status of {node}: {}", status.oper_status);
        self.repo.store(node, &status)?;
        self.record(node, OperStatus::Uninit, status.oper_status, &mut changes)?;
        self.propagate(path, 0, OperStatus::Uninit, status.oper_status, &mut changes)?;
        Ok(changes)
    }

    /// Apply a notification to the first node of the path.
    ///
    /// Port events addressed to an interface are folded into the counters of the interface and
    /// of its owner. Changes of derived status then travel upwards as edge events.
    pub fn notify(
        &mut self,
        path: &[StatusNode],
        event: StatusEvent,
    ) -> UpllResult<Vec<StatusChange>> {
        let mut changes = Vec::new();
        let Some(node) = path.first() else {
            return Ok(changes);
        };
        debug!("{event} on {node}");
        let own = self.change(node, |st| apply(st, event))?;
        self.record(node, own.0, own.1, &mut changes)?;
        let (level, (from, to)) = match path.get(1) {
            Some(owner) if event.is_port_event() && node.is_port() => {
                let edge = self.change(owner, |st| apply(st, event))?;
                self.record(owner, edge.0, edge.1, &mut changes)?;
                (1, edge)
            }
            _ => (0, own),
        };
        self.propagate(path, level, from, to, &mut changes)?;
        if event == StatusEvent::ReConnect {
            for tc in path {
                self.recheck_path_fault(tc)?;
            }
        }
        Ok(changes)
    }

    /// Recompute the first node of the path from its counters.
    pub fn recompute(&mut self, path: &[StatusNode]) -> UpllResult<Vec<StatusChange>> {
        self.notify(path, StatusEvent::Commit)
    }

    /// Enter or leave the stand-alone mode. Leaving it resets the counters of the node, which
    /// must have no tracked children at that point.
    pub fn set_stand_alone(
        &mut self,
        path: &[StatusNode],
        stand_alone: Option<OperStatus>,
    ) -> UpllResult<Vec<StatusChange>> {
        let mut changes = Vec::new();
        let Some(node) = path.first() else {
            return Ok(changes);
        };
        let (from, to) = self.change(node, |st| {
            match stand_alone {
                Some(status) if !st.is_stand_alone() || st.oper_status != status => {
                    debug!("{node} is stand-alone, {status}");
                    *st = AggregateStatus::stand_alone(status);
                }
                None if st.is_stand_alone() => {
                    debug!("{node} is no longer stand-alone");
                    st.down_count = 0;
                    st.unknown_count = 0;
                    st.rederive();
                }
                _ => {}
            }
            st.oper_status
        })?;
        self.record(node, from, to, &mut changes)?;
        self.propagate(path, 0, from, to, &mut changes)?;
        Ok(changes)
    }

    /// Stop tracking the first node of the path and withdraw its contribution from its parent.
    ///
    /// Fails with `NoSuchInstance` if the node is not tracked.
    pub fn detach(&mut self, path: &[StatusNode]) -> UpllResult<Vec<StatusChange>> {
        let mut changes = Vec::new();
        let Some(node) = path.first() else {
            return Ok(changes);
        };
        let status = self.repo.load(node)?;
        self.repo.remove(node)?;
        debug!("Stopped tracking status of {node}");
        if let StatusNode::TenantController {
            tenant,
            controller,
            domain,
        } = node
        {
            if self.path_fault_raised(controller, domain, tenant) {
                self.path_fault(node, PathFaultAction::Clear)?;
            }
        }
        let Some(parent) = path.get(1) else {
            return Ok(changes);
        };
        let (down, unknown) = if node.is_port() {
            if status.is_stand_alone() {
                (0, 0)
            } else {
                (status.down_count, status.unknown_count)
            }
        } else {
            StatusEvent::edge_contribution(status.oper_status)
        };
        let Some((from, to)) = self
            .change(parent, |st| {
                subtract(st, down, unknown);
                st.rederive()
            })
            .absent_ok()?
        else {
            return Ok(changes);
        };
        self.record(parent, from, to, &mut changes)?;
        self.propagate(path, 1, from, to, &mut changes)?;
        Ok(changes)
    }

    //////////////////////////////////////////////////////////////////
    /// Internals
    //////////////////////////////////////////////////////////////////

    /// Load, modify and store the status of a node. Returns the status before and after.
    fn change(
        &self,
        node: &StatusNode,
        f: impl FnOnce(&mut AggregateStatus) -> OperStatus,
    ) -> UpllResult<(OperStatus, OperStatus)> {
        let mut status = self.repo.load(node).inspect_err(|e| {
            if !e.is_absent() {
                error!("Failed to load status of {node}: {e}");
            }
        })?;
        let from = status.oper_status;
        let to = f(&mut status);
        self.repo.store(node, &status)?;
        Ok((from, to))
    }

    /// Walk the path upwards from `level`, turning each status change into an edge event for
    /// the next ancestor.
    fn propagate(
        &mut self,
        path: &[StatusNode],
        level: usize,
        mut from: OperStatus,
        mut to: OperStatus,
        changes: &mut Vec<StatusChange>,
    ) -> UpllResult {
        for parent in path.iter().skip(level + 1) {
            let Some(event) = StatusEvent::for_edge(from, to) else {
                break;
            };
            let Some(edge) = self.change(parent, |st| apply(st, event)).absent_ok()? else {
                debug!("{parent} carries no status, stopping at {event}");
                break;
            };
            (from, to) = edge;
            self.record(parent, from, to, changes)?;
        }
        Ok(())
    }

    fn record(
        &mut self,
        node: &StatusNode,
        from: OperStatus,
        to: OperStatus,
        changes: &mut Vec<StatusChange>,
    ) -> UpllResult {
        if from == to {
            return Ok(());
        }
        debug!("{node}: {from} -> {to}");
        changes.push(StatusChange {
            node: node.clone(),
            from,
            to,
        });
        match node {
            StatusNode::Object(_) => {
                if from == OperStatus::Uninit && to == OperStatus::Up {
                    return Ok(());
                }
                if let Some(tenant) = node.tenant() {
                    self.alarms.send_oper_status_alarm(tenant, node, from, to)?;
                }
            }
            StatusNode::TenantController {
                tenant,
                controller,
                domain,
            } => match (from, to) {
                (_, OperStatus::Down) if !self.path_fault_raised(controller, domain, tenant) => {
                    self.path_fault(node, PathFaultAction::Raise)?;
                }
                (_, OperStatus::Up) if self.path_fault_raised(controller, domain, tenant) => {
                    self.path_fault(node, PathFaultAction::Clear)?;
                }
                _ => {}
            },
        }
        Ok(())
    }

    /// Ask the controller registry about the path of a tenant-controller node and align the
    /// raised alarms with it.
    fn recheck_path_fault(&mut self, node: &StatusNode) -> UpllResult {
        let StatusNode::TenantController {
            tenant,
            controller,
            domain,
        } = node
        else {
            return Ok(());
        };
        let faulty = self.controllers.path_fault(controller, domain)?;
        let raised = self.path_fault_raised(controller, domain, tenant);
        match (faulty, raised) {
            (true, false) => self.path_fault(node, PathFaultAction::Raise),
            (false, true) => self.path_fault(node, PathFaultAction::Clear),
            _ => Ok(()),
        }
    }

    fn path_fault(&mut self, node: &StatusNode, action: PathFaultAction) -> UpllResult {
        let StatusNode::TenantController {
            tenant,
            controller,
            domain,
        } = node
        else {
            return Ok(());
        };
        if self
            .controllers
            .get_controller_type(controller, DatastoreVersion::Running)
            .absent_ok()?
            .is_none()
        {
            debug!("Unknown controller {controller}, no path-fault alarm");
            return Ok(());
        }
        self.alarms
            .send_path_fault_alarm(controller, domain, tenant, action)?;
        let id = (controller.clone(), domain.clone(), tenant.clone());
        match action {
            PathFaultAction::Raise => self.path_faults.insert(id),
            PathFaultAction::Clear => self.path_faults.remove(&id),
        };
        debug!("Path fault {action} for {tenant} on {controller}/{domain}");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collab::{
        Alarm, MemStatusRepository, RecordingAlarmSink, StaticControllerRegistry,
    };
    use model::{ControllerType, ObjectKey, STAND_ALONE_SENTINEL, UpllError};
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    struct Fixture {
        agg: Aggregator,
        alarms: Arc<RecordingAlarmSink>,
        controllers: Arc<StaticControllerRegistry>,
    }

    fn fixture() -> Fixture {
        let alarms = Arc::new(RecordingAlarmSink::new());
        let controllers =
            Arc::new(StaticControllerRegistry::new().with("c1", ControllerType::Pfc));
        let agg = Aggregator::new(
            Arc::new(MemStatusRepository::new()),
            alarms.clone(),
            controllers.clone(),
        );
        Fixture {
            agg,
            alarms,
            controllers,
        }
    }

    fn vbr_path() -> Vec<StatusNode> {
        vec![
            StatusNode::Object(ObjectKey::vbridge("T1", "B1")),
            StatusNode::tenant_controller("T1", "c1", "d1"),
            StatusNode::Object(ObjectKey::vtn("T1")),
        ]
    }

    fn if_path(name: &str) -> Vec<StatusNode> {
        let mut path = vec![StatusNode::Object(ObjectKey::vbr_if("T1", "B1", name))];
        path.extend(vbr_path());
        path
    }

    fn status_of(agg: &Aggregator, node: &StatusNode) -> (OperStatus, u32, u32) {
        let st = agg.status(node).unwrap();
        (st.oper_status, st.down_count, st.unknown_count)
    }

    #[test]
    #[traced_test]
    fn bridge_lifecycle() {
        let Fixture { mut agg, alarms, .. } = fixture();
        let vbr = vbr_path();
        let tc = vbr[1].clone();
        let vtn = vbr[2].clone();

        agg.attach(&vbr, Some(OperStatus::Down)).unwrap();
        assert_eq!(
            status_of(&agg, &vbr[0]),
            (OperStatus::Down, STAND_ALONE_SENTINEL, 0)
        );
        assert_eq!(status_of(&agg, &tc), (OperStatus::Down, 1, 0));
        assert_eq!(status_of(&agg, &vtn), (OperStatus::Down, 1, 0));
        assert!(agg.path_fault_raised("c1", "d1", "T1"));

        // vlan-mapped: no longer stand-alone
        agg.set_stand_alone(&vbr, None).unwrap();
        assert_eq!(status_of(&agg, &vbr[0]), (OperStatus::Up, 0, 0));
        assert_eq!(status_of(&agg, &vtn).0, OperStatus::Up);
        assert!(!agg.path_fault_raised("c1", "d1", "T1"));

        let if1 = if_path("If1");
        agg.attach(&if1, None).unwrap();
        agg.notify(&if1, StatusEvent::PortFault).unwrap();
        assert_eq!(status_of(&agg, &vbr[0]), (OperStatus::Down, 1, 0));

        agg.notify(&if1, StatusEvent::PortUnknown).unwrap();
        assert_eq!(status_of(&agg, &vbr[0]), (OperStatus::Unknown, 1, 1));
        assert_eq!(status_of(&agg, &tc), (OperStatus::Unknown, 0, 1));

        agg.detach(&if1).unwrap();
        assert_eq!(status_of(&agg, &vbr[0]), (OperStatus::Up, 0, 0));
        assert_eq!(status_of(&agg, &vtn), (OperStatus::Up, 0, 0));

        let sent = alarms.take();
        assert!(sent.contains(&Alarm::OperStatus {
            tenant: "T1".to_owned(),
            object: vbr[0].clone(),
            from: OperStatus::Up,
            to: OperStatus::Down,
        }));
        assert!(sent.contains(&Alarm::PathFault {
            controller: "c1".to_owned(),
            domain: "d1".to_owned(),
            tenant: "T1".to_owned(),
            action: PathFaultAction::Clear,
        }));
        assert!(logs_contain("no longer stand-alone"));
    }

    #[test]
    fn two_interfaces() {
        let Fixture { mut agg, .. } = fixture();
        let vbr = vbr_path();
        agg.attach(&vbr, None).unwrap();
        let (a, b) = (if_path("A"), if_path("B"));
        agg.attach(&a, None).unwrap();
        agg.attach(&b, None).unwrap();
        agg.notify(&a, StatusEvent::PortFault).unwrap();
        agg.notify(&b, StatusEvent::PortFault).unwrap();
        assert_eq!(status_of(&agg, &vbr[0]), (OperStatus::Down, 2, 0));
        // the tenant-controller only sees the vbridge edge once
        assert_eq!(status_of(&agg, &vbr[1]), (OperStatus::Down, 1, 0));

        let changes = agg.notify(&a, StatusEvent::PortFaultReset).unwrap();
        assert_eq!(status_of(&agg, &vbr[0]), (OperStatus::Down, 1, 0));
        assert_eq!(changes.len(), 1, "only the interface changed: {changes:?}");

        agg.notify(&b, StatusEvent::PortFaultReset).unwrap();
        assert_eq!(status_of(&agg, &vbr[1]), (OperStatus::Up, 0, 0));
    }

    #[test]
    fn unknown_node() {
        let Fixture { mut agg, .. } = fixture();
        assert_eq!(
            agg.notify(&if_path("X"), StatusEvent::PortUp),
            Err(UpllError::NoSuchInstance)
        );
        assert_eq!(agg.detach(&if_path("X")), Err(UpllError::NoSuchInstance));
    }

    #[test]
    fn reconnect_aligns_path_faults() {
        let Fixture {
            mut agg,
            alarms,
            controllers,
        } = fixture();
        let vbr = vbr_path();
        agg.attach(&vbr, None).unwrap();
        agg.recompute(&vbr).unwrap();
        assert!(!agg.path_fault_raised("c1", "d1", "T1"));

        controllers.set_path_fault("c1", "d1", true);
        agg.notify(&vbr, StatusEvent::ReConnect).unwrap();
        assert!(agg.path_fault_raised("c1", "d1", "T1"));

        controllers.set_path_fault("c1", "d1", false);
        agg.notify(&vbr, StatusEvent::ReConnect).unwrap();
        assert!(!agg.path_fault_raised("c1", "d1", "T1"));
        let actions: Vec<_> = alarms
            .take()
            .into_iter()
            .filter_map(|a| match a {
                Alarm::PathFault { action, .. } => Some(action),
                Alarm::OperStatus { .. } => None,
            })
            .collect();
        assert_eq!(actions, vec![PathFaultAction::Raise, PathFaultAction::Clear]);
    }

    #[test]
    fn unknown_controller_gets_no_path_fault() {
        let Fixture { mut agg, alarms, .. } = fixture();
        let path = vec![
            StatusNode::Object(ObjectKey::vbridge("T1", "B9")),
            StatusNode::tenant_controller("T1", "c9", "d1"),
        ];
        agg.attach(&path, Some(OperStatus::Down)).unwrap();
        assert!(!agg.path_fault_raised("c9", "d1", "T1"));
        assert!(
            alarms
                .take()
                .iter()
                .all(|a| matches!(a, Alarm::OperStatus { .. }))
        );
    }
}
