// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Collaborators of the aggregator, and in-memory implementations of them.

use crate::node::StatusNode;
use model::{AggregateStatus, ControllerType, DatastoreVersion, OperStatus, UpllError, UpllResult};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum PathFaultAction {
    #[strum(serialize = "raise")]
    Raise,
    #[strum(serialize = "clear")]
    Clear,
}

/// Receiver of the alarms emitted on status edges.
pub trait AlarmSink: Send + Sync {
    fn send_oper_status_alarm(
        &self,
        tenant: &str,
        object: &StatusNode,
        from: OperStatus,
        to: OperStatus,
    ) -> UpllResult;

    fn send_path_fault_alarm(
        &self,
        controller: &str,
        domain: &str,
        tenant: &str,
        action: PathFaultAction,
    ) -> UpllResult;
}

/// Lookup of the physical controllers known to the system.
pub trait ControllerRegistry: Send + Sync {
    /// Fails with [`UpllError::NoSuchInstance`] for an unknown controller.
    fn get_controller_type(
        &self,
        controller: &str,
        datastore: DatastoreVersion,
    ) -> UpllResult<ControllerType>;

    /// Tell if the path to a controller-domain is currently faulty.
    fn path_fault(&self, controller: &str, domain: &str) -> UpllResult<bool>;
}

/// Storage of aggregate statuses.
pub trait StatusRepository: Send + Sync {
    /// Fails with [`UpllError::NoSuchInstance`] if the node carries no status.
    fn load(&self, node: &StatusNode) -> UpllResult<AggregateStatus>;
    fn store(&self, node: &StatusNode, status: &AggregateStatus) -> UpllResult;
    /// Fails with [`UpllError::NoSuchInstance`] if the node carries no status.
    fn remove(&self, node: &StatusNode) -> UpllResult;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Alarm {
    OperStatus {
        tenant: String,
        object: StatusNode,
        from: OperStatus,
        to: OperStatus,
    },
    PathFault {
        controller: String,
        domain: String,
        tenant: String,
        action: PathFaultAction,
    },
}

/// An [`AlarmSink`] that keeps what it receives.
#[derive(Debug, Default)]
pub struct RecordingAlarmSink {
    alarms: Mutex<Vec<Alarm>>,
}

impl RecordingAlarmSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the received alarms.
    #[must_use]
    pub fn take(&self) -> Vec<Alarm> {
        std::mem::take(&mut *self.alarms.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl AlarmSink for RecordingAlarmSink {
    fn send_oper_status_alarm(
        &self,
        tenant: &str,
        object: &StatusNode,
        from: OperStatus,
        to: OperStatus,
    ) -> UpllResult {
        self.alarms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Alarm::OperStatus {
                tenant: tenant.to_owned(),
                object: object.clone(),
                from,
                to,
            });
        Ok(())
    }

    fn send_path_fault_alarm(
        &self,
        controller: &str,
        domain: &str,
        tenant: &str,
        action: PathFaultAction,
    ) -> UpllResult {
        self.alarms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Alarm::PathFault {
                controller: controller.to_owned(),
                domain: domain.to_owned(),
                tenant: tenant.to_owned(),
                action,
            });
        Ok(())
    }
}

/// A [`ControllerRegistry`] over a fixed set of controllers. The same controllers are
/// visible in every datastore.
#[derive(Debug, Default)]
pub struct StaticControllerRegistry {
    controllers: Mutex<BTreeMap<String, ControllerType>>,
    faults: Mutex<BTreeSet<(String, String)>>,
}

impl StaticControllerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(self, controller: &str, ctype: ControllerType) -> Self {
        self.add(controller, ctype);
        self
    }

    pub fn add(&self, controller: &str, ctype: ControllerType) {
        self.controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(controller.to_owned(), ctype);
    }

    pub fn set_path_fault(&self, controller: &str, domain: &str, faulty: bool) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        let id = (controller.to_owned(), domain.to_owned());
        if faulty {
            faults.insert(id);
        } else {
            faults.remove(&id);
        }
    }
}

impl ControllerRegistry for StaticControllerRegistry {
    fn get_controller_type(
        &self,
        controller: &str,
        _datastore: DatastoreVersion,
    ) -> UpllResult<ControllerType> {
        self.controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(controller)
            .copied()
            .ok_or(UpllError::NoSuchInstance)
    }

    fn path_fault(&self, controller: &str, domain: &str) -> UpllResult<bool> {
        let faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(faults.contains(&(controller.to_owned(), domain.to_owned())))
    }
}

#[derive(Debug, Default)]
pub struct MemStatusRepository {
    statuses: Mutex<BTreeMap<StatusNode, AggregateStatus>>,
}

impl MemStatusRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusRepository for MemStatusRepository {
    fn load(&self, node: &StatusNode) -> UpllResult<AggregateStatus> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node)
            .copied()
            .ok_or(UpllError::NoSuchInstance)
    }

    fn store(&self, node: &StatusNode, status: &AggregateStatus) -> UpllResult {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node.clone(), *status);
        Ok(())
    }

    fn remove(&self, node: &StatusNode) -> UpllResult {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(node)
            .map(|_| ())
            .ok_or(UpllError::NoSuchInstance)
    }
}
