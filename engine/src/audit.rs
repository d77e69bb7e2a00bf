// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Audit: compare what RUNNING holds for a controller-domain with what the controller reported
//! into AUDIT.

use crate::diff::{DiffEntry, DiffRequest, collect};
use crate::engine::ConfigEngine;
use model::{DatastoreVersion, Entity, ObjectType, Operation, UpllResult};
#[allow(unused)]
use tracing::{debug, info};

/// Differences between RUNNING and a controller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// In RUNNING, not on the controller.
    pub missing: Vec<Entity>,
    /// On the controller, not in RUNNING.
    pub extra: Vec<Entity>,
    pub differing: Vec<DiffEntry>,
}

impl AuditReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.differing.is_empty()
    }
}

impl ConfigEngine {
    /// Audit the tables mapped to controller-domains against AUDIT. Nothing is written.
    pub fn audit(&self, controller: &str, domain: &str) -> UpllResult<AuditReport> {
        let mut report = AuditReport::default();
        for otype in ObjectType::hierarchy_order() {
            let mut tables = vec![self.main_schema(otype)?];
            tables.extend(self.schemas.aux_tables(otype));
            for schema in tables.into_iter().filter(|s| s.is_scoped()) {
                let request = |op| {
                    DiffRequest::new(
                        op,
                        DatastoreVersion::Running,
                        DatastoreVersion::Audit,
                        schema.clone(),
                    )
                    .scoped(controller, domain)
                    .with_params(&self.params)
                };
                let store = self.store.as_ref();
                report.missing.extend(
                    collect(store, &request(Operation::Create))?
                        .into_iter()
                        .filter_map(|e| e.new),
                );
                report.extra.extend(
                    collect(store, &request(Operation::Delete))?
                        .into_iter()
                        .filter_map(|e| e.old),
                );
                report
                    .differing
                    .extend(collect(store, &request(Operation::Update))?);
            }
        }
        info!(
            "Audit of {controller}/{domain}: {} missing, {} extra, {} differing",
            report.missing.len(),
            report.extra.len(),
            report.differing.len()
        );
        Ok(report)
    }
}
