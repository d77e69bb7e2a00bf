// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use model::ObjectKey;
use std::fmt::Display;

/// Something that carries an aggregate status.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatusNode {
    Object(ObjectKey),
    /// The association of a tenant with one controller-domain: aggregates the vnodes of the
    /// tenant mapped to that controller-domain.
    TenantController {
        tenant: String,
        controller: String,
        domain: String,
    },
}

impl StatusNode {
    #[must_use]
    pub fn tenant_controller(tenant: &str, controller: &str, domain: &str) -> Self {
        StatusNode::TenantController {
            tenant: tenant.to_owned(),
            controller: controller.to_owned(),
            domain: domain.to_owned(),
        }
    }

    #[must_use]
    pub fn tenant(&self) -> Option<&str> {
        match self {
            StatusNode::Object(key) => key.tenant(),
            StatusNode::TenantController { tenant, .. } => Some(tenant),
        }
    }

    /// Tell if this node receives raw interface notifications, whose counter deltas are
    /// forwarded as is to the owner instead of travelling as edge events.
    #[must_use]
    pub fn is_port(&self) -> bool {
        matches!(self, StatusNode::Object(key) if key.otype().is_vnode_if())
    }
}

impl Display for StatusNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusNode::Object(key) => write!(f, "{key}"),
            StatusNode::TenantController {
                tenant,
                controller,
                domain,
            } => write!(f, "vtn_ctrlr {tenant}@{controller}/{domain}"),
        }
    }
}
