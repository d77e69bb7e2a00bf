// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Datastore versions, configuration scopes and request operations.

use crate::key::ObjectKey;
use strum::{Display, EnumIter};

/// A distinct snapshot of the configuration.
#[derive(Clone, Copy, Debug, Display, EnumIter, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DatastoreVersion {
    #[strum(serialize = "candidate")]
    Candidate,
    #[strum(serialize = "running")]
    Running,
    #[strum(serialize = "startup")]
    Startup,
    /// Read projection of [`DatastoreVersion::Running`] for operational attributes.
    #[strum(serialize = "state")]
    State,
    #[strum(serialize = "import")]
    Import,
    #[strum(serialize = "audit")]
    Audit,
}

impl DatastoreVersion {
    /// The version that physically holds the rows of this version.
    /// STATE has no storage of its own.
    #[must_use]
    pub fn storage(self) -> DatastoreVersion {
        match self {
            DatastoreVersion::State => DatastoreVersion::Running,
            other => other,
        }
    }

    /// Prefix of table names in this version, as used in raw queries.
    #[must_use]
    pub fn table_prefix(self) -> &'static str {
        match self.storage() {
            DatastoreVersion::Candidate => "ca",
            DatastoreVersion::Startup => "su",
            DatastoreVersion::Import => "im",
            DatastoreVersion::Audit => "au",
            DatastoreVersion::Running | DatastoreVersion::State => "ru",
        }
    }

    /// Tell if rows of this version carry the changed flag maintained by the write path.
    #[must_use]
    pub fn tracks_changes(self) -> bool {
        matches!(self, DatastoreVersion::Candidate | DatastoreVersion::Import)
    }
}

/// Whether a write touches the whole CANDIDATE datastore or is fenced to one tenant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConfigScope {
    #[default]
    Global,
    PerTenant(String),
}

impl ConfigScope {
    /// Tell if an object key lies within this scope.
    /// Global objects (flow-lists, policing profiles) are outside any tenant scope.
    #[must_use]
    pub fn admits(&self, key: &ObjectKey) -> bool {
        match self {
            ConfigScope::Global => true,
            ConfigScope::PerTenant(tenant) => key.tenant() == Some(tenant.as_str()),
        }
    }

    #[must_use]
    pub fn tenant(&self) -> Option<&str> {
        match self {
            ConfigScope::Global => None,
            ConfigScope::PerTenant(tenant) => Some(tenant.as_str()),
        }
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Read,
    ReadSibling,
    ReadSiblingBegin,
    ReadSiblingCount,
}

impl Operation {
    #[must_use]
    pub fn is_read(self) -> bool {
        matches!(
            self,
            Operation::Read
                | Operation::ReadSibling
                | Operation::ReadSiblingBegin
                | Operation::ReadSiblingCount
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::key::ObjectKey;
    use strum::IntoEnumIterator;

    #[test]
    fn state_is_stored_in_running() {
        assert_eq!(DatastoreVersion::State.storage(), DatastoreVersion::Running);
        assert_eq!(
            DatastoreVersion::State.table_prefix(),
            DatastoreVersion::Running.table_prefix()
        );
        let prefixes: std::collections::BTreeSet<_> =
            DatastoreVersion::iter().map(DatastoreVersion::table_prefix).collect();
        assert_eq!(prefixes.len(), 5);
    }

    #[test]
    fn tenant_scope_fences_keys() {
        let scope = ConfigScope::PerTenant("T1".to_owned());
        assert!(scope.admits(&ObjectKey::vbridge("T1", "B1")));
        assert!(!scope.admits(&ObjectKey::vbridge("T2", "B1")));
        assert!(!scope.admits(&ObjectKey::flowlist("FL1")));
        assert!(ConfigScope::Global.admits(&ObjectKey::flowlist("FL1")));
    }
}
