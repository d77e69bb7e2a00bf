// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Result codes of the configuration engine.
//! Every operation of the engine returns an [`UpllResult`]. The transaction coordinator maps
//! the final [`UpllError`] onto a response code for the management client.

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UpllError {
    /// Precondition or programming error (ill-formed key, missing schema, ...). Never retried.
    #[error("Generic failure: {0}")]
    Generic(String),
    /// Expected absence. Callers probing for existence translate this into success.
    #[error("No such instance")]
    NoSuchInstance,
    #[error("Instance already exists")]
    InstanceExists,
    #[error("Database access failure: {0}")]
    DbAccess(String),
    #[error("Merge conflict: {0}")]
    MergeConflict(String),
    #[error("Resource limit exceeded: {0}")]
    ExceedsResourceLimit(String),
    #[error("Semantic check failed: {0}")]
    CfgSemantic(String),
    #[error("Parent does not exist: {0}")]
    ParentDoesNotExist(String),
}

impl UpllError {
    #[must_use]
    pub fn generic(msg: impl Into<String>) -> Self {
        UpllError::Generic(msg.into())
    }
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, UpllError::NoSuchInstance)
    }
}

/// Result-like type for the configuration engine
pub type UpllResult<T = ()> = Result<T, UpllError>;

/// Turn [`UpllError::NoSuchInstance`] into success, for call sites that use an operation as an
/// existence probe.
pub trait AbsentOk<T> {
    /// `Ok(Some(v))` on success, `Ok(None)` on [`UpllError::NoSuchInstance`], other errors as-is.
    fn absent_ok(self) -> UpllResult<Option<T>>;
}

impl<T> AbsentOk<T> for UpllResult<T> {
    fn absent_ok(self) -> UpllResult<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(UpllError::NoSuchInstance) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
