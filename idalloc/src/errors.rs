// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::geometry::{PoolKind, PoolScope};
use model::UpllError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocatorError {
    #[error("no free {kind} left for {scope}")]
    Exhausted { kind: PoolKind, scope: PoolScope },
    #[error("label {0} is not allocated")]
    NotAllocated(u32),
    #[error("label {0} is already allocated")]
    AlreadyAllocated(u32),
    #[error("label {0} is outside of the pool")]
    OutOfRange(u32),
    #[error("pool backend failure: {0}")]
    Backend(String),
}

impl From<AllocatorError> for UpllError {
    fn from(e: AllocatorError) -> Self {
        match e {
            AllocatorError::Exhausted { .. } => UpllError::ExceedsResourceLimit(e.to_string()),
            AllocatorError::NotAllocated(_) => UpllError::NoSuchInstance,
            AllocatorError::AlreadyAllocated(_) => UpllError::InstanceExists,
            AllocatorError::OutOfRange(_) => UpllError::Generic(e.to_string()),
            AllocatorError::Backend(msg) => UpllError::DbAccess(msg),
        }
    }
}

impl From<UpllError> for AllocatorError {
    fn from(e: UpllError) -> Self {
        AllocatorError::Backend(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mapping_onto_result_codes() {
        let e = AllocatorError::Exhausted {
            kind: PoolKind::Gvtnid,
            scope: PoolScope::controller_domain("spine", "d1"),
        };
        assert_eq!(
            UpllError::from(e),
            UpllError::ExceedsResourceLimit("no free gvtnid left for domain spine/d1".to_owned())
        );
        assert_eq!(
            UpllError::from(AllocatorError::NotAllocated(7)),
            UpllError::NoSuchInstance
        );
        assert!(matches!(
            UpllError::from(AllocatorError::Backend("down".to_owned())),
            UpllError::DbAccess(_)
        ));
    }
}
