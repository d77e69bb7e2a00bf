// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Identifier pools with transaction-scoped pending deletes.

use crate::backend::PoolBackend;
use crate::bitmap::LabelBitmap;
use crate::errors::AllocatorError;
use crate::geometry::{LabelOwner, LabelRange, PoolGeometry, PoolKind, PoolScope};
use crate::strategy::{AscendingRows, BucketRoundRobin, PoolCursor, SearchStrategy};
use model::{ConfigScope, Label};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error, warn};

type PoolId = (PoolKind, PoolScope);

#[derive(Debug)]
struct Pool {
    bitmap: LabelBitmap,
    cursor: PoolCursor,
}

/// A label freed by the current transaction, still reserved for its former owner.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PendingDelete {
    label: Label,
    owner: LabelOwner,
}

/// A label handed out by the current transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Allocation {
    id: PoolId,
    label: Label,
    owner: LabelOwner,
}

fn strategy(kind: PoolKind) -> &'static dyn SearchStrategy {
    match kind {
        PoolKind::Vbid => &AscendingRows,
        PoolKind::Gvtnid => &BucketRoundRobin,
    }
}

fn persist(
    backend: &dyn PoolBackend,
    id: &PoolId,
    pool: &Pool,
    row: u32,
) -> Result<(), AllocatorError> {
    backend
        .store_row(id.0, &id.1, row, pool.bitmap.row(row))
        .map_err(|e| {
            error!("Failed to persist row {row} of {} pool of {}: {e}", id.0, id.1);
            AllocatorError::from(e)
        })
}

/// Set a label and write its row back. The bit is cleared again if the write fails.
fn set_persisted(
    backend: &dyn PoolBackend,
    id: &PoolId,
    pool: &mut Pool,
    label: Label,
) -> Result<u32, AllocatorError> {
    let row = pool.bitmap.set(label)?;
    if let Err(e) = persist(backend, id, pool, row) {
        if pool.bitmap.clear(label).is_err() {
            warn!("Could not undo {} {label} of {}", id.0, id.1);
        }
        return Err(e);
    }
    Ok(row)
}

/// All identifier pools of the engine.
///
/// Pools are loaded from the backend on first use. Every bit change is written back to the
/// backend right away; the pending-delete shadow and the labels allocated by the open
/// transactions only live here, until [`IdPools::finalize`] or [`IdPools::abort`]. Both settle
/// the entries whose owner lies within the scope of the transaction, so transactions fenced
/// to different tenants do not settle each other's labels.
pub struct IdPools {
    vbid: PoolGeometry,
    gvtnid: PoolGeometry,
    backend: Arc<dyn PoolBackend>,
    pools: BTreeMap<PoolId, Pool>,
    pending: BTreeMap<PoolId, Vec<PendingDelete>>,
    allocated: Vec<Allocation>,
}

impl IdPools {
    #[must_use]
    pub fn new(backend: Arc<dyn PoolBackend>, vbid: PoolGeometry, gvtnid: PoolGeometry) -> Self {
        Self {
            vbid,
            gvtnid,
            backend,
            pools: BTreeMap::new(),
            pending: BTreeMap::new(),
            allocated: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_defaults(backend: Arc<dyn PoolBackend>) -> Self {
        Self::new(backend, PoolGeometry::vbid(), PoolGeometry::gvtnid())
    }

    #[must_use]
    pub fn geometry(&self, kind: PoolKind) -> PoolGeometry {
        match kind {
            PoolKind::Vbid => self.vbid,
            PoolKind::Gvtnid => self.gvtnid,
        }
    }

    fn pool_mut(&mut self, id: &PoolId) -> Result<&mut Pool, AllocatorError> {
        let geometry = self.geometry(id.0);
        match self.pools.entry(id.clone()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let mut bitmap = LabelBitmap::new(geometry);
                for (row, bits) in self.backend.load_rows(id.0, &id.1)? {
                    if !bitmap.load_row(row, bits) {
                        warn!("Ignoring stored row {row} of {} pool of {}", id.0, id.1);
                    }
                }
                debug!(
                    "Loaded {} pool of {}: {} labels in use",
                    id.0,
                    id.1,
                    bitmap.count()
                );
                Ok(e.insert(Pool {
                    bitmap,
                    cursor: PoolCursor::default(),
                }))
            }
        }
    }

    //////////////////////////////////////////////////////////////////
    /// Allocation
    //////////////////////////////////////////////////////////////////

    /// Allocate a label for `owner` from the pool of `kind` in `scope`, within `ranges` (the
    /// whole pool when empty).
    ///
    /// A label the same owner gave up earlier in this transaction is handed back to it. Labels
    /// pending deletion are never handed to anybody else.
    pub fn allocate(
        &mut self,
        kind: PoolKind,
        scope: &PoolScope,
        owner: &LabelOwner,
        ranges: &[LabelRange],
    ) -> Result<Label, AllocatorError> {
        let id = (kind, scope.clone());
        let ranges = if ranges.is_empty() {
            vec![self.geometry(kind).full_range()]
        } else {
            ranges.iter().filter(|r| !r.is_empty()).copied().collect()
        };

        // the shadow entry only goes once the label is set again
        let reclaimed = self.pending.get(&id).and_then(|shadow| {
            shadow
                .iter()
                .enumerate()
                .find(|(_, p)| p.owner == *owner && ranges.iter().any(|r| r.contains(p.label)))
                .map(|(pos, p)| (pos, p.label))
        });

        let reserved: Vec<Label> = self
            .pending
            .get(&id)
            .map(|shadow| shadow.iter().map(|p| p.label).collect())
            .unwrap_or_default();

        let backend = Arc::clone(&self.backend);
        let pool = self.pool_mut(&id)?;

        if let Some((pos, label)) = reclaimed {
            set_persisted(backend.as_ref(), &id, pool, label)?;
            if let Some(shadow) = self.pending.get_mut(&id) {
                shadow.remove(pos);
            }
            self.pending.retain(|_, shadow| !shadow.is_empty());
            debug!("Handed {kind} {label} of {scope} back to {owner}");
            return Ok(label);
        }

        let strategy = strategy(kind);
        let geometry = *pool.bitmap.geometry();
        let found = strategy
            .row_order(&geometry, &pool.cursor)
            .into_iter()
            .find_map(|row| {
                pool.bitmap
                    .first_free_in_row(row, &ranges, |l| reserved.contains(&l))
                    .map(|label| (row, label))
            });

        let Some((row, label)) = found else {
            debug!("{kind} pool of {scope} exhausted for {owner}");
            return Err(AllocatorError::Exhausted {
                kind,
                scope: scope.clone(),
            });
        };
        set_persisted(backend.as_ref(), &id, pool, label)?;
        strategy.advance(&geometry, &mut pool.cursor, row);
        self.allocated.push(Allocation {
            id,
            label,
            owner: owner.clone(),
        });
        debug!("Allocated {kind} {label} of {scope} to {owner}");
        Ok(label)
    }

    /// Try the scopes in order and allocate from the first one that is not exhausted.
    pub fn allocate_any(
        &mut self,
        kind: PoolKind,
        scopes: &[PoolScope],
        owner: &LabelOwner,
        ranges: &[LabelRange],
    ) -> Result<(PoolScope, Label), AllocatorError> {
        let mut last = None;
        for scope in scopes {
            match self.allocate(kind, scope, owner, ranges) {
                Ok(label) => return Ok((scope.clone(), label)),
                Err(e @ AllocatorError::Exhausted { .. }) => last = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or(AllocatorError::Exhausted {
            kind,
            scope: PoolScope::Tenant(String::new()),
        }))
    }

    /// Mark a label as in use by `owner`, e.g. when restoring a label carried by imported
    /// configuration.
    pub fn reserve(
        &mut self,
        kind: PoolKind,
        scope: &PoolScope,
        label: Label,
        owner: &LabelOwner,
    ) -> Result<(), AllocatorError> {
        let id = (kind, scope.clone());
        let backend = Arc::clone(&self.backend);
        let pool = self.pool_mut(&id)?;
        set_persisted(backend.as_ref(), &id, pool, label)?;
        self.allocated.push(Allocation {
            id,
            label,
            owner: owner.clone(),
        });
        debug!("Reserved {kind} {label} of {scope} for {owner}");
        Ok(())
    }

    /// Free a label right away.
    pub fn deallocate(
        &mut self,
        kind: PoolKind,
        scope: &PoolScope,
        label: Label,
    ) -> Result<(), AllocatorError> {
        let id = (kind, scope.clone());
        let backend = Arc::clone(&self.backend);
        let pool = self.pool_mut(&id)?;
        let row = pool.bitmap.clear(label)?;
        persist(backend.as_ref(), &id, pool, row)?;
        self.allocated.retain(|a| !(a.id == id && a.label == label));
        debug!("Deallocated {kind} {label} of {scope}");
        Ok(())
    }

    /// Free a label on behalf of a transaction that deletes its owner. The label stays reserved
    /// for `owner` until the transaction is finalized.
    pub fn mark_pending_delete(
        &mut self,
        kind: PoolKind,
        scope: &PoolScope,
        label: Label,
        owner: &LabelOwner,
    ) -> Result<(), AllocatorError> {
        let id = (kind, scope.clone());
        let backend = Arc::clone(&self.backend);
        let pool = self.pool_mut(&id)?;
        let row = pool.bitmap.clear(label)?;
        persist(backend.as_ref(), &id, pool, row)?;
        let txn_owned = self.allocated.iter().any(|a| a.id == id && a.label == label);
        if txn_owned {
            // allocated and released within the same transaction: nothing to keep
            self.allocated.retain(|a| !(a.id == id && a.label == label));
        } else {
            self.pending.entry(id).or_default().push(PendingDelete {
                label,
                owner: owner.clone(),
            });
        }
        debug!("{kind} {label} of {scope} pending delete for {owner}");
        Ok(())
    }

    //////////////////////////////////////////////////////////////////
    /// Transaction end
    //////////////////////////////////////////////////////////////////

    /// Forget the shadow entries and allocations of the transaction over `scope`: its pending
    /// labels become free for everybody.
    pub fn finalize(&mut self, scope: &ConfigScope) {
        let mut settled = 0;
        for shadow in self.pending.values_mut() {
            let before = shadow.len();
            shadow.retain(|p| !scope.admits(p.owner.key()));
            settled += before - shadow.len();
        }
        self.pending.retain(|_, shadow| !shadow.is_empty());
        let before = self.allocated.len();
        self.allocated.retain(|a| !scope.admits(a.owner.key()));
        debug!(
            "Finalized pools of {scope:?}: {settled} pending deletes, {} allocations",
            before - self.allocated.len()
        );
    }

    /// Undo the transaction over `scope`: its pending labels are given back, its new
    /// allocations released.
    pub fn abort(&mut self, scope: &ConfigScope) -> Result<(), AllocatorError> {
        let mut restored = Vec::new();
        for (id, shadow) in &mut self.pending {
            let (mine, others): (Vec<_>, Vec<_>) = std::mem::take(shadow)
                .into_iter()
                .partition(|p| scope.admits(p.owner.key()));
            *shadow = others;
            restored.extend(mine.into_iter().map(|p| (id.clone(), p.label)));
        }
        self.pending.retain(|_, shadow| !shadow.is_empty());
        let (released, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.allocated)
            .into_iter()
            .partition(|a| scope.admits(a.owner.key()));
        self.allocated = kept;

        let backend = Arc::clone(&self.backend);
        for (id, label) in restored {
            let pool = self.pool_mut(&id)?;
            match pool.bitmap.set(label) {
                Ok(row) => persist(backend.as_ref(), &id, pool, row)?,
                Err(e) => warn!("Could not restore {} {label} of {}: {e}", id.0, id.1),
            }
        }
        for a in released {
            let pool = self.pool_mut(&a.id)?;
            match pool.bitmap.clear(a.label) {
                Ok(row) => persist(backend.as_ref(), &a.id, pool, row)?,
                Err(e) => warn!("Could not release {} {} of {}: {e}", a.id.0, a.label, a.id.1),
            }
        }
        debug!("Aborted pool changes of {scope:?}");
        Ok(())
    }

    /// Drop the pool of a scope whose owner is going away.
    pub fn release_scope(&mut self, kind: PoolKind, scope: &PoolScope) -> Result<(), AllocatorError> {
        let id = (kind, scope.clone());
        self.pools.remove(&id);
        self.pending.remove(&id);
        self.allocated.retain(|a| a.id != id);
        self.backend.delete_rows(kind, scope)?;
        debug!("Released {kind} pool of {scope}");
        Ok(())
    }

    //////////////////////////////////////////////////////////////////
    /// Queries
    //////////////////////////////////////////////////////////////////

    pub fn is_allocated(
        &mut self,
        kind: PoolKind,
        scope: &PoolScope,
        label: Label,
    ) -> Result<bool, AllocatorError> {
        let id = (kind, scope.clone());
        Ok(self.pool_mut(&id)?.bitmap.is_set(label))
    }

    pub fn allocated_count(
        &mut self,
        kind: PoolKind,
        scope: &PoolScope,
    ) -> Result<u32, AllocatorError> {
        let id = (kind, scope.clone());
        Ok(self.pool_mut(&id)?.bitmap.count())
    }

    /// Labels of a scope pending deletion, with their owners.
    #[must_use]
    pub fn pending(&self, kind: PoolKind, scope: &PoolScope) -> Vec<(Label, LabelOwner)> {
        self.pending
            .get(&(kind, scope.clone()))
            .map(|shadow| {
                shadow
                    .iter()
                    .map(|p| (p.label, p.owner.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
