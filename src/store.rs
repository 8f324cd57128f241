/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Persistent map from invocation id to the last suspended evaluation state of that invocation.
//!
//! Entries are kept borsh-encoded, exactly as they are persisted. Every application records the
//! previous value of each touched entry under the applied height, so the store can be rolled back
//! when a block is discarded by a chain reorganization.
//!
//! At most one entry exists per invocation id. An `InProgress` entry is replaced by the next step,
//! and the terminal `Finished` entry is never replaced.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{error::InvariantViolation, script::Expr, types::InvocationId};

/// Stored state of an invocation.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ContinuationState {
    /// Not-yet-evaluated remainder of the script and the budget left unspent by step `step`.
    InProgress {
        step: u32,
        expression: Expr,
        unused_complexity: u64,
    },
    /// The invocation result has been applied.
    Finished,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("continuation state of invocation {0:?} cannot be decoded")]
    Corrupted(InvocationId),

    #[error("continuation state of invocation {0:?} cannot be encoded")]
    Encoding(InvocationId),

    #[error("height {height} is below the current height {current}")]
    HeightBelowCurrent { height: u32, current: u32 },

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

/// Whole live state captured at a height.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContinuationSnapshot {
    pub height: u32,
    entries: BTreeMap<InvocationId, Vec<u8>>,
}

#[derive(Clone, Debug, Default)]
pub struct ContinuationStateStore {
    entries: BTreeMap<InvocationId, Vec<u8>>,
    /// Previous encoded value of every entry touched at a height, in application order.
    undo_log: BTreeMap<u32, Vec<(InvocationId, Option<Vec<u8>>)>>,
    height: u32,
}

impl ContinuationStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Height of the last applied update.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, id: &InvocationId) -> Result<Option<ContinuationState>, StoreError> {
        self.entries.get(id).map(|bytes| decode(id, bytes)).transpose()
    }

    /// Invocations still in progress, with the step a continuation must reference next.
    pub fn pending(&self) -> Result<Vec<(InvocationId, u32)>, StoreError> {
        let mut pending = Vec::new();
        for (id, bytes) in &self.entries {
            if let ContinuationState::InProgress { step, .. } = decode(id, bytes)? {
                pending.push((*id, step));
            }
        }
        Ok(pending)
    }

    /// Applies the continuation updates of a block at `height`. Either every update is applied
    /// or none is.
    pub fn apply(
        &mut self,
        height: u32,
        updates: &BTreeMap<InvocationId, ContinuationState>,
    ) -> Result<(), StoreError> {
        if height < self.height {
            return Err(StoreError::HeightBelowCurrent { height, current: self.height });
        }

        let mut writes = Vec::with_capacity(updates.len());
        for (id, update) in updates {
            match (self.get(id)?, update) {
                // applying Finished again has no further effect
                (Some(ContinuationState::Finished), ContinuationState::Finished) => continue,
                (Some(ContinuationState::Finished), ContinuationState::InProgress { .. }) => {
                    return Err(InvariantViolation::AlreadyFinished(*id).into())
                }
                _ => {}
            }
            let bytes = borsh::to_vec(update).map_err(|_| StoreError::Encoding(*id))?;
            writes.push((*id, bytes));
        }

        let undo = self.undo_log.entry(height).or_default();
        for (id, bytes) in writes {
            let previous = self.entries.insert(id, bytes);
            undo.push((id, previous));
        }
        self.height = height;

        tracing::debug!(height, updates = updates.len(), "continuation states applied");
        Ok(())
    }

    /// Reverts every update recorded above `height`. Returns the ids whose entries changed.
    pub fn rollback_to(&mut self, height: u32) -> Vec<InvocationId> {
        let discarded = self.undo_log.split_off(&(height.saturating_add(1)));
        let mut touched = Vec::new();
        for (_, undo) in discarded.into_iter().rev() {
            for (id, previous) in undo.into_iter().rev() {
                match previous {
                    Some(bytes) => self.entries.insert(id, bytes),
                    None => self.entries.remove(&id),
                };
                touched.push(id);
            }
        }
        self.height = std::cmp::min(self.height, height);

        touched.sort_unstable();
        touched.dedup();
        tracing::debug!(height, touched = touched.len(), "continuation states rolled back");
        touched
    }

    pub fn snapshot(&self) -> ContinuationSnapshot {
        ContinuationSnapshot { height: self.height, entries: self.entries.clone() }
    }

    /// Reinstates a snapshot. Undo records above the snapshot height are dropped.
    pub fn restore(&mut self, snapshot: ContinuationSnapshot) {
        self.undo_log.split_off(&(snapshot.height.saturating_add(1)));
        self.entries = snapshot.entries;
        self.height = snapshot.height;
    }
}

fn decode(id: &InvocationId, bytes: &[u8]) -> Result<ContinuationState, StoreError> {
    ContinuationState::try_from_slice(bytes).map_err(|_| StoreError::Corrupted(*id))
}
