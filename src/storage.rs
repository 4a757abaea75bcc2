//! Instance storage for scopes
//!
//! Uses DashMap for the slot lookup and a per-slot `OnceCell` for the
//! construction itself. The map entry only ever creates an empty slot, so
//! nothing user-visible runs under a shard lock; the slot's cell then runs
//! the factory at most once, blocking other threads that race for the same
//! slot until it is filled. Different slots never wait on each other, which
//! lets a factory resolve further services from the same scope.

use crate::definition::DefinitionId;
use crate::error::Result;
use crate::factory::Disposer;
use crate::key::{AnyArc, TypeKey};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A constructed instance and what is needed to dispose it
#[derive(Clone)]
pub(crate) struct StoredInstance {
    pub(crate) value: AnyArc,
    pub(crate) disposer: Option<Disposer>,
    /// Completion order within the cache
    pub(crate) sequence: u64,
}

#[derive(Default)]
pub(crate) struct InstanceSlot {
    cell: OnceCell<StoredInstance>,
}

/// Instance cache of one scope.
///
/// Closed definitions are keyed by definition; open-generic definitions are
/// keyed by definition plus the concrete type arguments.
pub(crate) struct InstanceCache {
    instances: DashMap<DefinitionId, Arc<InstanceSlot>, RandomState>,
    generic_instances: DashMap<(DefinitionId, Arc<[TypeKey]>), Arc<InstanceSlot>, RandomState>,
    sequence: AtomicU64,
}

impl InstanceCache {
    /// Create an empty cache with optimized shard count.
    ///
    /// Uses 8 shards; scopes rarely hold more than a handful of instances.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            instances: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                8,
            ),
            generic_instances: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            ),
            sequence: AtomicU64::new(0),
        }
    }

    fn slot(&self, definition: DefinitionId, args: Option<&Arc<[TypeKey]>>) -> Arc<InstanceSlot> {
        match args {
            None => Arc::clone(self.instances.entry(definition).or_default().value()),
            Some(args) => Arc::clone(
                self.generic_instances
                    .entry((definition, Arc::clone(args)))
                    .or_default()
                    .value(),
            ),
        }
    }

    /// Return the cached instance for the key, or run `init` exactly once to create it.
    ///
    /// A failed `init` leaves the slot empty.
    pub(crate) fn get_or_init(
        &self,
        definition: DefinitionId,
        args: Option<&Arc<[TypeKey]>>,
        disposer: Option<Disposer>,
        init: impl FnOnce() -> Result<AnyArc>,
    ) -> Result<AnyArc> {
        let slot = self.slot(definition, args);
        let stored = slot.cell.get_or_try_init(|| {
            let value = init()?;
            Ok::<_, crate::DiError>(StoredInstance {
                value,
                disposer,
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            })
        })?;
        Ok(Arc::clone(&stored.value))
    }

    /// Number of constructed instances
    pub(crate) fn len(&self) -> usize {
        let count = |slot: &Arc<InstanceSlot>| slot.cell.get().is_some();
        self.instances.iter().filter(|e| count(e.value())).count()
            + self.generic_instances.iter().filter(|e| count(e.value())).count()
    }

    /// Remove every instance, newest first
    pub(crate) fn drain(&self) -> Vec<StoredInstance> {
        let mut stored: Vec<StoredInstance> = self
            .instances
            .iter()
            .filter_map(|e| e.value().cell.get().cloned())
            .chain(
                self.generic_instances
                    .iter()
                    .filter_map(|e| e.value().cell.get().cloned()),
            )
            .collect();
        self.instances.clear();
        self.generic_instances.clear();

        stored.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        stored
    }
}
