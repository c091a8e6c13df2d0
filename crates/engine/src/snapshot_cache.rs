//! Snapshot cache — the engine's local picture of the fleet.
//!
//! Populated by full refreshes through the device port and kept current
//! by applying pushed state events. Readers get clones; the cache never
//! hands out references into the map.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use weaver_domain::error::DeviceError;
use weaver_domain::id::EntityId;
use weaver_domain::snapshot::EntitySnapshot;

use crate::ports::{DeviceGateway, EntityFilter, StateEvent};

/// Shared cache of the latest known snapshot per entity.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: RwLock<HashMap<EntityId, EntitySnapshot>>,
}

impl SnapshotCache {
    /// Insert or replace the snapshot for its entity.
    pub fn upsert(&self, snapshot: EntitySnapshot) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.entity_id.clone(), snapshot);
    }

    /// Latest known snapshot for `entity_id`.
    #[must_use]
    pub fn get(&self, entity_id: &EntityId) -> Option<EntitySnapshot> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .cloned()
    }

    /// Every cached snapshot.
    #[must_use]
    pub fn all(&self) -> Vec<EntitySnapshot> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Number of cached entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a pushed state change.
    pub fn apply_event(&self, event: StateEvent) {
        debug!(entity = %event.entity_id, state = %event.snapshot.state, "applying state event");
        self.upsert(event.snapshot);
    }

    /// Replace the cached view of every entity matching `filter` with a
    /// fresh query through the device port. Returns the number of
    /// entities refreshed.
    ///
    /// # Errors
    ///
    /// Propagates the device-layer failure; the cache keeps its previous
    /// contents in that case.
    pub async fn refresh<G: DeviceGateway>(
        &self,
        gateway: &G,
        filter: &EntityFilter,
    ) -> Result<usize, DeviceError> {
        let snapshots = gateway.query_entities(filter).await?;
        let count = snapshots.len();
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for snapshot in snapshots {
            entries.insert(snapshot.entity_id.clone(), snapshot);
        }
        debug!(count, "snapshot cache refreshed");
        Ok(count)
    }
}
