//! Zone coordinator — entity-to-zone mapping and cross-zone conflict
//! resolution.
//!
//! When operations submitted from different zones target the same entity,
//! the highest-priority zone keeps its operation and the rest are
//! discarded — recorded in the compiled plan's metadata, never silently.
//! Equal priority breaks towards the later-submitted operation
//! ("last-submitted wins").

use weaver_domain::id::EntityId;
use weaver_domain::operation::CandidateOperation;
use weaver_domain::plan::DiscardedOperation;
use weaver_domain::zone::Zone;

use std::collections::HashMap;

use tracing::debug;

/// Outcome of conflict resolution over a candidate list.
#[derive(Debug, Clone)]
pub struct ConflictResolution {
    /// Surviving operations, original rank order preserved.
    pub kept: Vec<CandidateOperation>,
    /// Discarded operations with the zone that superseded them.
    pub discarded: Vec<DiscardedOperation>,
}

/// Maintains the zone layout and resolves cross-zone conflicts.
#[derive(Debug, Clone, Default)]
pub struct ZoneCoordinator {
    zones: Vec<Zone>,
}

impl ZoneCoordinator {
    /// Create a coordinator over the given zone layout.
    #[must_use]
    pub fn new(zones: Vec<Zone>) -> Self {
        Self { zones }
    }

    /// All configured zones.
    #[must_use]
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Look up a zone by name.
    #[must_use]
    pub fn zone(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name == name)
    }

    /// Priority rank of a named zone; unknown zones rank 0.
    #[must_use]
    pub fn priority_of(&self, name: &str) -> i32 {
        self.zone(name).map_or(0, |z| z.priority)
    }

    /// Whether `entity_id` belongs to any of the named zones.
    #[must_use]
    pub fn in_zones(&self, entity_id: &EntityId, names: &[String]) -> bool {
        names
            .iter()
            .filter_map(|name| self.zone(name))
            .any(|zone| zone.contains(entity_id))
    }

    /// The highest-priority zone containing `entity_id`, if any.
    #[must_use]
    pub fn best_zone_of(&self, entity_id: &EntityId) -> Option<&Zone> {
        self.zones
            .iter()
            .filter(|z| z.contains(entity_id))
            .max_by_key(|z| z.priority)
    }

    /// Resolve cross-zone conflicts in a ranked candidate list.
    ///
    /// Two operations conflict when they target the same entity from
    /// different zones. The operation from the highest-priority zone is
    /// kept; on equal priority the later-submitted operation's zone
    /// dominates. Operations without a zone attribution never lose a
    /// conflict (the compiler serializes same-entity operations anyway).
    #[must_use]
    pub fn resolve_conflicts(&self, candidates: Vec<CandidateOperation>) -> ConflictResolution {
        // Winning zone per entity: scan in submission order, replacing on
        // priority >= so that later submissions win ties.
        let mut winner_by_entity: HashMap<EntityId, (String, i32)> = HashMap::new();
        for op in &candidates {
            if let Some(zone) = self.attributed_zone(op) {
                let priority = self.priority_of(&zone);
                match winner_by_entity.get(&op.entity_id) {
                    Some((_, best)) if *best > priority => {}
                    _ => {
                        winner_by_entity.insert(op.entity_id.clone(), (zone, priority));
                    }
                }
            }
        }

        let mut kept = Vec::with_capacity(candidates.len());
        let mut discarded = Vec::new();
        for op in candidates {
            let Some(zone) = self.attributed_zone(&op) else {
                kept.push(op);
                continue;
            };
            match winner_by_entity.get(&op.entity_id) {
                Some((winning_zone, winning_priority)) if *winning_zone != zone => {
                    debug!(
                        entity = %op.entity_id,
                        action = %op.action,
                        losing_zone = %zone,
                        winning_zone = %winning_zone,
                        "discarding conflicting cross-zone operation"
                    );
                    let reason = format!(
                        "zone '{zone}' (priority {}) superseded by zone '{winning_zone}' \
                         (priority {winning_priority}) for entity {}",
                        self.priority_of(&zone),
                        op.entity_id,
                    );
                    discarded.push(DiscardedOperation {
                        operation: op,
                        winning_zone: winning_zone.clone(),
                        reason,
                    });
                }
                _ => kept.push(op),
            }
        }

        ConflictResolution { kept, discarded }
    }

    /// The zone an operation is attributed to: its declared originating
    /// zone, or the highest-priority zone containing its target entity.
    fn attributed_zone(&self, op: &CandidateOperation) -> Option<String> {
        op.zone
            .clone()
            .or_else(|| self.best_zone_of(&op.entity_id).map(|z| z.name.clone()))
    }
}
