//! Device port — the contract the engine consumes to reach the fleet.
//!
//! The device layer owns entity state and performs the actual queries
//! and invocations; the engine only sees snapshots and outcomes.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio_stream::Stream;

use weaver_domain::error::DeviceError;
use weaver_domain::id::EntityId;
use weaver_domain::snapshot::{AttributeValue, EntitySnapshot};
use weaver_domain::time::Timestamp;

/// Filter for fleet queries.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    /// Restrict to entities whose id carries this domain prefix.
    pub domain: Option<String>,
    /// Restrict to an explicit set of entity ids.
    pub entity_ids: Option<Vec<EntityId>>,
}

impl EntityFilter {
    /// Match every entity in the fleet.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Match entities of a single domain (`light`, `lock`, …).
    #[must_use]
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            entity_ids: None,
        }
    }

    /// Whether the given entity id satisfies this filter.
    #[must_use]
    pub fn matches(&self, entity_id: &EntityId) -> bool {
        self.domain
            .as_deref()
            .is_none_or(|d| entity_id.domain() == d)
            && self
                .entity_ids
                .as_deref()
                .is_none_or(|ids| ids.contains(entity_id))
    }
}

/// A state change pushed by the device layer.
#[derive(Debug, Clone)]
pub struct StateEvent {
    pub entity_id: EntityId,
    pub snapshot: EntitySnapshot,
    pub occurred_at: Timestamp,
}

/// Transport-agnostic device layer contract.
///
/// Implementations live in adapter crates (e.g. `adapter-virtual`).
pub trait DeviceGateway: Send + Sync {
    /// Snapshot the entities matching `filter`.
    fn query_entities(
        &self,
        filter: &EntityFilter,
    ) -> impl Future<Output = Result<Vec<EntitySnapshot>, DeviceError>> + Send;

    /// Perform `action` against `entity_id`, returning the post-action
    /// snapshot. `timeout` is the per-step budget the scheduler grants;
    /// the device layer may use it to bound its own transport waits.
    fn invoke_action(
        &self,
        entity_id: &EntityId,
        action: &str,
        params: &HashMap<String, AttributeValue>,
        timeout: Duration,
    ) -> impl Future<Output = Result<EntitySnapshot, DeviceError>> + Send;

    /// Subscribe to state-change events.
    ///
    /// The stream is lazy and unbounded; when it ends (transport drop),
    /// calling this again starts a fresh subscription.
    fn subscribe_events(&self) -> impl Stream<Item = StateEvent> + Send + Unpin;
}
