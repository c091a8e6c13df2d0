//! Zone — a named grouping of entities with a priority rank.
//!
//! Zones scope orchestration requests ("only the living room") and break
//! cross-zone conflicts: when two zones target the same entity, the
//! higher-priority zone wins.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::EntityId;

/// A named grouping such as a room, floor, or security perimeter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    /// Rank used to break cross-zone conflicts; higher wins.
    pub priority: i32,
    pub entities: HashSet<EntityId>,
}

impl Zone {
    /// Create a builder for constructing a [`Zone`].
    #[must_use]
    pub fn builder() -> ZoneBuilder {
        ZoneBuilder::default()
    }

    /// Whether the zone contains the given entity.
    #[must_use]
    pub fn contains(&self, entity_id: &EntityId) -> bool {
        self.entities.contains(entity_id)
    }
}

/// Step-by-step builder for [`Zone`].
#[derive(Debug, Default)]
pub struct ZoneBuilder {
    name: Option<String>,
    priority: i32,
    entities: HashSet<EntityId>,
}

impl ZoneBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn entity(mut self, entity_id: impl Into<EntityId>) -> Self {
        self.entities.insert(entity_id.into());
        self
    }

    #[must_use]
    pub fn entities(mut self, entities: HashSet<EntityId>) -> Self {
        self.entities = entities;
        self
    }

    /// Consume the builder, validate, and return a [`Zone`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyZoneName`] if `name` is missing or
    /// empty.
    pub fn build(self) -> Result<Zone, ValidationError> {
        let name = self.name.unwrap_or_default();
        if name.is_empty() {
            return Err(ValidationError::EmptyZoneName);
        }
        Ok(Zone {
            name,
            priority: self.priority,
            entities: self.entities,
        })
    }
}
