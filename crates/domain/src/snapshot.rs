//! Entity snapshot — a time-stamped cached copy of device-layer state.
//!
//! The device layer owns entity state; the engine only holds snapshots,
//! replaced atomically per entity on refresh. States use the device
//! layer's string vocabulary (`on`, `off`, `locked`, `21.5`, …).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::EntityId;
use crate::time::Timestamp;

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(serde_json::Value),
}

impl AttributeValue {
    /// Numeric view of the value, when it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::String(s) => s.parse().ok(),
            Self::Bool(_) | Self::Json(_) => None,
        }
    }
}

/// State the device layer uses to mark an unreachable entity.
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Cached observation of a single entity at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: EntityId,
    pub state: String,
    pub attributes: HashMap<String, AttributeValue>,
    pub last_updated: Timestamp,
}

impl EntitySnapshot {
    /// Create a builder for constructing an [`EntitySnapshot`].
    #[must_use]
    pub fn builder() -> EntitySnapshotBuilder {
        EntitySnapshotBuilder::default()
    }

    /// The entity's domain prefix (`light`, `lock`, `climate`, …).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.entity_id.domain()
    }

    /// Look up an attribute by key.
    #[must_use]
    pub fn get_attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Whether the device layer reports this entity unreachable.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }

    /// Numeric view of the state, for sensor-like entities.
    #[must_use]
    pub fn numeric_state(&self) -> Option<f64> {
        self.state.parse().ok()
    }
}

/// Step-by-step builder for [`EntitySnapshot`].
#[derive(Debug, Default)]
pub struct EntitySnapshotBuilder {
    entity_id: Option<EntityId>,
    state: Option<String>,
    attributes: HashMap<String, AttributeValue>,
    last_updated: Option<Timestamp>,
}

impl EntitySnapshotBuilder {
    #[must_use]
    pub fn entity_id(mut self, entity_id: impl Into<EntityId>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    #[must_use]
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn attributes(mut self, attributes: HashMap<String, AttributeValue>) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub fn last_updated(mut self, last_updated: Timestamp) -> Self {
        self.last_updated = Some(last_updated);
        self
    }

    /// Consume the builder, validate, and return an [`EntitySnapshot`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyEntityId`] when no entity id was
    /// provided.
    pub fn build(self) -> Result<EntitySnapshot, ValidationError> {
        let entity_id = self.entity_id.unwrap_or_else(|| EntityId::new(""));
        if entity_id.is_empty() {
            return Err(ValidationError::EmptyEntityId);
        }
        Ok(EntitySnapshot {
            entity_id,
            state: self.state.unwrap_or_else(|| "unknown".to_string()),
            attributes: self.attributes,
            last_updated: self.last_updated.unwrap_or_else(crate::time::now),
        })
    }
}
