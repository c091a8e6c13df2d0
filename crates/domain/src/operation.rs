//! Candidate operation — an externally proposed device action.
//!
//! Candidates are produced by the intent-resolution service, ranked by
//! confidence, and consumed read-only by the plan compiler. A candidate
//! may carry ordering constraints (`after`) so a resolver can express
//! "start the projector after dimming the lights".

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::{EntityId, OperationId};
use crate::snapshot::AttributeValue;

/// Whether an action can be undone by a later action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reversibility {
    /// The action can be reversed (`turn_on`, `set_temperature`, …).
    Reversible,
    /// The action cannot be undone from inside the system
    /// (`unlock`, `disarm`, `open`, …).
    Irreversible,
}

impl std::fmt::Display for Reversibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reversible => f.write_str("reversible"),
            Self::Irreversible => f.write_str("irreversible"),
        }
    }
}

/// A proposed device action, prior to compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateOperation {
    pub id: OperationId,
    pub entity_id: EntityId,
    pub action: String,
    pub params: HashMap<String, AttributeValue>,
    /// Reversibility declared by the resolver. Consulted only for action
    /// types absent from the compiler's classification table.
    pub reversibility_hint: Option<Reversibility>,
    /// Resolver confidence in `0.0..=1.0`.
    pub confidence: f64,
    /// Zone this operation originated from, when submitted as part of a
    /// zone-scoped scenario.
    pub zone: Option<String>,
    /// Operations that must reach a terminal status before this one runs.
    pub after: Vec<OperationId>,
}

impl CandidateOperation {
    /// Create a builder for constructing a [`CandidateOperation`].
    #[must_use]
    pub fn builder() -> CandidateOperationBuilder {
        CandidateOperationBuilder::default()
    }
}

/// Step-by-step builder for [`CandidateOperation`].
#[derive(Debug, Default)]
pub struct CandidateOperationBuilder {
    id: Option<OperationId>,
    entity_id: Option<EntityId>,
    action: Option<String>,
    params: HashMap<String, AttributeValue>,
    reversibility_hint: Option<Reversibility>,
    confidence: Option<f64>,
    zone: Option<String>,
    after: Vec<OperationId>,
}

impl CandidateOperationBuilder {
    #[must_use]
    pub fn id(mut self, id: OperationId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn entity_id(mut self, entity_id: impl Into<EntityId>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn reversibility_hint(mut self, hint: Reversibility) -> Self {
        self.reversibility_hint = Some(hint);
        self
    }

    #[must_use]
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    #[must_use]
    pub fn zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    #[must_use]
    pub fn after(mut self, operation: OperationId) -> Self {
        self.after.push(operation);
        self
    }

    /// Consume the builder, validate, and return a [`CandidateOperation`].
    ///
    /// Confidence is clamped into `0.0..=1.0`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyEntityId`] or
    /// [`ValidationError::EmptyAction`] when the target or action name is
    /// missing.
    pub fn build(self) -> Result<CandidateOperation, ValidationError> {
        let entity_id = self.entity_id.unwrap_or_else(|| EntityId::new(""));
        if entity_id.is_empty() {
            return Err(ValidationError::EmptyEntityId);
        }
        let action = self.action.unwrap_or_default();
        if action.is_empty() {
            return Err(ValidationError::EmptyAction);
        }
        Ok(CandidateOperation {
            id: self.id.unwrap_or_default(),
            entity_id,
            action,
            params: self.params,
            reversibility_hint: self.reversibility_hint,
            confidence: self.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
            zone: self.zone,
            after: self.after,
        })
    }
}
