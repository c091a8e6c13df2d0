//! Plan — the compiled, dependency-ordered set of steps for one
//! orchestration request.
//!
//! A plan is a directed acyclic graph of [`Step`]s, validated acyclic at
//! compile time. Steps progress through a checked state machine; a step
//! that reached a terminal status can never run again.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::{PlanId, StepId};
use crate::operation::{CandidateOperation, Reversibility};

/// Execution status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Whether the status is final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running => f.write_str("running"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

/// Terminal status of a whole plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    /// Compiled and gated, not yet finished executing.
    Compiled,
    /// Every step succeeded.
    Succeeded,
    /// At least one step succeeded and at least one failed or was skipped.
    Partial,
    /// No step succeeded (including: the deadline elapsed before any step
    /// completed).
    Aborted,
    /// The safety gate refused the plan before any device contact.
    Rejected,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compiled => f.write_str("compiled"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Partial => f.write_str("partial"),
            Self::Aborted => f.write_str("aborted"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

/// A single device operation within a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub operation: CandidateOperation,
    pub depends_on: Vec<StepId>,
    pub classification: Reversibility,
    status: StepStatus,
    pub retries_remaining: u32,
}

impl Step {
    /// Create a pending step for the given operation.
    #[must_use]
    pub fn new(
        operation: CandidateOperation,
        classification: Reversibility,
        retries_remaining: u32,
    ) -> Self {
        Self {
            id: StepId::new(),
            operation,
            depends_on: Vec::new(),
            classification,
            status: StepStatus::Pending,
            retries_remaining,
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> StepStatus {
        self.status
    }

    /// Whether this step performs an irreversible action.
    #[must_use]
    pub fn is_irreversible(&self) -> bool {
        self.classification == Reversibility::Irreversible
    }

    /// Move the step to `next`, enforcing the state machine:
    /// `pending → running → {succeeded | failed}` and `pending → skipped`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTransition`] for any other move,
    /// in particular leaving a terminal status.
    pub fn transition(&mut self, next: StepStatus) -> Result<(), ValidationError> {
        let allowed = matches!(
            (self.status, next),
            (StepStatus::Pending, StepStatus::Running | StepStatus::Skipped)
                | (StepStatus::Running, StepStatus::Succeeded | StepStatus::Failed)
        );
        if !allowed {
            return Err(ValidationError::InvalidTransition {
                step: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// A conflict-resolution discard, kept as plan metadata (never silent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscardedOperation {
    /// The losing operation.
    pub operation: CandidateOperation,
    /// The zone whose operation won the entity.
    pub winning_zone: String,
    /// Human-readable explanation of the discard.
    pub reason: String,
}

/// The compiled dependency graph for one orchestration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub goal: String,
    pub safety_mode: bool,
    /// Wall-clock budget for the whole plan, set by the safety gate.
    pub deadline: Duration,
    pub status: PlanStatus,
    steps: Vec<Step>,
    pub discarded: Vec<DiscardedOperation>,
}

impl Plan {
    /// Create a compiled plan. Steps are stored in execution rank order.
    #[must_use]
    pub fn new(
        goal: impl Into<String>,
        safety_mode: bool,
        steps: Vec<Step>,
        discarded: Vec<DiscardedOperation>,
    ) -> Self {
        Self {
            id: PlanId::new(),
            goal: goal.into(),
            safety_mode,
            deadline: Duration::ZERO,
            status: PlanStatus::Compiled,
            steps,
            discarded,
        }
    }

    /// All steps, in rank order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Look up a step by id.
    #[must_use]
    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Mutable step lookup.
    pub fn step_mut(&mut self, id: StepId) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Ids of steps classified irreversible.
    #[must_use]
    pub fn irreversible_steps(&self) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|s| s.is_irreversible())
            .map(|s| s.id)
            .collect()
    }

    /// Pending steps whose dependencies have all succeeded.
    #[must_use]
    pub fn ready_steps(&self) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|s| {
                s.status() == StepStatus::Pending
                    && s.depends_on.iter().all(|dep| {
                        self.step(*dep)
                            .is_some_and(|d| d.status() == StepStatus::Succeeded)
                    })
            })
            .map(|s| s.id)
            .collect()
    }

    /// Steps that depend on `id`, directly or transitively.
    #[must_use]
    pub fn dependents_of(&self, id: StepId) -> Vec<StepId> {
        let mut found = Vec::new();
        let mut seen: HashSet<StepId> = HashSet::new();
        let mut queue: VecDeque<StepId> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for step in &self.steps {
                if step.depends_on.contains(&current) && seen.insert(step.id) {
                    found.push(step.id);
                    queue.push_back(step.id);
                }
            }
        }
        found
    }

    /// Whether every step has reached a terminal status.
    #[must_use]
    pub fn all_terminal(&self) -> bool {
        self.steps.iter().all(|s| s.status().is_terminal())
    }

    /// Count steps currently in `status`.
    #[must_use]
    pub fn count_status(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status() == status).count()
    }

    /// Terminal plan status derived from step outcomes.
    ///
    /// All succeeded → `Succeeded`; some succeeded → `Partial`;
    /// none succeeded → `Aborted`.
    #[must_use]
    pub fn derive_status(&self) -> PlanStatus {
        let succeeded = self.count_status(StepStatus::Succeeded);
        if succeeded == self.steps.len() {
            PlanStatus::Succeeded
        } else if succeeded > 0 {
            PlanStatus::Partial
        } else {
            PlanStatus::Aborted
        }
    }
}
