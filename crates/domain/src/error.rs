//! Error types used across the workspace.
//!
//! Each failure class from the orchestration lifecycle gets its own typed
//! error; layers convert into [`EngineError`] via `#[from]`. Compilation
//! and safety errors are fatal to a request and always surface before any
//! device contact. Device errors split into transient (retried with
//! backoff) and permanent (fail the step immediately) via
//! [`DeviceError::is_retryable`].

use crate::id::{EntityId, OperationId, StepId};
use crate::plan::StepStatus;

/// Top-level error for orchestration requests.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A request or domain object failed invariant checks.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// The candidate set could not be compiled into a plan.
    #[error("plan compilation failed")]
    Compilation(#[from] PlanCompilationError),

    /// The safety gate rejected the plan before execution.
    #[error("plan rejected by safety gate")]
    Safety(#[from] SafetyRejection),

    /// The device layer reported a failure outside step execution
    /// (e.g. while refreshing snapshots).
    #[error("device layer error")]
    Device(#[from] DeviceError),

    /// The intent-resolution service failed to produce candidates.
    #[error("intent resolution failed: {0}")]
    Intent(String),
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The orchestration goal text was empty.
    #[error("goal text must not be empty")]
    EmptyGoal,

    /// A candidate operation had an empty action name.
    #[error("action name must not be empty")]
    EmptyAction,

    /// A candidate operation or snapshot had an empty entity id.
    #[error("entity id must not be empty")]
    EmptyEntityId,

    /// A zone was declared without a name.
    #[error("zone name must not be empty")]
    EmptyZoneName,

    /// A step was asked to leave a terminal status, or to jump an
    /// intermediate one.
    #[error("step {step} cannot transition from {from} to {to}")]
    InvalidTransition {
        step: StepId,
        from: StepStatus,
        to: StepStatus,
    },
}

/// Failures that reject a candidate set at compile time.
///
/// Fatal to the request, never retried, surfaced before any device
/// contact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanCompilationError {
    /// The intent resolver produced no operations for the goal.
    #[error("candidate set is empty")]
    EmptyCandidateSet,

    /// The candidate set exceeds the configured step limit.
    #[error("candidate set has {count} operations, limit is {max}")]
    TooManySteps { count: usize, max: usize },

    /// Declared ordering constraints form a cycle. Detected by
    /// topological sort; the listed steps are the ones left unordered.
    #[error("dependency cycle involving {} step(s)", .0.len())]
    CyclicDependency(Vec<StepId>),

    /// An operation declared an `after` constraint on an operation that
    /// is not part of the (conflict-resolved) candidate set.
    #[error("operation {operation} orders itself after unknown operation {missing}")]
    UnknownDependency {
        operation: OperationId,
        missing: OperationId,
    },
}

/// Atomic whole-plan rejection by the safety gate.
///
/// Raised when safety mode is enabled, the plan contains at least one
/// irreversible step, and no valid confirmation token accompanied the
/// request. No device is contacted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} irreversible step(s) require confirmation", irreversible.len())]
pub struct SafetyRejection {
    /// The steps classified irreversible.
    pub irreversible: Vec<StepId>,
}

/// Failures reported by the device layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The invocation did not complete within its per-step timeout.
    #[error("action timed out after {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    /// The entity exists but is currently unreachable.
    #[error("entity {0} is unavailable")]
    Unavailable(EntityId),

    /// A failure the device layer declares safe to retry.
    #[error("transient device failure: {0}")]
    Retryable(String),

    /// No such entity in the fleet.
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),

    /// The device rejected the action name or parameters as invalid.
    #[error("invalid action or parameters: {0}")]
    InvalidAction(String),
}

impl DeviceError {
    /// Whether the scheduler should retry the step with backoff.
    ///
    /// Timeouts, unavailability, and declared-retryable failures are
    /// transient. Invalid actions and unknown entities are permanent and
    /// fail the step immediately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Unavailable(_) | Self::Retryable(_)
        )
    }
}
