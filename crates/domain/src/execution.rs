//! Execution reporting — per-step results and compact plan outcomes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::id::{EntityId, PlanId, StepId};
use crate::plan::{Plan, PlanStatus, StepStatus};
use crate::time::Timestamp;

/// Outcome of one step, reported to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub step_id: StepId,
    pub entity_id: EntityId,
    pub action: String,
    pub status: StepStatus,
    /// Device invocations made for this step (0 for skipped steps).
    pub attempts: u32,
    pub duration: Duration,
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Result for a step that was never dispatched.
    #[must_use]
    pub fn skipped(step_id: StepId, entity_id: EntityId, action: impl Into<String>) -> Self {
        Self {
            step_id,
            entity_id,
            action: action.into(),
            status: StepStatus::Skipped,
            attempts: 0,
            duration: Duration::ZERO,
            error: None,
        }
    }
}

/// Compact summary appended to the pattern store when a plan reaches a
/// terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub plan_id: PlanId,
    pub goal: String,
    pub status: PlanStatus,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub finished_at: Timestamp,
}

impl PlanOutcome {
    /// Summarize a finished plan.
    #[must_use]
    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            plan_id: plan.id,
            goal: plan.goal.clone(),
            status: plan.status,
            succeeded: plan.count_status(StepStatus::Succeeded),
            failed: plan.count_status(StepStatus::Failed),
            skipped: plan.count_status(StepStatus::Skipped),
            finished_at: crate::time::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{CandidateOperation, Reversibility};
    use crate::plan::Step;

    #[test]
    fn should_build_skipped_result_with_zero_attempts() {
        let result = ExecutionResult::skipped(
            StepId::new(),
            EntityId::from("light.hall"),
            "turn_on",
        );
        assert_eq!(result.status, StepStatus::Skipped);
        assert_eq!(result.attempts, 0);
        assert!(result.error.is_none());
    }

    #[test]
    fn should_summarize_plan_counts() {
        let op = CandidateOperation::builder()
            .entity_id("light.a")
            .action("turn_on")
            .build()
            .unwrap();
        let mut plan = Plan::new(
            "goal",
            false,
            vec![
                Step::new(op.clone(), Reversibility::Reversible, 3),
                Step::new(op, Reversibility::Reversible, 3),
            ],
            vec![],
        );
        let (a, b) = (plan.steps()[0].id, plan.steps()[1].id);
        let s = plan.step_mut(a).unwrap();
        s.transition(StepStatus::Running).unwrap();
        s.transition(StepStatus::Succeeded).unwrap();
        plan.step_mut(b)
            .unwrap()
            .transition(StepStatus::Skipped)
            .unwrap();
        plan.status = plan.derive_status();

        let outcome = PlanOutcome::from_plan(&plan);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.status, PlanStatus::Partial);
    }

    #[test]
    fn should_roundtrip_through_serde_json() {
        let result = ExecutionResult::skipped(
            StepId::new(),
            EntityId::from("switch.fan"),
            "turn_off",
        );
        let json = serde_json::to_string(&result).unwrap();
        let parsed: ExecutionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.step_id, result.step_id);
        assert_eq!(parsed.status, StepStatus::Skipped);
    }
}
