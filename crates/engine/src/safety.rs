//! Safety gate — pre-execution check for irreversible actions.
//!
//! The gate runs after compilation and before any device contact. When a
//! plan in safety mode carries irreversible steps and no confirmation,
//! the whole plan is rejected atomically — not even its reversible steps
//! run. The gate also stamps the plan's wall-clock deadline, scaled to
//! its size and capped.

use std::time::Duration;

use tracing::{info, warn};

use weaver_domain::error::SafetyRejection;
use weaver_domain::id::StepId;
use weaver_domain::plan::Plan;

/// Gate policy knobs.
#[derive(Debug, Clone)]
pub struct SafetyGateConfig {
    /// Wall-clock budget granted per step when deriving the plan deadline.
    pub per_step_budget: Duration,
    /// Upper bound on the derived plan deadline.
    pub max_deadline: Duration,
}

impl Default for SafetyGateConfig {
    fn default() -> Self {
        Self {
            per_step_budget: Duration::from_secs(10),
            max_deadline: Duration::from_secs(120),
        }
    }
}

/// What the gate decided for a plan it let through.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    /// Irreversible steps the plan carries (confirmed, or safety mode
    /// is off). Surfaced so callers can show what was authorized.
    pub flagged: Vec<StepId>,
    /// Deadline stamped onto the plan.
    pub deadline: Duration,
}

/// Evaluates compiled plans against the irreversibility policy.
#[derive(Debug, Clone, Default)]
pub struct SafetyGate {
    config: SafetyGateConfig,
}

impl SafetyGate {
    /// Create a gate with the given policy.
    #[must_use]
    pub fn new(config: SafetyGateConfig) -> Self {
        Self { config }
    }

    /// Gate `plan` and stamp its deadline.
    ///
    /// A confirmation token is any non-empty string; token authenticity
    /// is the caller surface's concern.
    ///
    /// # Errors
    ///
    /// Returns [`SafetyRejection`] listing every irreversible step when
    /// the plan is in safety mode, carries at least one irreversible
    /// step, and no confirmation accompanies the request. The plan is
    /// left untouched in that case.
    pub fn gate(
        &self,
        plan: &mut Plan,
        confirmation: Option<&str>,
    ) -> Result<GateOutcome, SafetyRejection> {
        let irreversible = plan.irreversible_steps();
        let confirmed = confirmation.is_some_and(|token| !token.is_empty());

        if plan.safety_mode && !irreversible.is_empty() && !confirmed {
            warn!(
                plan = %plan.id,
                irreversible = irreversible.len(),
                "rejecting unconfirmed plan with irreversible steps"
            );
            return Err(SafetyRejection { irreversible });
        }

        let derived = self
            .config
            .per_step_budget
            .saturating_mul(u32::try_from(plan.len()).unwrap_or(u32::MAX));
        plan.deadline = derived.min(self.config.max_deadline);

        if !irreversible.is_empty() {
            info!(
                plan = %plan.id,
                irreversible = irreversible.len(),
                confirmed,
                "passing plan with irreversible steps"
            );
        }
        Ok(GateOutcome {
            flagged: irreversible,
            deadline: plan.deadline,
        })
    }
}
