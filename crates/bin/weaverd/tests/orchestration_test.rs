//! End-to-end tests: the full pipeline against the virtual fleet.

use std::sync::Arc;
use std::time::Duration;

use weaver_adapter_virtual::{KeywordIntentResolver, VirtualFleet};
use weaver_domain::error::EngineError;
use weaver_domain::id::EntityId;
use weaver_domain::operation::CandidateOperation;
use weaver_domain::pattern::ContextQuery;
use weaver_domain::plan::{PlanStatus, StepStatus};
use weaver_domain::snapshot::EntitySnapshot;
use weaver_domain::zone::Zone;
use weaver_engine::orchestrator::{
    OrchestrationRequest, Orchestrator, OrchestratorConfig,
};
use weaver_engine::pattern_memory::InMemoryPatternStore;
use weaver_engine::ports::{IntentResolver, PatternStore};
use weaver_engine::safety::SafetyGateConfig;
use weaver_engine::scheduler::SchedulerConfig;
use weaver_engine::zones::ZoneCoordinator;

/// Resolver that replays a fixed candidate list, for scenarios the
/// keyword resolver cannot express.
struct ScriptedResolver(Vec<CandidateOperation>);

impl IntentResolver for ScriptedResolver {
    async fn resolve_goal(
        &self,
        _goal: &str,
        _snapshots: &[EntitySnapshot],
    ) -> Result<Vec<CandidateOperation>, EngineError> {
        Ok(self.0.clone())
    }
}

fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        scheduler: SchedulerConfig {
            concurrency: 4,
            step_timeout: Duration::from_millis(500),
            backoff_base: Duration::from_millis(1),
        },
        ..OrchestratorConfig::default()
    }
}

fn keyword_orchestrator(
    fleet: Arc<VirtualFleet>,
) -> Orchestrator<VirtualFleet, KeywordIntentResolver, InMemoryPatternStore> {
    Orchestrator::new(
        fleet,
        KeywordIntentResolver,
        Arc::new(InMemoryPatternStore::default()),
        ZoneCoordinator::default(),
        test_config(),
    )
}

fn entity(id: &str) -> EntityId {
    EntityId::from(id)
}

#[tokio::test]
async fn should_execute_goal_against_demo_fleet() {
    let fleet = Arc::new(VirtualFleet::demo());
    let orchestrator = keyword_orchestrator(fleet.clone());

    let response = orchestrator
        .orchestrate(OrchestrationRequest::new("turn everything off"))
        .await
        .unwrap();

    assert_eq!(response.status, PlanStatus::Succeeded);
    // Three lights and the fan switch.
    assert_eq!(response.results.len(), 4);
    assert_eq!(
        fleet.snapshot_of(&entity("light.kitchen")).unwrap().state,
        "off"
    );
    assert_eq!(fleet.snapshot_of(&entity("switch.fan")).unwrap().state, "off");
}

#[tokio::test]
async fn should_learn_observed_states_from_successful_steps() {
    let fleet = Arc::new(VirtualFleet::demo());
    let orchestrator = keyword_orchestrator(fleet);

    orchestrator
        .orchestrate(OrchestrationRequest::new("turn the kitchen light on"))
        .await
        .unwrap();

    let predicted = orchestrator
        .patterns()
        .most_likely_state(&entity("light.kitchen"), ContextQuery::any())
        .await
        .unwrap();
    assert_eq!(predicted.as_deref(), Some("on"));
}

#[tokio::test]
async fn should_hold_unlock_for_confirmation_and_leave_fleet_untouched() {
    let fleet = Arc::new(VirtualFleet::demo());
    let orchestrator = keyword_orchestrator(fleet.clone());

    let result = orchestrator
        .orchestrate(OrchestrationRequest::new("unlock the front door"))
        .await;

    assert!(matches!(result, Err(EngineError::Safety(_))));
    assert_eq!(
        fleet.snapshot_of(&entity("lock.front_door")).unwrap().state,
        "locked"
    );
}

#[tokio::test]
async fn should_unlock_with_confirmation() {
    let fleet = Arc::new(VirtualFleet::demo());
    let orchestrator = keyword_orchestrator(fleet.clone());

    let response = orchestrator
        .orchestrate(
            OrchestrationRequest::new("unlock the front door").with_confirmation("token-1"),
        )
        .await
        .unwrap();

    assert_eq!(response.status, PlanStatus::Succeeded);
    assert_eq!(response.flagged_irreversible.len(), 1);
    assert_eq!(
        fleet.snapshot_of(&entity("lock.front_door")).unwrap().state,
        "unlocked"
    );
}

#[tokio::test]
async fn should_recover_from_transient_faults_within_retry_budget() {
    let fleet = Arc::new(VirtualFleet::demo());
    fleet.fail_transiently(&entity("switch.fan"), 2);
    let orchestrator = keyword_orchestrator(fleet.clone());

    let response = orchestrator
        .orchestrate(OrchestrationRequest::new("turn the fan on"))
        .await
        .unwrap();

    assert_eq!(response.status, PlanStatus::Succeeded);
    assert_eq!(response.results[0].attempts, 3);
    assert_eq!(fleet.snapshot_of(&entity("switch.fan")).unwrap().state, "on");
}

#[tokio::test]
async fn should_fail_step_against_unavailable_entity_and_finish_partial() {
    let fleet = Arc::new(VirtualFleet::demo());
    fleet.set_unavailable(&entity("switch.fan"), true);
    let orchestrator = keyword_orchestrator(fleet.clone());

    let response = orchestrator
        .orchestrate(OrchestrationRequest::new("turn everything off"))
        .await
        .unwrap();

    assert_eq!(response.status, PlanStatus::Partial);
    let fan = response
        .results
        .iter()
        .find(|r| r.entity_id.as_str() == "switch.fan")
        .unwrap();
    assert_eq!(fan.status, StepStatus::Failed);
    // The unavailable entity burned the whole retry budget.
    assert_eq!(fan.attempts, 3);
}

#[tokio::test]
async fn should_reject_cyclic_candidate_set_without_device_contact() {
    let fleet = Arc::new(VirtualFleet::demo());
    let mut first = CandidateOperation::builder()
        .entity_id("light.kitchen")
        .action("turn_on")
        .build()
        .unwrap();
    let mut second = CandidateOperation::builder()
        .entity_id("switch.fan")
        .action("turn_on")
        .build()
        .unwrap();
    first.after.push(second.id);
    second.after.push(first.id);

    let orchestrator = Orchestrator::new(
        fleet.clone(),
        ScriptedResolver(vec![first, second]),
        Arc::new(InMemoryPatternStore::default()),
        ZoneCoordinator::default(),
        test_config(),
    );

    let result = orchestrator
        .orchestrate(OrchestrationRequest::new("impossible ordering"))
        .await;

    assert!(matches!(result, Err(EngineError::Compilation(_))));
    assert_eq!(
        fleet.snapshot_of(&entity("light.kitchen")).unwrap().state,
        "off"
    );
}

#[tokio::test]
async fn should_resolve_cross_zone_conflict_towards_higher_priority() {
    let fleet = Arc::new(VirtualFleet::demo());
    let zones = vec![
        Zone::builder()
            .name("security")
            .priority(20)
            .entity("light.living_room")
            .build()
            .unwrap(),
        Zone::builder()
            .name("living_room")
            .priority(10)
            .entity("light.living_room")
            .build()
            .unwrap(),
    ];
    let winner = CandidateOperation::builder()
        .entity_id("light.living_room")
        .action("turn_on")
        .zone("security")
        .build()
        .unwrap();
    let loser = CandidateOperation::builder()
        .entity_id("light.living_room")
        .action("turn_off")
        .zone("living_room")
        .build()
        .unwrap();

    let orchestrator = Orchestrator::new(
        fleet.clone(),
        ScriptedResolver(vec![winner, loser]),
        Arc::new(InMemoryPatternStore::default()),
        ZoneCoordinator::new(zones),
        test_config(),
    );

    let response = orchestrator
        .orchestrate(OrchestrationRequest::new("light tug of war"))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].action, "turn_on");
    assert_eq!(response.discarded.len(), 1);
    assert_eq!(response.discarded[0].winning_zone, "security");
    assert_eq!(
        fleet.snapshot_of(&entity("light.living_room")).unwrap().state,
        "on"
    );
}

#[tokio::test]
async fn should_skip_pending_steps_once_deadline_elapses() {
    let fleet = Arc::new(VirtualFleet::demo());
    fleet.set_latency(&entity("light.kitchen"), Duration::from_millis(80));
    // Two operations on the same entity are chained, so the second is
    // still pending when the tight deadline fires mid-first-step.
    let first = CandidateOperation::builder()
        .entity_id("light.kitchen")
        .action("turn_on")
        .build()
        .unwrap();
    let second = CandidateOperation::builder()
        .entity_id("light.kitchen")
        .action("turn_off")
        .build()
        .unwrap();

    let orchestrator = Orchestrator::new(
        fleet,
        ScriptedResolver(vec![first, second]),
        Arc::new(InMemoryPatternStore::default()),
        ZoneCoordinator::default(),
        OrchestratorConfig {
            safety: SafetyGateConfig {
                per_step_budget: Duration::from_millis(30),
                max_deadline: Duration::from_millis(60),
            },
            ..test_config()
        },
    );

    let response = orchestrator
        .orchestrate(OrchestrationRequest::new("slow chain"))
        .await
        .unwrap();

    assert_eq!(response.status, PlanStatus::Partial);
    assert_eq!(response.results[0].status, StepStatus::Succeeded);
    assert_eq!(response.results[1].status, StepStatus::Skipped);
    assert_eq!(response.skipped(), vec![response.results[1].step_id]);
}

#[tokio::test]
async fn should_reach_same_outcome_regardless_of_concurrency() {
    // The terminal status and per-entity step statuses must not depend
    // on how many steps run in flight at once.
    let mut per_entity = Vec::new();
    for concurrency in [1, 4] {
        let fleet = Arc::new(VirtualFleet::demo());
        fleet.set_unavailable(&entity("switch.fan"), true);
        let orchestrator = Orchestrator::new(
            fleet,
            KeywordIntentResolver,
            Arc::new(InMemoryPatternStore::default()),
            ZoneCoordinator::default(),
            OrchestratorConfig {
                scheduler: SchedulerConfig {
                    concurrency,
                    step_timeout: Duration::from_millis(500),
                    backoff_base: Duration::from_millis(1),
                },
                ..OrchestratorConfig::default()
            },
        );

        let response = orchestrator
            .orchestrate(OrchestrationRequest::new("turn everything off"))
            .await
            .unwrap();

        assert_eq!(response.status, PlanStatus::Partial);
        let mut statuses: Vec<_> = response
            .results
            .iter()
            .map(|r| (r.entity_id.clone(), r.status))
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        per_entity.push(statuses);
    }
    assert_eq!(per_entity[0], per_entity[1]);
}

#[tokio::test]
async fn should_be_idempotent_across_repeated_goals() {
    let fleet = Arc::new(VirtualFleet::demo());
    let orchestrator = keyword_orchestrator(fleet.clone());

    for _ in 0..2 {
        let response = orchestrator
            .orchestrate(OrchestrationRequest::new("turn everything off"))
            .await
            .unwrap();
        assert_eq!(response.status, PlanStatus::Succeeded);
    }
    assert_eq!(
        fleet.snapshot_of(&entity("light.bedroom")).unwrap().state,
        "off"
    );
}
