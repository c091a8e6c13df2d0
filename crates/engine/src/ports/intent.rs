//! Intent-resolution port — free-form goal text to ranked candidates.
//!
//! The engine never embeds language-understanding logic; this boundary
//! keeps the capability pluggable so tests can use deterministic fakes.

use std::future::Future;

use weaver_domain::error::EngineError;
use weaver_domain::operation::CandidateOperation;
use weaver_domain::snapshot::EntitySnapshot;

/// External capability that maps a goal onto concrete device operations.
pub trait IntentResolver: Send + Sync {
    /// Resolve `goal` against the current fleet snapshots into a ranked
    /// candidate list (highest rank first).
    fn resolve_goal(
        &self,
        goal: &str,
        snapshots: &[EntitySnapshot],
    ) -> impl Future<Output = Result<Vec<CandidateOperation>, EngineError>> + Send;
}
