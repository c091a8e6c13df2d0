//! Keyword intent resolver — deterministic goal-text parsing.
//!
//! Good enough to drive the demo fleet and the engine's tests without a
//! language model: verbs come from a fixed keyword table, targets from
//! domain matching plus entity-name mentions in the goal. A resolver
//! backed by something smarter plugs in behind the same port.

use weaver_domain::error::EngineError;
use weaver_domain::operation::CandidateOperation;
use weaver_domain::snapshot::{AttributeValue, EntitySnapshot};
use weaver_engine::ports::IntentResolver;

/// Brightness applied by dim-style goals.
const DIM_BRIGHTNESS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Verb {
    TurnOn,
    TurnOff,
    Dim,
    Lock,
    Unlock,
    SetTemperature(f64),
}

impl Verb {
    fn domains(self) -> &'static [&'static str] {
        match self {
            Self::TurnOn | Self::TurnOff => &["light", "switch"],
            Self::Dim => &["light"],
            Self::Lock | Self::Unlock => &["lock"],
            Self::SetTemperature(_) => &["climate"],
        }
    }
}

/// Maps goal text onto candidate operations via keyword rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordIntentResolver;

impl IntentResolver for KeywordIntentResolver {
    async fn resolve_goal(
        &self,
        goal: &str,
        snapshots: &[EntitySnapshot],
    ) -> Result<Vec<CandidateOperation>, EngineError> {
        let tokens = tokenize(goal);
        let verbs = detect_verbs(&tokens);
        if verbs.is_empty() {
            return Err(EngineError::Intent(format!(
                "no recognizable intent in goal '{goal}'"
            )));
        }

        let mut candidates = Vec::new();
        for verb in verbs {
            for (snapshot, named) in scope(snapshots, verb.domains(), &tokens) {
                let confidence = if named { 0.9 } else { 0.75 };
                let builder = CandidateOperation::builder()
                    .entity_id(snapshot.entity_id.clone())
                    .confidence(confidence);
                let builder = match verb {
                    Verb::TurnOn => builder.action("turn_on"),
                    Verb::TurnOff => builder.action("turn_off"),
                    Verb::Dim => builder
                        .action("set_brightness")
                        .param("brightness", AttributeValue::Int(DIM_BRIGHTNESS)),
                    Verb::Lock => builder.action("lock"),
                    Verb::Unlock => builder.action("unlock"),
                    Verb::SetTemperature(target) => builder
                        .action("set_temperature")
                        .param("temperature", AttributeValue::Float(target)),
                };
                candidates.push(builder.build()?);
            }
        }
        Ok(candidates)
    }
}

fn tokenize(goal: &str) -> Vec<String> {
    goal.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '.')
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn detect_verbs(tokens: &[String]) -> Vec<Verb> {
    let has = |word: &str| tokens.iter().any(|t| t == word);
    let mut verbs = Vec::new();
    let mut push = |verb: Verb| {
        if !verbs.contains(&verb) {
            verbs.push(verb);
        }
    };

    if has("unlock") {
        push(Verb::Unlock);
    }
    if has("lock") || has("secure") {
        push(Verb::Lock);
    }
    if has("dim") || has("movie") || has("relax") || has("cozy") {
        push(Verb::Dim);
    }
    if has("off") || has("dark") {
        push(Verb::TurnOff);
    }
    if has("on") || has("bright") {
        push(Verb::TurnOn);
    }
    if has("goodnight") || has("night") {
        push(Verb::TurnOff);
        push(Verb::Lock);
    }
    if has("degrees") || has("temperature") || has("thermostat") {
        if let Some(target) = tokens.iter().find_map(|t| t.parse::<f64>().ok()) {
            push(Verb::SetTemperature(target));
        }
    }
    verbs
}

/// Entities of the verb's domains, narrowed to the ones mentioned by
/// name when the goal names any. The flag says whether the entity was
/// mentioned explicitly.
fn scope<'a>(
    snapshots: &'a [EntitySnapshot],
    domains: &[&str],
    tokens: &[String],
) -> Vec<(&'a EntitySnapshot, bool)> {
    let in_domain: Vec<&EntitySnapshot> = snapshots
        .iter()
        .filter(|s| domains.contains(&s.domain()))
        .collect();
    let named: Vec<&EntitySnapshot> = in_domain
        .iter()
        .copied()
        .filter(|s| mentioned(s, tokens))
        .collect();
    if named.is_empty() {
        in_domain.into_iter().map(|s| (s, false)).collect()
    } else {
        named.into_iter().map(|s| (s, true)).collect()
    }
}

fn mentioned(snapshot: &EntitySnapshot, tokens: &[String]) -> bool {
    let Some((_, object)) = snapshot.entity_id.as_str().split_once('.') else {
        return false;
    };
    object
        .split('_')
        .filter(|word| word.len() > 2)
        .any(|word| tokens.iter().any(|t| t == word))
}
