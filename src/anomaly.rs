//! Anomaly rules engine: a stateless, pure mapping from match outcomes to
//! severity-graded findings.
//!
//! Each match is evaluated independently, so evaluation order never affects
//! results:
//!
//! | outcome               | condition                | severity |
//! |-----------------------|--------------------------|----------|
//! | Matched               | within warn threshold    | none     |
//! | Matched               | beyond warn threshold    | INFO     |
//! | Contradicted          | always                   | ERROR    |
//! | UnmatchedEvent        | always                   | WARN     |
//! | UnmatchedObservation  | always                   | WARN     |
//!
//! Evidence strings are opaque references supplied by the report
//! collaborator; the core only forwards them.

use crate::config::RunConfig;
use crate::models::{Event, Finding, Match, MatchOutcome, Observation, Severity};

/// Resolves opaque evidence references (frame files, object keys) for an
/// observation window. Implemented by the report/export collaborator.
pub trait EvidenceProvider {
    fn evidence_for(&self, observation_index: usize) -> Vec<String>;
}

/// Provider used when no report collaborator is attached
pub struct NoEvidence;

impl EvidenceProvider for NoEvidence {
    fn evidence_for(&self, _observation_index: usize) -> Vec<String> {
        Vec::new()
    }
}

/// Map one match to zero or one finding
pub fn finding_for_match(
    m: &Match,
    observations: &[Observation],
    events: &[Event],
    cfg: &RunConfig,
    evidence: &dyn EvidenceProvider,
) -> Option<Finding> {
    let kind = m
        .event_index
        .and_then(|i| events.get(i))
        .map(|e| e.kind.as_str());
    let obs = m.observation_index.and_then(|i| observations.get(i));

    let (severity, title, description) = match m.outcome {
        MatchOutcome::Matched => {
            let delta = m.delta_ms.unwrap_or(0);
            if delta.unsigned_abs() <= cfg.warn_threshold_ms {
                return None;
            }
            let kind = kind.unwrap_or("?");
            (
                Severity::Info,
                format!("Timing variance: {kind}"),
                format!(
                    "Event `{kind}` matched the screen state {delta}ms from its estimated \
                     time (warn threshold {}ms). Timing variance, not a correctness bug.",
                    cfg.warn_threshold_ms
                ),
            )
        }
        MatchOutcome::Contradicted => {
            let kind = kind.unwrap_or("?");
            let expected = cfg.kind_to_state.get(kind);
            let seen = obs.map(|o| o.state);
            (
                Severity::Error,
                format!("Contradiction: {kind}"),
                format!(
                    "Telemetry event `{kind}` claims state `{}` but the screen showed `{}` \
                     at the estimated time (delta {}ms).",
                    expected.map(|s| s.to_string()).unwrap_or_else(|| "?".into()),
                    seen.map(|s| s.to_string()).unwrap_or_else(|| "?".into()),
                    m.delta_ms.unwrap_or(0),
                ),
            )
        }
        MatchOutcome::UnmatchedEvent => {
            let kind = kind.unwrap_or("?");
            let t = m.event_index.and_then(|i| events.get(i)).map(|e| e.t_event_ms);
            (
                Severity::Warn,
                format!("Unconfirmed event: {kind}"),
                format!(
                    "Event `{kind}` at t_event_ms={} has no visual confirmation within the \
                     match window.",
                    t.map(|t| t.to_string()).unwrap_or_else(|| "?".into()),
                ),
            )
        }
        MatchOutcome::UnmatchedObservation => {
            let (state, t) = obs
                .map(|o| (o.state.to_string(), o.t_video_ms.to_string()))
                .unwrap_or_else(|| ("?".into(), "?".into()));
            (
                Severity::Warn,
                format!("Unreported screen change: {state}"),
                format!(
                    "Screen showed `{state}` at t_video_ms={t} with no telemetry event \
                     nearby."
                ),
            )
        }
    };

    let evidence = m.observation_index.and_then(|i| {
        let refs = evidence.evidence_for(i);
        (!refs.is_empty()).then_some(refs)
    });

    Some(Finding {
        severity,
        title,
        description,
        observation_index: m.observation_index,
        event_index: m.event_index,
        evidence,
    })
}

/// Evaluate the rules table over an ordered match sequence
pub fn findings_from_matches(
    matches: &[Match],
    observations: &[Observation],
    events: &[Event],
    cfg: &RunConfig,
    evidence: &dyn EvidenceProvider,
) -> Vec<Finding> {
    matches
        .iter()
        .filter_map(|m| finding_for_match(m, observations, events, cfg, evidence))
        .collect()
}
