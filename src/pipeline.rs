//! The correlation pipeline: one offline pass per session/run.
//!
//! Gate → fetch/merge telemetry → session resolution → anchor collection →
//! alignment fit → matching → anomaly rules. The pipeline owns its
//! Observation/Event sequences exclusively, performs all I/O up front
//! through the adapter contract, and returns a serializable report whose
//! matches and findings are addressable by index into the sequences it
//! carries.

use crate::adapter::{merge_adapter_events, EventAdapter, EventQuery, OmissionReason};
use crate::align::fit_alignment;
use crate::anomaly::{findings_from_matches, EvidenceProvider};
use crate::config::RunConfig;
use crate::error::Result;
use crate::gate::detect_app_open;
use crate::matcher::match_events;
use crate::models::{Alignment, AnchorPair, Event, Finding, Match, Observation, Severity};
use crate::session::{resolve_session, DeviceIdentity, ResolutionMode, SessionResolution};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Everything a report/export collaborator needs to render a run without
/// re-running correlation
#[derive(Debug, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub gate_video_ms: u64,
    pub session: SessionResolution,
    pub alignment: Alignment,
    /// The observation sequence the indices refer to
    pub observations: Vec<Observation>,
    /// The post-gate, session-filtered event sequence the indices refer to
    pub events: Vec<Event>,
    pub matches: Vec<Match>,
    pub findings: Vec<Finding>,
}

/// Pair anchor-kind events with anchor-state observations.
///
/// For each configured `kind → state` anchor mapping, the earliest event of
/// that kind is paired with the earliest observation of that state. The
/// estimator itself never searches for anchors.
pub fn collect_anchor_pairs(
    observations: &[Observation],
    events: &[Event],
    cfg: &RunConfig,
) -> Vec<AnchorPair> {
    let mut anchors = Vec::new();
    for (kind, state) in &cfg.anchor_kinds {
        let event = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == *kind)
            .min_by_key(|(i, e)| (e.t_event_ms, *i));
        let observation = observations
            .iter()
            .enumerate()
            .find(|(_, o)| o.state == *state);
        if let (Some((event_index, e)), Some((observation_index, o))) = (event, observation) {
            anchors.push(AnchorPair {
                observation_index,
                event_index,
                t_video_ms: o.t_video_ms,
                t_event_ms: e.t_event_ms,
            });
        }
    }
    anchors
}

fn omission_findings(omissions: &[crate::adapter::AdapterOmission]) -> Vec<Finding> {
    omissions
        .iter()
        .map(|o| {
            let why = match &o.reason {
                OmissionReason::TimedOut => "timed out".to_string(),
                OmissionReason::Failed(e) => format!("failed: {e}"),
            };
            Finding {
                severity: Severity::Info,
                title: format!("Partial telemetry: {}", o.adapter),
                description: format!(
                    "Adapter `{}` {why}; the run continued with partial telemetry.",
                    o.adapter
                ),
                observation_index: None,
                event_index: None,
                evidence: None,
            }
        })
        .collect()
}

/// Run one full correlation pass.
///
/// Fatal conditions (bad config, no gate, no anchors, ambiguous session)
/// abort with a typed error; everything else is reported as findings.
pub fn run_correlation(
    observations: Vec<Observation>,
    adapters: Vec<Box<dyn EventAdapter>>,
    cfg: &RunConfig,
    evidence: &dyn EvidenceProvider,
) -> Result<CorrelationReport> {
    cfg.validate()?;

    let gate_video_ms = detect_app_open(&observations, cfg)?;
    info!(gate_video_ms, "gate established");

    // Nothing queries telemetry before the gate; that is the gate's entire
    // purpose.
    let query = EventQuery {
        time_start_ms: gate_video_ms,
        time_end_ms: cfg.query_end_ms.unwrap_or(u64::MAX),
        device_key: cfg.device_key.clone(),
    };
    let timeout = Duration::from_millis(cfg.adapter_timeout_ms);
    let (merged, omissions) = merge_adapter_events(adapters, &query, timeout);
    info!(
        event_count = merged.len(),
        omitted_adapters = omissions.len(),
        "telemetry merged"
    );

    let session = resolve_session(&merged, gate_video_ms, cfg.device_key.as_deref())?;

    // Keep the resolved session's events plus keyless events, which cannot
    // be attributed to any other session.
    let events: Vec<Event> = match &session.session_key {
        Some(sk) => merged
            .into_iter()
            .filter(|e| match &e.session_key {
                Some(key) => key == sk,
                None => true,
            })
            .collect(),
        None => merged,
    };

    if session.mode == ResolutionMode::Bootstrap {
        if let (Some(device_key), Some(path)) = (&session.device_key, &cfg.identity_file) {
            let identity = DeviceIdentity {
                device_key: device_key.clone(),
                session_key: session.session_key.clone(),
                gate_video_ms,
            };
            if let Err(e) = identity.save(path) {
                warn!(error = %e, "failed to persist device identity");
            }
        }
    }

    let anchors = collect_anchor_pairs(&observations, &events, cfg);
    let alignment = fit_alignment(&anchors)?;

    let mut findings = omission_findings(&omissions);
    if alignment.residual_ms > cfg.alignment_residual_tolerance_ms as f64 {
        findings.push(Finding {
            severity: Severity::Warn,
            title: "Alignment residual above tolerance".to_string(),
            description: format!(
                "Alignment fit over {} anchors has RMS residual {:.1}ms \
                 (tolerance {}ms); match results carry reduced confidence.",
                alignment.anchor_count, alignment.residual_ms, cfg.alignment_residual_tolerance_ms
            ),
            observation_index: anchors.first().map(|a| a.observation_index),
            event_index: anchors.first().map(|a| a.event_index),
            evidence: None,
        });
    }

    let matches = match_events(&observations, &events, &alignment, cfg);
    findings.extend(findings_from_matches(
        &matches,
        &observations,
        &events,
        cfg,
        evidence,
    ));

    info!(
        match_count = matches.len(),
        finding_count = findings.len(),
        "correlation complete"
    );
    Ok(CorrelationReport {
        gate_video_ms,
        session,
        alignment,
        observations,
        events,
        matches,
        findings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UxState;

    fn obs(t: u64, state: UxState) -> Observation {
        Observation::new(t, state, 1.0)
    }

    #[test]
    fn test_collect_anchor_pairs_earliest_of_each_side() {
        let observations = vec![
            obs(0, UxState::Unknown),
            obs(200, UxState::AppOpen),
            obs(900, UxState::AppOpen), // later app_open ignored
        ];
        let events = vec![
            Event::new(500, "heartbeat"),
            Event::new(700, "session_start"),
            Event::new(1500, "session_start"), // later anchor ignored
        ];
        let anchors = collect_anchor_pairs(&observations, &events, &RunConfig::default());
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].observation_index, 1);
        assert_eq!(anchors[0].event_index, 1);
        assert_eq!(anchors[0].t_video_ms, 200);
        assert_eq!(anchors[0].t_event_ms, 700);
    }

    #[test]
    fn test_collect_anchor_pairs_missing_side_yields_none() {
        let observations = vec![obs(0, UxState::Playback)];
        let events = vec![Event::new(100, "heartbeat")];
        let anchors = collect_anchor_pairs(&observations, &events, &RunConfig::default());
        assert!(anchors.is_empty());
    }

    #[test]
    fn test_multiple_anchor_kinds_enable_drift_fit() {
        let cfg = RunConfig {
            anchor_kinds: [
                ("session_start".to_string(), UxState::AppOpen),
                ("playback".to_string(), UxState::Playback),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        let observations = vec![obs(0, UxState::AppOpen), obs(60_000, UxState::Playback)];
        let events = vec![
            Event::new(1000, "session_start"),
            Event::new(61_060, "playback"),
        ];
        let anchors = collect_anchor_pairs(&observations, &events, &cfg);
        assert_eq!(anchors.len(), 2);
        let alignment = fit_alignment(&anchors).unwrap();
        assert_eq!(alignment.anchor_count, 2);
        assert_eq!(alignment.offset_ms, 1000);
        assert!((alignment.drift_ppm - 1000.0).abs() < 1.0);
    }
}
