//! App-open gate: the video timestamp at which the target application is
//! confirmed open.
//!
//! Telemetry queries are never issued before this point — attributing events
//! to a session that never opened would poison every downstream stage, so a
//! missing gate is fatal for the run.

use crate::config::RunConfig;
use crate::error::{CorrelateError, Result};
use crate::models::{Observation, UxState};
use tracing::debug;

/// Determine the video timestamp of confirmed application open.
///
/// An explicit override in the config wins unchanged (negative overrides are
/// a `Config` error). Otherwise the first `AppOpen` observation is used;
/// absent that state entirely, the first non-`Unknown` observation whose
/// confidence meets the configured threshold.
pub fn detect_app_open(observations: &[Observation], cfg: &RunConfig) -> Result<u64> {
    if let Some(override_ms) = cfg.app_open_video_ms {
        if override_ms < 0 {
            return Err(CorrelateError::Config(format!(
                "app_open_video_ms override must be non-negative, got {override_ms}"
            )));
        }
        debug!(override_ms, "gate: using explicit app-open override");
        return Ok(override_ms as u64);
    }

    if let Some(obs) = observations.iter().find(|o| o.state == UxState::AppOpen) {
        debug!(t_video_ms = obs.t_video_ms, "gate: found app_open observation");
        return Ok(obs.t_video_ms);
    }

    // No APP_OPEN classification anywhere: fall back to the first confident
    // non-idle observation.
    if let Some(obs) = observations.iter().find(|o| {
        o.state != UxState::Unknown && o.confidence >= cfg.gate_confidence_threshold
    }) {
        debug!(
            t_video_ms = obs.t_video_ms,
            state = %obs.state,
            confidence = obs.confidence,
            "gate: falling back to first confident non-unknown observation"
        );
        return Ok(obs.t_video_ms);
    }

    Err(CorrelateError::GateNotFound {
        observation_count: observations.len(),
        last_t_video_ms: observations.last().map(|o| o.t_video_ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RunConfig {
        RunConfig::default()
    }

    #[test]
    fn test_override_returned_unchanged() {
        let cfg = RunConfig {
            app_open_video_ms: Some(1234),
            ..Default::default()
        };
        // Observations are ignored entirely under an override
        let obs = vec![Observation::new(0, UxState::AppOpen, 1.0)];
        assert_eq!(detect_app_open(&obs, &cfg).unwrap(), 1234);
    }

    #[test]
    fn test_negative_override_is_config_error() {
        let cfg = RunConfig {
            app_open_video_ms: Some(-1),
            ..Default::default()
        };
        let err = detect_app_open(&[], &cfg).unwrap_err();
        assert!(matches!(err, CorrelateError::Config(_)));
    }

    #[test]
    fn test_first_app_open_wins() {
        let obs = vec![
            Observation::new(0, UxState::Unknown, 0.2),
            Observation::new(500, UxState::AppOpen, 0.9),
            Observation::new(800, UxState::AppOpen, 1.0),
        ];
        assert_eq!(detect_app_open(&obs, &cfg()).unwrap(), 500);
    }

    #[test]
    fn test_confidence_fallback_without_app_open() {
        let obs = vec![
            Observation::new(0, UxState::Unknown, 1.0),
            Observation::new(400, UxState::Home, 0.3), // below threshold
            Observation::new(900, UxState::Playback, 0.7),
        ];
        assert_eq!(detect_app_open(&obs, &cfg()).unwrap(), 900);
    }

    #[test]
    fn test_fallback_respects_configured_threshold() {
        let cfg = RunConfig {
            gate_confidence_threshold: 0.25,
            ..Default::default()
        };
        let obs = vec![
            Observation::new(0, UxState::Unknown, 1.0),
            Observation::new(400, UxState::Home, 0.3),
        ];
        assert_eq!(detect_app_open(&obs, &cfg).unwrap(), 400);
    }

    #[test]
    fn test_gate_not_found_carries_context() {
        let obs = vec![
            Observation::new(0, UxState::Unknown, 1.0),
            Observation::new(1000, UxState::Unknown, 1.0),
        ];
        let err = detect_app_open(&obs, &cfg()).unwrap_err();
        match err {
            CorrelateError::GateNotFound {
                observation_count,
                last_t_video_ms,
            } => {
                assert_eq!(observation_count, 2);
                assert_eq!(last_t_video_ms, Some(1000));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_observations_gate_not_found() {
        let err = detect_app_open(&[], &cfg()).unwrap_err();
        assert!(matches!(err, CorrelateError::GateNotFound { .. }));
    }
}
