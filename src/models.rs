//! Timeline Store: the immutable record types shared by every stage of a
//! correlation run.
//!
//! A run owns one `Observation` sequence (screen truth, produced by the
//! external vision pipeline) and one `Event` sequence (telemetry claims,
//! produced by adapters). Everything downstream — `Alignment`, `Match`,
//! `Finding` — is addressable by stable integer index into those two
//! sequences so report/evidence collaborators can resolve references
//! without re-running correlation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Screen-derived UX state as classified by the upstream vision pipeline.
///
/// The matcher treats these as opaque labels except for the reserved
/// `AppOpen` (gate detection) and whatever the run config lists as idle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum UxState {
    #[default]
    Unknown,
    Home,
    AppOpen,
    Browse,
    Playback,
    Buffering,
    Ad,
    Paused,
    Error,
}

impl fmt::Display for UxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UxState::Unknown => "unknown",
            UxState::Home => "home",
            UxState::AppOpen => "app_open",
            UxState::Browse => "browse",
            UxState::Playback => "playback",
            UxState::Buffering => "buffering",
            UxState::Ad => "ad",
            UxState::Paused => "paused",
            UxState::Error => "error",
        };
        f.write_str(s)
    }
}

/// A single screen observation at a video timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Video-clock timestamp in milliseconds
    pub t_video_ms: u64,
    /// Classified UX state for this frame window
    #[serde(default)]
    pub state: UxState,
    /// Classifier confidence in [0, 1]
    #[serde(default)]
    pub confidence: f64,
    /// Auxiliary classifier signals (motion score, OCR keywords, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub signals: BTreeMap<String, Value>,
}

impl Observation {
    pub fn new(t_video_ms: u64, state: UxState, confidence: f64) -> Self {
        Self {
            t_video_ms,
            state,
            confidence,
            signals: BTreeMap::new(),
        }
    }
}

/// A vendor-agnostic normalized telemetry event.
///
/// Adapters keep the unmodified vendor payload under `raw` and surface
/// safe-to-share fields in `metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event-clock timestamp in milliseconds
    pub t_event_ms: u64,
    /// Coarse event kind (e.g., session_start, playback, error, heartbeat)
    pub kind: String,
    /// Ephemeral session/visit identifier, if available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    /// Stable device identifier, if available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw: BTreeMap<String, Value>,
}

impl Event {
    pub fn new(t_event_ms: u64, kind: impl Into<String>) -> Self {
        Self {
            t_event_ms,
            kind: kind.into(),
            session_key: None,
            device_key: None,
            metadata: BTreeMap::new(),
            raw: BTreeMap::new(),
        }
    }

    pub fn with_session(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    pub fn with_device(mut self, device_key: impl Into<String>) -> Self {
        self.device_key = Some(device_key.into());
        self
    }
}

/// An Observation/Event pair independently known to denote the same
/// real-world instant, used to fit the `Alignment`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnchorPair {
    pub observation_index: usize,
    pub event_index: usize,
    pub t_video_ms: u64,
    pub t_event_ms: u64,
}

/// The fitted time mapping between the video clock and the event clock.
///
/// Mapping law: `event_ms ≈ video_ms + offset_ms + video_ms * drift_ppm / 1e6`.
/// Exactly one `Alignment` exists per run; it is immutable after the fit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Alignment {
    /// Constant clock offset in milliseconds
    pub offset_ms: i64,
    /// Linear clock-rate error in parts-per-million
    pub drift_ppm: f64,
    /// Number of anchor pairs the fit consumed
    pub anchor_count: usize,
    /// Root-mean-square residual of the fit, in milliseconds
    pub residual_ms: f64,
}

impl Alignment {
    /// Estimate the event-clock time for a video-clock time.
    pub fn video_to_event(&self, video_ms: u64) -> i64 {
        let v = video_ms as f64;
        (v + self.offset_ms as f64 + v * self.drift_ppm / 1e6).round() as i64
    }

    /// Estimate the video-clock time for an event-clock time (inverse law).
    ///
    /// The result may be negative when the event precedes the start of the
    /// video clock.
    pub fn event_to_video(&self, event_ms: u64) -> i64 {
        ((event_ms as f64 - self.offset_ms as f64) / (1.0 + self.drift_ppm / 1e6)).round() as i64
    }
}

/// Outcome of matching one event (or one residual observation) against the
/// screen timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    /// Event confirmed by a same-state observation within the window
    Matched,
    /// Event claims a state the screen never showed nearby
    UnmatchedEvent,
    /// Screen changed but telemetry said nothing
    UnmatchedObservation,
    /// Telemetry claims a state the screen disproves at that time
    Contradicted,
}

/// One match decision. Every event yields exactly one; residual unmatched
/// observations yield one each after the event pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    /// Index into the run's event sequence; `None` only for
    /// `UnmatchedObservation` records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_index: Option<usize>,
    /// Index into the run's observation sequence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation_index: Option<usize>,
    /// Signed difference between estimated and actual observation time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_ms: Option<i64>,
    pub outcome: MatchOutcome,
}

/// Finding severity. Mismatches are the product of this tool, not failures,
/// so even `Error` findings never abort a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("INFO"),
            Severity::Warn => f.write_str("WARN"),
            Severity::Error => f.write_str("ERROR"),
        }
    }
}

/// A severity-graded, evidence-linked statement about a discrepancy between
/// telemetry and the screen timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_index: Option<usize>,
    /// Opaque evidence references (frame filenames, object keys) supplied by
    /// the report collaborator; the core never inspects them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ux_state_serde_snake_case() {
        let json = serde_json::to_string(&UxState::AppOpen).unwrap();
        assert_eq!(json, "\"app_open\"");
        let back: UxState = serde_json::from_str("\"playback\"").unwrap();
        assert_eq!(back, UxState::Playback);
    }

    #[test]
    fn test_observation_defaults_from_sparse_json() {
        let obs: Observation = serde_json::from_str(r#"{"t_video_ms": 1500}"#).unwrap();
        assert_eq!(obs.t_video_ms, 1500);
        assert_eq!(obs.state, UxState::Unknown);
        assert_eq!(obs.confidence, 0.0);
        assert!(obs.signals.is_empty());
    }

    #[test]
    fn test_event_builder_keys() {
        let e = Event::new(100, "session_start")
            .with_session("s-1")
            .with_device("d-1");
        assert_eq!(e.session_key.as_deref(), Some("s-1"));
        assert_eq!(e.device_key.as_deref(), Some("d-1"));
    }

    #[test]
    fn test_alignment_identity_mapping() {
        let aln = Alignment {
            offset_ms: 0,
            drift_ppm: 0.0,
            anchor_count: 1,
            residual_ms: 0.0,
        };
        assert_eq!(aln.video_to_event(12_345), 12_345);
        assert_eq!(aln.event_to_video(12_345), 12_345);
    }

    #[test]
    fn test_alignment_offset_and_drift_mapping() {
        let aln = Alignment {
            offset_ms: 50,
            drift_ppm: 1000.0, // 1ms gained per second of video
            anchor_count: 2,
            residual_ms: 0.0,
        };
        // 10s of video: 10_000 + 50 + 10ms drift
        assert_eq!(aln.video_to_event(10_000), 10_060);
        // Inverse maps back within rounding
        let video = aln.event_to_video(10_060);
        assert!((video - 10_000).abs() <= 1, "got {}", video);
    }

    #[test]
    fn test_alignment_inverse_can_go_negative() {
        let aln = Alignment {
            offset_ms: 5_000,
            drift_ppm: 0.0,
            anchor_count: 1,
            residual_ms: 0.0,
        };
        assert_eq!(aln.event_to_video(1_000), -4_000);
    }

    #[test]
    fn test_match_serialization_skips_none() {
        let m = Match {
            event_index: None,
            observation_index: Some(3),
            delta_ms: None,
            outcome: MatchOutcome::UnmatchedObservation,
        };
        let json = serde_json::to_string(&m).unwrap();
        assert!(!json.contains("event_index"));
        assert!(json.contains("unmatched_observation"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
    }
}
