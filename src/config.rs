//! Run configuration: the enumerated tuning surface for one correlation run.
//!
//! Loaded from TOML with serde defaults so a minimal config file (or none at
//! all) yields a working run. `validate()` catches contradictory settings
//! before any processing starts.

use crate::error::{CorrelateError, Result};
use crate::models::UxState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Configuration for one correlation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Explicit gate override: skip APP_OPEN detection and use this video
    /// timestamp. Negative values are rejected by `validate()`.
    pub app_open_video_ms: Option<i64>,

    /// Stable device identifier; when present the resolver runs in
    /// known-device mode and the telemetry query is filtered to this device
    pub device_key: Option<String>,

    /// Tolerance window around the inverse-mapped event time when searching
    /// for a same-state observation
    pub match_window_ms: u64,

    /// Window used for the contradiction check; falls back to
    /// `match_window_ms` when unset
    pub contradiction_window_ms: Option<u64>,

    /// Matched events further than this from their observation are surfaced
    /// as timing-variance findings
    pub warn_threshold_ms: u64,

    /// Alignment fits with RMS residual above this yield a warning finding
    /// (never a hard failure)
    pub alignment_residual_tolerance_ms: u64,

    /// Event kind → expected UX state table driving the matcher
    pub kind_to_state: BTreeMap<String, UxState>,

    /// Event kind → UX state pairs used as alignment anchors
    pub anchor_kinds: BTreeMap<String, UxState>,

    /// States considered idle; residual observations in these states are not
    /// reported as unmatched
    pub idle_states: BTreeSet<UxState>,

    /// Minimum classifier confidence for the gate's non-APP_OPEN fallback
    pub gate_confidence_threshold: f64,

    /// Per-adapter fetch timeout for the merge join
    pub adapter_timeout_ms: u64,

    /// Upper bound of the telemetry query window; unbounded when unset
    pub query_end_ms: Option<u64>,

    /// Where bootstrap mode persists the learned device identity
    pub identity_file: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            app_open_video_ms: None,
            device_key: None,
            match_window_ms: 1000,
            contradiction_window_ms: None,
            warn_threshold_ms: 1000,
            alignment_residual_tolerance_ms: 2000,
            kind_to_state: default_kind_to_state(),
            anchor_kinds: default_anchor_kinds(),
            idle_states: default_idle_states(),
            gate_confidence_threshold: 0.6,
            adapter_timeout_ms: 30_000,
            query_end_ms: None,
            identity_file: None,
        }
    }
}

fn default_kind_to_state() -> BTreeMap<String, UxState> {
    [
        ("playback".to_string(), UxState::Playback),
        ("buffering".to_string(), UxState::Buffering),
        ("ad".to_string(), UxState::Ad),
        ("pause".to_string(), UxState::Paused),
        ("error".to_string(), UxState::Error),
    ]
    .into_iter()
    .collect()
}

fn default_anchor_kinds() -> BTreeMap<String, UxState> {
    [("session_start".to_string(), UxState::AppOpen)]
        .into_iter()
        .collect()
}

fn default_idle_states() -> BTreeSet<UxState> {
    [UxState::Unknown].into_iter().collect()
}

impl RunConfig {
    /// Load a run config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CorrelateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let cfg: Self = toml::from_str(&text)
            .map_err(|e| CorrelateError::Config(format!("{}: {}", path.display(), e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject invalid or contradictory settings before any processing
    pub fn validate(&self) -> Result<()> {
        if let Some(ms) = self.app_open_video_ms {
            if ms < 0 {
                return Err(CorrelateError::Config(format!(
                    "app_open_video_ms must be non-negative, got {ms}"
                )));
            }
        }
        if self.match_window_ms == 0 {
            return Err(CorrelateError::Config(
                "match_window_ms must be positive".to_string(),
            ));
        }
        if let Some(w) = self.contradiction_window_ms {
            if w == 0 {
                return Err(CorrelateError::Config(
                    "contradiction_window_ms must be positive when set".to_string(),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.gate_confidence_threshold) {
            return Err(CorrelateError::Config(format!(
                "gate_confidence_threshold must be in [0, 1], got {}",
                self.gate_confidence_threshold
            )));
        }
        if self.adapter_timeout_ms == 0 {
            return Err(CorrelateError::Config(
                "adapter_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective contradiction window
    pub fn contradiction_window(&self) -> u64 {
        self.contradiction_window_ms.unwrap_or(self.match_window_ms)
    }
}
