//! Session resolution: which session/device the telemetry burst after the
//! gate belongs to.
//!
//! Two modes, selected by whether a device identifier is supplied
//! (learn-once, then reuse):
//! - **Known-device**: events are filtered to the given device and the
//!   session starting nearest at-or-after the gate is chosen.
//! - **Bootstrap**: no device filter; sessions are grouped from the raw
//!   burst and the winner's device key is persisted for future runs. A tie
//!   on all criteria is reported as `AmbiguousSession`, never guessed at.

use crate::error::{CorrelateError, Result};
use crate::models::Event;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Which resolution protocol produced a `SessionResolution`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    KnownDevice,
    Bootstrap,
}

/// Outcome of session resolution for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResolution {
    pub mode: ResolutionMode,
    /// Chosen session, when one could be determined
    pub session_key: Option<String>,
    /// Device identity: the configured key in known-device mode, the learned
    /// key in bootstrap mode
    pub device_key: Option<String>,
    /// First event timestamp of the chosen session
    pub first_event_ms: Option<u64>,
    /// Number of events in the chosen session's group
    pub event_count: usize,
}

/// Learned device identity persisted after a bootstrap run, reloadable to
/// drive future known-device runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    /// Gate timestamp of the run that learned this identity
    pub gate_video_ms: u64,
}

impl DeviceIdentity {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            .and_then(|json| std::fs::write(path, json));
        json.map_err(|source| CorrelateError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CorrelateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CorrelateError::Parse {
            path: path.display().to_string(),
            line: 1,
            source,
        })
    }
}

/// Per-session aggregate built from the post-gate event burst
#[derive(Debug)]
struct SessionGroup {
    first_event_ms: u64,
    event_count: usize,
    device_key: Option<String>,
}

fn group_by_session<'a>(
    events: impl Iterator<Item = &'a Event>,
) -> BTreeMap<&'a str, SessionGroup> {
    let mut groups: BTreeMap<&str, SessionGroup> = BTreeMap::new();
    for e in events {
        let Some(key) = e.session_key.as_deref() else {
            continue;
        };
        let group = groups.entry(key).or_insert(SessionGroup {
            first_event_ms: e.t_event_ms,
            event_count: 0,
            device_key: None,
        });
        group.first_event_ms = group.first_event_ms.min(e.t_event_ms);
        group.event_count += 1;
        if group.device_key.is_none() {
            group.device_key = e.device_key.clone();
        }
    }
    groups
}

/// Resolve the active session for a run.
///
/// `events` is the merged, time-ordered post-gate stream. `device_key`
/// selects known-device mode when present.
pub fn resolve_session(
    events: &[Event],
    gate_ms: u64,
    device_key: Option<&str>,
) -> Result<SessionResolution> {
    match device_key {
        Some(dk) => resolve_known_device(events, gate_ms, dk),
        None => resolve_bootstrap(events, gate_ms),
    }
}

fn resolve_known_device(events: &[Event], gate_ms: u64, device: &str) -> Result<SessionResolution> {
    // The telemetry query already filters by device; filter again so the
    // resolver is correct on its own.
    let groups = group_by_session(
        events
            .iter()
            .filter(|e| e.device_key.as_deref() == Some(device)),
    );

    // Closest-at-or-after the gate, ties by lowest first timestamp then by
    // session key for determinism.
    let chosen = groups
        .iter()
        .filter(|(_, g)| g.first_event_ms >= gate_ms)
        .min_by_key(|(key, g)| (g.first_event_ms, *key));

    match chosen {
        Some((key, group)) => {
            debug!(session_key = %key, first_event_ms = group.first_event_ms, "known-device session chosen");
            Ok(SessionResolution {
                mode: ResolutionMode::KnownDevice,
                session_key: Some((*key).to_string()),
                device_key: Some(device.to_string()),
                first_event_ms: Some(group.first_event_ms),
                event_count: group.event_count,
            })
        }
        // No session starts at or after the gate: pre-gate sessions are
        // stale, so keep the device filter but claim no session.
        None => Ok(SessionResolution {
            mode: ResolutionMode::KnownDevice,
            session_key: None,
            device_key: Some(device.to_string()),
            first_event_ms: None,
            event_count: 0,
        }),
    }
}

fn resolve_bootstrap(events: &[Event], gate_ms: u64) -> Result<SessionResolution> {
    let groups = group_by_session(events.iter());

    let mut candidates: Vec<(&str, &SessionGroup)> = groups
        .iter()
        .filter(|(_, g)| g.first_event_ms >= gate_ms)
        .map(|(k, g)| (*k, g))
        .collect();

    if candidates.is_empty() {
        info!("bootstrap: no keyed sessions at or after the gate");
        return Ok(SessionResolution {
            mode: ResolutionMode::Bootstrap,
            session_key: None,
            device_key: None,
            first_event_ms: None,
            event_count: 0,
        });
    }

    // Earliest first event wins; ties prefer the larger group. BTreeMap
    // iteration already orders equal candidates by session key.
    candidates.sort_by(|(ka, ga), (kb, gb)| {
        ga.first_event_ms
            .cmp(&gb.first_event_ms)
            .then(gb.event_count.cmp(&ga.event_count))
            .then(ka.cmp(kb))
    });

    let (best_key, best) = candidates[0];
    let tied: Vec<String> = candidates
        .iter()
        .filter(|(_, g)| {
            g.first_event_ms == best.first_event_ms && g.event_count == best.event_count
        })
        .map(|(k, _)| (*k).to_string())
        .collect();
    if tied.len() > 1 {
        return Err(CorrelateError::AmbiguousSession {
            candidates: tied,
            first_event_ms: best.first_event_ms,
            event_count: best.event_count,
        });
    }

    info!(
        session_key = best_key,
        device_key = ?best.device_key,
        first_event_ms = best.first_event_ms,
        "bootstrap: inferred session"
    );
    Ok(SessionResolution {
        mode: ResolutionMode::Bootstrap,
        session_key: Some(best_key.to_string()),
        device_key: best.device_key.clone(),
        first_event_ms: Some(best.first_event_ms),
        event_count: best.event_count,
    })
}
