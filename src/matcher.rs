//! The matcher: decide, per telemetry event, what the screen actually
//! showed at the time the event claims.
//!
//! Each event is inverse-mapped onto the video clock through the fitted
//! `Alignment`, then compared against the observation timeline:
//! - a same-state observation inside the match window confirms the event;
//! - an observation of an unrelated, non-idle state inside the
//!   contradiction window disproves it;
//! - otherwise the event is unconfirmed. The claimed state seen outside the
//!   match tolerance never counts as a contradiction, and neither does an
//!   idle frame the classifier could not read.
//!
//! After the event pass, non-idle observations no event touched are
//! reported as unmatched (screen changed, telemetry said nothing).
//!
//! Observation starts are binary-searched, so the pass is O(E log O).
//! Tie-breaks are fixed: smallest absolute delta, then the earlier
//! observation index.

use crate::config::RunConfig;
use crate::models::{Alignment, Event, Match, MatchOutcome, Observation};
use tracing::trace;

/// Index over observation start times for windowed lookups
struct ObservationIndex<'a> {
    observations: &'a [Observation],
    starts: Vec<i64>,
}

impl<'a> ObservationIndex<'a> {
    fn new(observations: &'a [Observation]) -> Self {
        debug_assert!(
            observations.windows(2).all(|w| w[0].t_video_ms <= w[1].t_video_ms),
            "observation sequence must be time-ordered"
        );
        let starts = observations.iter().map(|o| o.t_video_ms as i64).collect();
        Self {
            observations,
            starts,
        }
    }

    /// The observation whose `[t_video_ms, next.t_video_ms)` interval
    /// contains `est`. The last interval is unbounded on the right.
    fn interval_containing(&self, est: i64) -> Option<usize> {
        let after = self.starts.partition_point(|&s| s <= est);
        after.checked_sub(1)
    }

    /// Closest observation with start within `±window` of `est` that passes
    /// `accept`. Ties on |delta| resolve to the earlier index.
    fn closest_in_window<F>(&self, est: i64, window: u64, mut accept: F) -> Option<(usize, i64)>
    where
        F: FnMut(&Observation) -> bool,
    {
        let lo = self.starts.partition_point(|&s| s < est - window as i64);
        let hi = self.starts.partition_point(|&s| s <= est + window as i64);

        let mut best: Option<(usize, i64)> = None;
        for idx in lo..hi {
            if !accept(&self.observations[idx]) {
                continue;
            }
            let delta = est - self.starts[idx];
            match best {
                Some((_, best_delta)) if delta.abs() >= best_delta.abs() => {}
                _ => best = Some((idx, delta)),
            }
        }
        best
    }
}

/// Produce one `Match` per event, followed by residual unmatched-observation
/// records, all addressable by index into the input sequences.
///
/// `events` must be time-ordered; the pipeline sorts the merged adapter
/// output before calling this.
pub fn match_events(
    observations: &[Observation],
    events: &[Event],
    alignment: &Alignment,
    cfg: &RunConfig,
) -> Vec<Match> {
    let index = ObservationIndex::new(observations);
    let mut matches = Vec::with_capacity(events.len());
    let mut referenced = vec![false; observations.len()];

    for (event_index, event) in events.iter().enumerate() {
        let est = alignment.event_to_video(event.t_event_ms);
        let expected = cfg.kind_to_state.get(&event.kind).copied();
        trace!(event_index, kind = %event.kind, est, ?expected, "matching event");

        let m = match expected {
            Some(state) => match index.closest_in_window(est, cfg.match_window_ms, |o| {
                o.state == state
            }) {
                Some((obs_index, delta)) => Match {
                    event_index: Some(event_index),
                    observation_index: Some(obs_index),
                    delta_ms: Some(delta),
                    outcome: MatchOutcome::Matched,
                },
                None => {
                    // Only a readable observation of an unrelated state
                    // disproves the claim: the claimed state (late, outside
                    // the match tolerance) and idle states are not evidence
                    // against it.
                    let contradiction = index.closest_in_window(
                        est,
                        cfg.contradiction_window(),
                        |o| o.state != state && !cfg.idle_states.contains(&o.state),
                    );
                    match contradiction {
                        Some((obs_index, delta)) => Match {
                            event_index: Some(event_index),
                            observation_index: Some(obs_index),
                            delta_ms: Some(delta),
                            outcome: MatchOutcome::Contradicted,
                        },
                        None => Match {
                            event_index: Some(event_index),
                            observation_index: None,
                            delta_ms: None,
                            outcome: MatchOutcome::UnmatchedEvent,
                        },
                    }
                }
            },
            // Unmapped kind: no expected state, so no contradiction is
            // possible. Prefer the interval-containing observation when it
            // lies inside the window, else the closest one.
            None => {
                let interval = index
                    .interval_containing(est)
                    .map(|i| (i, est - index.starts[i]))
                    .filter(|(_, delta)| delta.unsigned_abs() <= cfg.match_window_ms);
                match interval
                    .or_else(|| index.closest_in_window(est, cfg.match_window_ms, |_| true))
                {
                    Some((obs_index, delta)) => Match {
                        event_index: Some(event_index),
                        observation_index: Some(obs_index),
                        delta_ms: Some(delta),
                        outcome: MatchOutcome::Matched,
                    },
                    None => Match {
                        event_index: Some(event_index),
                        observation_index: None,
                        delta_ms: None,
                        outcome: MatchOutcome::UnmatchedEvent,
                    },
                }
            }
        };

        if let (Some(obs_index), MatchOutcome::Matched | MatchOutcome::Contradicted) =
            (m.observation_index, m.outcome)
        {
            referenced[obs_index] = true;
        }
        matches.push(m);
    }

    // Residual pass: screen changes no event accounted for.
    for (obs_index, obs) in observations.iter().enumerate() {
        if referenced[obs_index] || cfg.idle_states.contains(&obs.state) {
            continue;
        }
        matches.push(Match {
            event_index: None,
            observation_index: Some(obs_index),
            delta_ms: None,
            outcome: MatchOutcome::UnmatchedObservation,
        });
    }

    matches
}
