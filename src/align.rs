//! Alignment estimation: fit the video-clock → event-clock mapping from
//! anchor pairs.
//!
//! The estimator does not search for anchors; the caller supplies pairs it
//! already believes denote the same real-world instant. One pair yields a
//! pure offset; two or more yield an ordinary-least-squares fit of
//! `(event_ms - video_ms)` against `video_ms`, whose slope is the clock
//! drift in parts-per-million. The solver is closed-form, so the result is
//! bit-for-bit reproducible for a given anchor set.

use crate::error::{CorrelateError, Result};
use crate::models::{Alignment, AnchorPair};
use tracing::debug;

/// Fit an `Alignment` from anchor pairs.
///
/// Fails with `InsufficientAnchors` when no pair is supplied. A large
/// residual is reported in the returned record, never rejected here — the
/// caller surfaces it as reduced confidence.
pub fn fit_alignment(anchors: &[AnchorPair]) -> Result<Alignment> {
    if anchors.is_empty() {
        return Err(CorrelateError::InsufficientAnchors);
    }

    if anchors.len() == 1 {
        let a = anchors[0];
        let offset_ms = a.t_event_ms as i64 - a.t_video_ms as i64;
        debug!(offset_ms, "alignment from single anchor");
        return Ok(Alignment {
            offset_ms,
            drift_ppm: 0.0,
            anchor_count: 1,
            residual_ms: 0.0,
        });
    }

    // Least squares on y = offset + slope * x with
    //   x = video_ms, y = event_ms - video_ms, slope = drift_ppm / 1e6
    let n = anchors.len() as f64;
    let xs: Vec<f64> = anchors.iter().map(|a| a.t_video_ms as f64).collect();
    let ys: Vec<f64> = anchors
        .iter()
        .map(|a| a.t_event_ms as f64 - a.t_video_ms as f64)
        .collect();

    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        cov += (x - mean_x) * (y - mean_y);
        var += (x - mean_x) * (x - mean_x);
    }

    // All anchors at the same video time degenerate to a pure offset.
    let slope = if var > 0.0 { cov / var } else { 0.0 };
    let offset = mean_y - slope * mean_x;

    // RMS residual of the unrounded model, so exactly-collinear anchors
    // report zero even when the stored offset rounds.
    let mut sq_sum = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        let r = y - (offset + slope * x);
        sq_sum += r * r;
    }
    let residual_ms = (sq_sum / n).sqrt();

    let alignment = Alignment {
        offset_ms: offset.round() as i64,
        drift_ppm: slope * 1e6,
        anchor_count: anchors.len(),
        residual_ms,
    };
    debug!(
        offset_ms = alignment.offset_ms,
        drift_ppm = alignment.drift_ppm,
        residual_ms = alignment.residual_ms,
        anchor_count = alignment.anchor_count,
        "alignment fitted"
    );
    Ok(alignment)
}
