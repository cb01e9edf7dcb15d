//! Fatal error taxonomy for a correlation run.
//!
//! Only conditions that invalidate the entire run are errors. Per-event and
//! per-observation issues (contradictions, unmatched items, large residuals)
//! are modeled as `Finding`s — mismatches are the product, not failures of
//! the tool. Adapter timeouts are likewise recovered locally and reported as
//! findings, never raised through this enum.

use thiserror::Error;

/// Errors that abort a correlation run
#[derive(Error, Debug)]
pub enum CorrelateError {
    /// Invalid or contradictory configuration; aborts before any processing
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No app-open signal found; nothing after it can be trusted
    #[error(
        "no app-open signal found in {observation_count} observations \
         (last t_video_ms: {last_t_video_ms:?})"
    )]
    GateNotFound {
        observation_count: usize,
        last_t_video_ms: Option<u64>,
    },

    /// Alignment cannot be fit without at least one anchor pair
    #[error("alignment requires at least one anchor pair, got 0")]
    InsufficientAnchors,

    /// Bootstrap session resolution tied on all criteria; a wrong guess
    /// would corrupt all downstream correlation, so this requires operator
    /// input
    #[error(
        "ambiguous session resolution: {candidates:?} tie at \
         first_event_ms={first_event_ms}, {event_count} events each"
    )]
    AmbiguousSession {
        candidates: Vec<String>,
        first_event_ms: u64,
        event_count: usize,
    },

    /// I/O failure reading an input file
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed record in an input file
    #[error("invalid record at {path}:{line}")]
    Parse {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CorrelateError>;
