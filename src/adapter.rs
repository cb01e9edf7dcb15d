//! Telemetry adapter contract and the merge join over adapter results.
//!
//! Every backend (file, object store, SQL, search) implements one uniform
//! `fetch` contract; the core depends only on this trait, never on a
//! concrete backend. The crate ships the file adapter (NormalizedEvent
//! JSONL) so a run works end to end without any vendor integration.
//!
//! Adapter calls may run concurrently; the merge is the synchronization
//! point. It blocks on all adapters with a per-adapter timeout, keeps the
//! results that arrived, and reports omissions (timeouts, fetch failures)
//! for the pipeline to downgrade into INFO findings.

use crate::error::{CorrelateError, Result};
use crate::models::Event;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Generic event query. Adapters interpret the fields in a
/// source-appropriate way; vendor timestamps are normalized to milliseconds.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub time_start_ms: u64,
    pub time_end_ms: u64,
    pub device_key: Option<String>,
}

impl EventQuery {
    /// Query everything from `start_ms` onward
    pub fn from_start(start_ms: u64) -> Self {
        Self {
            time_start_ms: start_ms,
            time_end_ms: u64::MAX,
            device_key: None,
        }
    }

    fn accepts(&self, e: &Event) -> bool {
        if e.t_event_ms < self.time_start_ms || e.t_event_ms > self.time_end_ms {
            return false;
        }
        if let Some(dk) = &self.device_key {
            if e.device_key.as_deref() != Some(dk.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Read events from some source as normalized records, ordered by
/// `t_event_ms`
pub trait EventAdapter: Send {
    /// Stable adapter name, used in omission reports
    fn name(&self) -> &str;

    fn fetch(&self, query: &EventQuery) -> Result<Vec<Event>>;
}

/// Construct a normalized event, keeping the vendor payload intact under
/// `raw` and safe-to-share fields in `metadata`
pub fn normalize_event(
    t_event_ms: u64,
    kind: impl Into<String>,
    raw: BTreeMap<String, Value>,
    session_key: Option<String>,
    device_key: Option<String>,
    metadata: BTreeMap<String, Value>,
) -> Event {
    Event {
        t_event_ms,
        kind: kind.into(),
        session_key,
        device_key,
        metadata,
        raw,
    }
}

/// Read a JSONL file into typed records, reporting the offending line on
/// parse failure
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = std::fs::File::open(path).map_err(|source| CorrelateError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| CorrelateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| CorrelateError::Parse {
            path: path.display().to_string(),
            line: line_no + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Reads normalized events from a JSONL file, one `Event` object per line
pub struct FileAdapter {
    path: PathBuf,
    name: String,
}

impl FileAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self { path, name }
    }
}

impl EventAdapter for FileAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let events: Vec<Event> = read_jsonl(&self.path)?;
        let out: Vec<Event> = events.into_iter().filter(|e| query.accepts(e)).collect();
        debug!(adapter = %self.name, count = out.len(), "fetched events");
        Ok(out)
    }
}

/// Why an adapter contributed nothing (or only partial data) to the merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OmissionReason {
    TimedOut,
    Failed(String),
}

/// An adapter whose results were omitted from the merged stream
#[derive(Debug, Clone)]
pub struct AdapterOmission {
    pub adapter: String,
    pub reason: OmissionReason,
}

/// Fan out the query across all adapters and join into one time-ordered
/// event sequence.
///
/// Each adapter runs on its own thread; the join waits up to `timeout` for
/// all of them. Results from adapters that miss the deadline are dropped
/// and reported as omissions — the run continues with partial telemetry. A
/// hung adapter's thread is abandoned; its late result goes nowhere.
pub fn merge_adapter_events(
    adapters: Vec<Box<dyn EventAdapter>>,
    query: &EventQuery,
    timeout: Duration,
) -> (Vec<Event>, Vec<AdapterOmission>) {
    let names: Vec<String> = adapters.iter().map(|a| a.name().to_string()).collect();
    let (tx, rx) = crossbeam::channel::unbounded();

    for (idx, adapter) in adapters.into_iter().enumerate() {
        let tx = tx.clone();
        let query = query.clone();
        std::thread::spawn(move || {
            let result = adapter.fetch(&query);
            let _ = tx.send((idx, result));
        });
    }
    drop(tx);

    let deadline = Instant::now() + timeout;
    let mut slots: Vec<Option<Result<Vec<Event>>>> = (0..names.len()).map(|_| None).collect();
    let mut received = 0;
    while received < slots.len() {
        match rx.recv_deadline(deadline) {
            Ok((idx, result)) => {
                slots[idx] = Some(result);
                received += 1;
            }
            Err(_) => break,
        }
    }

    let mut events = Vec::new();
    let mut omissions = Vec::new();
    for (idx, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(Ok(batch)) => events.extend(batch),
            Some(Err(e)) => {
                warn!(adapter = %names[idx], error = %e, "adapter fetch failed");
                omissions.push(AdapterOmission {
                    adapter: names[idx].clone(),
                    reason: OmissionReason::Failed(e.to_string()),
                });
            }
            None => {
                warn!(adapter = %names[idx], "adapter timed out");
                omissions.push(AdapterOmission {
                    adapter: names[idx].clone(),
                    reason: OmissionReason::TimedOut,
                });
            }
        }
    }

    // Adapters return internally ordered batches, but merges across
    // adapters/pages can interleave. Stable sort keeps adapter order for
    // equal timestamps.
    events.sort_by_key(|e| e.t_event_ms);
    (events, omissions)
}
