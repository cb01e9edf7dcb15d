//! Screenlign - validate telemetry event streams against screen-derived
//! state timelines
//!
//! This library treats a screen-derived observation timeline as ground truth
//! and a telemetry event stream as a set of unverified claims. It estimates
//! the mapping between the independent video and telemetry clocks from
//! anchor observations, matches events to observations under that mapping,
//! and grades the discrepancies into findings with evidence references.

pub mod adapter;
pub mod align;
pub mod anomaly;
pub mod cli;
pub mod config;
pub mod error;
pub mod gate;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod session;
