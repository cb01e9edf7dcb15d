use anyhow::{Context, Result};
use clap::Parser;
use screenlign::adapter::{read_jsonl, EventAdapter, FileAdapter};
use screenlign::anomaly::NoEvidence;
use screenlign::cli::{Cli, OutputFormat};
use screenlign::config::RunConfig;
use screenlign::models::{MatchOutcome, Observation};
use screenlign::pipeline::{run_correlation, CorrelationReport};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_text_report(report: &CorrelationReport) {
    println!("=== Correlation Report ===");
    println!("Gate (app open):  {} ms video", report.gate_video_ms);
    match &report.session.session_key {
        Some(sk) => println!(
            "Session:          {} ({:?} mode, {} events)",
            sk, report.session.mode, report.session.event_count
        ),
        None => println!("Session:          unresolved"),
    }
    if let Some(dk) = &report.session.device_key {
        println!("Device:           {dk}");
    }
    println!(
        "Alignment:        offset {} ms, drift {:.1} ppm, residual {:.1} ms ({} anchors)",
        report.alignment.offset_ms,
        report.alignment.drift_ppm,
        report.alignment.residual_ms,
        report.alignment.anchor_count
    );

    let mut matched = 0;
    let mut unmatched_events = 0;
    let mut unmatched_observations = 0;
    let mut contradicted = 0;
    for m in &report.matches {
        match m.outcome {
            MatchOutcome::Matched => matched += 1,
            MatchOutcome::UnmatchedEvent => unmatched_events += 1,
            MatchOutcome::UnmatchedObservation => unmatched_observations += 1,
            MatchOutcome::Contradicted => contradicted += 1,
        }
    }
    println!();
    println!("Matches:          {matched} matched, {contradicted} contradicted");
    println!("Unconfirmed:      {unmatched_events} events, {unmatched_observations} observations");
    println!();

    if report.findings.is_empty() {
        println!("No findings.");
        return;
    }
    println!("Findings:");
    for f in &report.findings {
        println!("  [{}] {}", f.severity, f.title);
        println!("        {}", f.description);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RunConfig::default(),
    };
    if cli.device_key.is_some() {
        config.device_key = cli.device_key.clone();
    }

    let observations: Vec<Observation> = read_jsonl(&cli.observations)
        .with_context(|| format!("loading observations {}", cli.observations.display()))?;

    let adapters: Vec<Box<dyn EventAdapter>> = cli
        .events
        .iter()
        .map(|path| Box::new(FileAdapter::new(path.clone())) as Box<dyn EventAdapter>)
        .collect();

    let report = run_correlation(observations, adapters, &config, &NoEvidence)
        .context("correlation run failed")?;

    match cli.format {
        OutputFormat::Text => print_text_report(&report),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
