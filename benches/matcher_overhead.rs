/// Matcher throughput benchmarks.
///
/// Measures the windowed matching pass over synthetic timelines at several
/// observation densities, to keep the O(E log O) claim honest.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use screenlign::config::RunConfig;
use screenlign::matcher::match_events;
use screenlign::models::{Alignment, Event, Observation, UxState};

fn synthetic_observations(count: usize) -> Vec<Observation> {
    let states = [
        UxState::Playback,
        UxState::Buffering,
        UxState::Paused,
        UxState::Ad,
    ];
    (0..count)
        .map(|i| Observation::new(i as u64 * 100, states[i % states.len()], 0.9))
        .collect()
}

fn synthetic_events(count: usize, span_ms: u64) -> Vec<Event> {
    let kinds = ["playback", "buffering", "pause", "heartbeat"];
    (0..count)
        .map(|i| {
            let t = (i as u64 * span_ms) / count as u64;
            Event::new(t, kinds[i % kinds.len()])
        })
        .collect()
}

fn bench_matcher(c: &mut Criterion) {
    let cfg = RunConfig::default();
    let alignment = Alignment {
        offset_ms: 250,
        drift_ppm: 120.0,
        anchor_count: 2,
        residual_ms: 0.0,
    };

    let mut group = c.benchmark_group("matcher");
    for obs_count in [1_000usize, 10_000, 100_000] {
        let observations = synthetic_observations(obs_count);
        let span_ms = obs_count as u64 * 100;
        let events = synthetic_events(1_000, span_ms);

        group.throughput(Throughput::Elements(events.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("match_events", obs_count),
            &obs_count,
            |b, _| {
                b.iter(|| {
                    black_box(match_events(
                        black_box(&observations),
                        black_box(&events),
                        &alignment,
                        &cfg,
                    ))
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_matcher);
criterion_main!(benches);
