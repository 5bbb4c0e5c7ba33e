//! Performance benchmarks for rating resolution

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rally_point::game::{InMemoryMatchStore, Match, MatchResolver, MatchStore};
use rally_point::metrics::MetricsCollector;
use rally_point::rating::{compute_delta, EloEngine, InMemoryRatingStorage};
use rally_point::types::{Team, Winner};
use std::sync::Arc;
use uuid::Uuid;

fn roster(prefix: &str, size: usize) -> Vec<String> {
    (0..size).map(|i| format!("{}-{}", prefix, i)).collect()
}

fn bench_compute_delta(c: &mut Criterion) {
    c.bench_function("compute_delta", |b| {
        b.iter(|| {
            compute_delta(
                black_box(1350.0),
                black_box(1212.5),
                black_box(1.0),
                black_box(32.0),
            )
        })
    });
}

fn bench_approve(c: &mut Criterion) {
    let mut group = c.benchmark_group("approve_match");

    for team_size in [1usize, 5, 16] {
        group.bench_with_input(
            BenchmarkId::from_parameter(team_size),
            &team_size,
            |b, &team_size| {
                let matches = Arc::new(InMemoryMatchStore::new());
                let resolver = MatchResolver::new(
                    matches.clone(),
                    Arc::new(InMemoryRatingStorage::new(1200)),
                    EloEngine::default(),
                    Arc::new(MetricsCollector::new().expect("metrics collector")),
                );
                let team1 = roster("a", team_size);
                let team2 = roster("b", team_size);

                b.iter(|| {
                    let match_id = Uuid::new_v4();
                    matches
                        .insert(Match::new(
                            match_id,
                            Uuid::new_v4(),
                            "bench-mode".to_string(),
                            "bench".to_string(),
                            "guild".to_string(),
                            &team1,
                            &team2,
                            Utc::now(),
                        ))
                        .expect("insert match");
                    resolver
                        .approve(black_box(match_id), Winner::Team(Team::One))
                        .expect("approve match")
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_compute_delta, bench_approve);
criterion_main!(benches);
