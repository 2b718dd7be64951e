use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use docrank::config::ModelSettings;
use docrank::dataset::{Dataset, Record, TimeCategory, is_peak_hour};
use docrank::ranking::rank_doctors;
use docrank::training::train_model;

const RECORD_COUNT: usize = 2_000;

fn synthetic_dataset() -> Dataset {
    let records = (0..RECORD_COUNT)
        .map(|i| {
            let login_hour = (i * 7 % 24) as u8;
            Record {
                provider_id: i as u32,
                login_hour,
                logout_hour: ((i * 7 + 3) % 24) as u8,
                session_minutes: 30.0 + (i % 240) as f64,
                peak_hours: is_peak_hour(login_hour),
                survey_attempts: (i % 9) as i64,
                time_category: TimeCategory::from_hour(login_hour),
            }
        })
        .collect();
    Dataset::new(records, RECORD_COUNT)
}

fn bench_rank(c: &mut Criterion) {
    let dataset = synthetic_dataset();
    let settings = ModelSettings {
        rounds: 20,
        ..ModelSettings::default()
    };
    let model = train_model(&dataset, &settings).expect("train model");
    for limit in [10i64, 100] {
        c.bench_with_input(
            BenchmarkId::new("rank_morning", limit),
            &limit,
            |b, &limit| {
                b.iter(|| {
                    black_box(rank_doctors(
                        &dataset,
                        &model,
                        TimeCategory::Morning,
                        limit,
                    ))
                })
            },
        );
    }
}

fn bench_train(c: &mut Criterion) {
    let dataset = synthetic_dataset();
    let settings = ModelSettings {
        rounds: 10,
        ..ModelSettings::default()
    };
    c.bench_function("train_10_rounds", |b| {
        b.iter(|| black_box(train_model(&dataset, &settings).expect("train model")))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_rank, bench_train
}
criterion_main!(benches);
