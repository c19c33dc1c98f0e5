use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use horizon_funding::training::{train_model, ModelKind, TrainingConfig};
use polars::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_classification_data(n_rows: usize, n_features: usize) -> (DataFrame, Series) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let target: Vec<i32> = (0..n_rows).map(|i| (i % 3) as i32).collect();
    let columns: Vec<Column> = (0..n_features)
        .map(|j| {
            let values: Vec<f64> = target
                .iter()
                .map(|&class| class as f64 * (j + 1) as f64 * 0.5 + rng.gen::<f64>())
                .collect();
            Series::new(format!("feature_{}", j).into(), values).into()
        })
        .collect();

    (
        DataFrame::new(columns).unwrap(),
        Series::new("funding_class".into(), target),
    )
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("training");
    group.sample_size(10); // Fewer samples for training benchmarks

    let config = TrainingConfig::default().with_n_estimators(50);
    for n_rows in [500, 2000].iter() {
        let (x, y) = create_classification_data(*n_rows, 10);

        for kind in ModelKind::ALL {
            group.bench_with_input(
                BenchmarkId::new(kind.key(), n_rows),
                &(&x, &y),
                |b, (x, y)| {
                    b.iter(|| train_model(kind, black_box(x), black_box(y), &config).unwrap())
                },
            );
        }
    }

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("prediction");

    // Train once per kind
    let config = TrainingConfig::default().with_n_estimators(50);
    let (train_x, train_y) = create_classification_data(2000, 10);
    let (test_x, _) = create_classification_data(10_000, 10);

    for kind in ModelKind::ALL {
        let (model, _) = train_model(kind, &train_x, &train_y, &config).unwrap();
        group.bench_with_input(BenchmarkId::new("predict", kind.key()), &test_x, |b, df| {
            b.iter(|| model.predict_frame(black_box(df)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_training, bench_prediction);
criterion_main!(benches);
