use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use driftcal::{
    calibrator::Calibrator,
    hierarchy::{sub_module_key, Level, StrawIndices},
    hit::{HistogramBlob, HitSample},
    params::CalibratorParams,
    pipeline::CalibrationPipeline,
};

/// Hits spread over `nstraws` straws of one side.
fn make_hits(rng: &mut StdRng, nstraws: i32, n: usize) -> Vec<HitSample> {
    (0..n)
        .map(|_| {
            let sid = rng.random_range(0..nstraws);
            let time = 3.0 + 32.0 * rng.random::<f64>();
            HitSample {
                indices: StrawIndices {
                    det: 1,
                    lay: sid % 3,
                    module: sid % 32,
                    brd: sid % 9,
                    chp: sid % 27,
                    stl: sid % 73,
                    stw: sid % 24,
                    sid,
                },
                tres: 6.0 * (rng.random::<f64>() - 0.5),
                res: 0.4 * (rng.random::<f64>() - 0.5),
                time,
                radius: 0.06 * (time - 3.0),
                t0: 10.0,
                ..Default::default()
            }
        })
        .collect()
}

fn bench_straw_level(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let hits = make_hits(&mut rng, 5_000, 100_000);
    let keys: Vec<String> = hits
        .iter()
        .map(|h| sub_module_key(&h.indices, Level::Straw))
        .collect();

    c.bench_function("add_hit/straw_level_100k", |b| {
        b.iter_batched(
            || Calibrator::new(Level::Straw, CalibratorParams::default()),
            |mut cal| {
                for (key, hit) in keys.iter().zip(&hits) {
                    cal.add_hit(key, hit, None, true).unwrap();
                }
                black_box(cal.len())
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_blob(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let params = CalibratorParams::default();
    let hits = make_hits(&mut rng, 1, 2_000);
    let blob = HistogramBlob::from_hits(&hits, &params.layout);

    c.bench_function("add_hit/blob_2k", |b| {
        b.iter_batched(
            || Calibrator::new(Level::Chip, params.clone()),
            |mut cal| {
                cal.add_hit("c", &hits[0], Some(black_box(&blob)), true)
                    .unwrap();
                black_box(cal)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(3);
    let hits = make_hits(&mut rng, 500, 20_000);

    c.bench_function("add_hit/pipeline_20k", |b| {
        b.iter_batched(
            || CalibrationPipeline::new(CalibratorParams::default(), "RT".into()),
            |mut pipeline| {
                for hit in &hits {
                    pipeline.add_hit(hit, None).unwrap();
                }
                black_box(pipeline)
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_straw_level, bench_blob, bench_pipeline);
criterion_main!(benches);
