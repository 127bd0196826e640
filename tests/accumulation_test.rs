mod common;

use approx::assert_relative_eq;
use driftcal::{
    accumulator::AddOutcome,
    calibrator::Calibrator,
    driftcal_errors::DriftCalError,
    hierarchy::{sub_module_key, Level},
    hit::{HistogramBlob, HitSample},
    params::CalibratorParams,
};

use common::{rng, simulate_hits, straw, HitModel};

#[test]
fn two_hits_at_top_level() {
    let mut cal = Calibrator::new(Level::Detector, CalibratorParams::default());
    for t0 in [10.0, 20.0] {
        let hit = HitSample {
            t0,
            ..Default::default()
        };
        cal.add_hit("ALL", &hit, None, true).unwrap();
    }
    let rec = cal.get("ALL").unwrap();
    assert_eq!(rec.counts.ntres, 2);
    assert_eq!(rec.counts.nhits, 2);
    assert_relative_eq!(rec.old_t0, 15.0);
    assert_relative_eq!(rec.mean_t0().unwrap(), 15.0);
}

#[test]
fn blob_equals_individual_hits() {
    let mut rng = rng(7);
    let layout = CalibratorParams::default().layout;
    let idx = straw(1, 0, 4, 2, 3, 12, 301);
    let hits = simulate_hits(&mut rng, idx, &HitModel::default(), 500);

    let mut one_by_one = Calibrator::new(Level::Straw, CalibratorParams::default());
    for hit in &hits {
        one_by_one.add_hit("s", hit, None, true).unwrap();
    }

    let blob = HistogramBlob::from_hits(&hits, &layout);
    let raw = blob.encode().unwrap();
    let decoded = HistogramBlob::decode(&raw, &layout).unwrap();
    let mut aggregated = Calibrator::new(Level::Straw, CalibratorParams::default());
    assert_eq!(
        aggregated.add_hit("s", &hits[0], Some(&decoded), true),
        Ok(AddOutcome::FirstSeen)
    );

    let a = one_by_one.get("s").unwrap();
    let b = aggregated.get("s").unwrap();
    assert_eq!(a.counts.ntres, b.counts.ntres);
    assert_eq!(a.counts.nres, b.counts.nres);
    assert_eq!(a.counts.nrt, b.counts.nrt);
    assert_eq!(a.histograms, b.histograms);
    assert_eq!(b.counts.nhits, decoded.hit_count());
    assert_relative_eq!(b.old_t0, a.old_t0);
    assert_eq!(aggregated.stats().ntreshits, one_by_one.stats().ntreshits);
}

#[test]
fn blob_merge_weights_running_mean() {
    let layout = CalibratorParams::default().layout;
    let mut cal = Calibrator::new(Level::Chip, CalibratorParams::default());
    let idx = straw(0, 1, 2, 3, 4, 5, 6);
    let first = HitSample {
        indices: idx,
        t0: 10.0,
        ..Default::default()
    };
    cal.add_hit("c", &first, None, true).unwrap();

    // blob of three in-range hits recorded with t0 = 14
    let second = HitSample { t0: 14.0, ..first };
    let blob = HistogramBlob::from_hits([&second, &second, &second], &layout);
    assert_eq!(
        cal.add_hit("c", &second, Some(&blob), true),
        Ok(AddOutcome::Merged)
    );

    let rec = cal.get("c").unwrap();
    assert_eq!(rec.counts.nhits, 4);
    assert_relative_eq!(rec.old_t0, 13.0);
    // each of the three (bin, 3) pairs adds t0 · 3
    assert_relative_eq!(rec.sum_t0, 10.0 + 9.0 * 14.0);
    assert_eq!(rec.t0_samples, 10);
    assert_relative_eq!(rec.mean_t0().unwrap(), 13.6);
}

#[test]
fn blob_mean_t0_is_the_straw_t0() {
    let layout = CalibratorParams::default().layout;
    let hit = HitSample {
        t0: 10.0,
        ..Default::default()
    };
    let blob = HistogramBlob::from_hits([&hit, &hit], &layout);
    let mut cal = Calibrator::new(Level::Straw, CalibratorParams::default());
    cal.add_hit("s", &hit, Some(&blob), true).unwrap();

    let rec = cal.get("s").unwrap();
    assert_eq!(rec.counts.nhits, 2);
    assert_relative_eq!(rec.sum_t0, 60.0);
    assert_relative_eq!(rec.mean_t0().unwrap(), 10.0);
    assert_relative_eq!(rec.old_t0, 10.0);
}

#[test]
fn every_level_key_gets_its_own_record() {
    let mut rng = rng(11);
    let model = HitModel::default();
    let mut cal = Calibrator::new(Level::Layer, CalibratorParams::default());
    let straws = [
        straw(0, 0, 1, 0, 0, 3, 10),
        straw(0, 0, 2, 0, 0, 3, 11),
        straw(0, 1, 1, 0, 0, 3, 12),
        straw(1, 0, 1, 0, 0, 3, 13),
    ];
    for idx in straws {
        for hit in simulate_hits(&mut rng, idx, &model, 25) {
            cal.add_hit(&sub_module_key(&hit.indices, Level::Layer), &hit, None, false)
                .unwrap();
        }
    }
    assert_eq!(cal.keys(), vec!["_0_0", "_0_1", "_1_0"]);
    assert_eq!(cal.get("_0_0").unwrap().counts.nhits, 50);
    assert_eq!(cal.stats().nhits, 100);
    for rec in cal.records() {
        assert!(rec.counts.nhits >= rec.counts.ntres.max(rec.counts.nres).max(rec.counts.nrt));
        assert!(rec.histograms.is_none());
        assert_eq!(rec.position.module, None);
    }
}

#[test]
fn malformed_blob_is_rejected_before_accumulation() {
    let layout = CalibratorParams::default().layout;
    assert!(matches!(
        HistogramBlob::decode(&[4, 10, 1, 20, 1], &layout),
        Err(DriftCalError::MalformedHistogramBlob(_))
    ));
}
