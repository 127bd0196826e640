#![allow(dead_code)]

use driftcal::{
    hierarchy::StrawIndices,
    hit::HitSample,
    params::CalibratorParams,
    record::SubModuleRecord,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn straw(det: i32, lay: i32, module: i32, brd: i32, chp: i32, stl: i32, sid: i32) -> StrawIndices {
    StrawIndices {
        det,
        lay,
        module,
        brd,
        chp,
        stl,
        stw: sid % 32,
        sid,
    }
}

pub fn params(min_t0_stat: u64, min_rt_stat: u64) -> CalibratorParams {
    CalibratorParams::builder()
        .min_t0_stat(min_t0_stat)
        .min_rt_stat(min_rt_stat)
        .build()
        .unwrap()
}

/// Description of a simulated straw population.
#[derive(Debug, Clone, Copy)]
pub struct HitModel {
    pub tres_mean: f64,
    pub tres_sigma: f64,
    pub res_sigma: f64,
    /// Drift time at zero radius
    pub rt_t0: f64,
    /// Drift velocity (mm/ns)
    pub velocity: f64,
    /// Reconstruction t0
    pub t0: f64,
}

impl Default for HitModel {
    fn default() -> Self {
        HitModel {
            tres_mean: 0.0,
            tres_sigma: 3.0,
            res_sigma: 0.12,
            rt_t0: 3.0,
            velocity: 0.06,
            t0: 10.0,
        }
    }
}

/// Hits following a Gaussian time residual and a linear R-t relation.
pub fn simulate_hits(
    rng: &mut StdRng,
    indices: StrawIndices,
    model: &HitModel,
    n: usize,
) -> Vec<HitSample> {
    (0..n)
        .map(|_| {
            let time = model.rt_t0 + 32.0 * rng.random::<f64>();
            let tres: f64 = rng.sample(StandardNormal);
            let res: f64 = rng.sample(StandardNormal);
            HitSample {
                indices,
                tres: model.tres_mean + model.tres_sigma * tres,
                res: model.res_sigma * res,
                time,
                radius: model.velocity * (time - model.rt_t0),
                t0: model.t0,
                rt_coeffs: [0.0, model.velocity, 0.0, 0.0],
                ..Default::default()
            }
        })
        .collect()
}

/// A calibrated parent record with the given t0 values.
pub fn calibrated_parent(t0: f64, old_t0: f64) -> SubModuleRecord {
    let hit = HitSample {
        t0: old_t0,
        ..Default::default()
    };
    let mut parent = SubModuleRecord::seeded("ALL", driftcal::hierarchy::Level::Detector, &hit);
    parent.t0.t0 = t0;
    parent.t0.t0err = 0.2;
    parent.calflag = true;
    parent.t0flag = true;
    parent
}
