//! # Calibration pipeline
//!
//! [`CalibrationPipeline`] owns one [`Calibrator`] per hierarchy level and runs the complete
//! procedure:
//!
//! 1. every hit is added, under its derived key, to each level that is not skipped,
//! 2. old t0 constants can be applied to whichever level owns each key,
//! 3. [`calibrate_all`](CalibrationPipeline::calibrate_all) walks the levels top-down. For each key
//!    the parent is the already calibrated record of the nearest non-skipped ancestor level.
//!
//! A sub-module whose index is not in its level's [`Selection`] is calibrated with `R` and `T`
//! removed from the options, so both its R-t relation and its t0 come from the parent.
//!
//! ```rust
//! use driftcal::fitter::ProfileFitter;
//! use driftcal::hierarchy::{Level, StrawIndices};
//! use driftcal::hit::HitSample;
//! use driftcal::params::CalibratorParams;
//! use driftcal::pipeline::CalibrationPipeline;
//! use driftcal::selection::Selection;
//!
//! let mut pipeline = CalibrationPipeline::new(CalibratorParams::default(), "RT".into());
//! pipeline.set_selection(Level::Board, Selection::Skip).unwrap();
//!
//! let hit = HitSample {
//!     indices: StrawIndices { det: 1, lay: 0, sid: 42, ..Default::default() },
//!     t0: 12.0,
//!     ..Default::default()
//! };
//! pipeline.add_hit(&hit, None).unwrap();
//! pipeline.calibrate_all(&mut ProfileFitter::default()).unwrap();
//! assert!(pipeline.calibrator(Level::Straw).get("_1_0_0_0_0_42").unwrap().calflag);
//! ```
use camino::Utf8Path;
use log::{info, warn};

use crate::{
    accumulator::EngineStats,
    calibrator::Calibrator,
    driftcal_errors::DriftCalError,
    fitter::CurveFitter,
    hierarchy::{level_of_key, parent_key, sub_module_key, Level},
    hit::{HistogramBlob, HitSample},
    old_constants::parse_old_t0_table,
    options::CalibrationOptions,
    params::CalibratorParams,
    selection::Selection,
};

#[derive(Debug, Clone)]
pub struct CalibrationPipeline {
    /// One calibrator per level, indexed by [`Level::index`]
    levels: Vec<Calibrator>,
    options: CalibrationOptions,
}

impl CalibrationPipeline {
    /// Pipeline with the same parameters at every level and every sub-module selected.
    pub fn new(params: CalibratorParams, options: CalibrationOptions) -> Self {
        CalibrationPipeline {
            levels: Level::ALL
                .iter()
                .map(|level| Calibrator::new(*level, params.clone()))
                .collect(),
            options,
        }
    }

    pub fn options(&self) -> &CalibrationOptions {
        &self.options
    }

    pub fn calibrator(&self, level: Level) -> &Calibrator {
        &self.levels[level.index() as usize]
    }

    pub fn calibrators(&self) -> impl Iterator<Item = &Calibrator> {
        self.levels.iter()
    }

    /// Restrict which sub-modules of `level` get their own constants.
    ///
    /// Return
    /// ----------
    /// * [`DriftCalError::InvalidSelection`] when skipping the top level, which has no parent to
    ///   inherit from, or when the level already holds records.
    pub fn set_selection(
        &mut self,
        level: Level,
        selection: Selection,
    ) -> Result<(), DriftCalError> {
        if level.is_top() && selection.skip() {
            return Err(DriftCalError::InvalidSelection(
                "the top level cannot be skipped".into(),
            ));
        }
        let slot = &mut self.levels[level.index() as usize];
        if !slot.is_empty() {
            return Err(DriftCalError::InvalidSelection(format!(
                "selection of level {level} changed after hits were added"
            )));
        }
        let params = slot.params().clone();
        *slot = Calibrator::new(level, params).with_selection(selection);
        Ok(())
    }

    /// Replace the parameters of one level.
    pub fn set_params(
        &mut self,
        level: Level,
        params: CalibratorParams,
    ) -> Result<(), DriftCalError> {
        let slot = &mut self.levels[level.index() as usize];
        if !slot.is_empty() {
            return Err(DriftCalError::InvalidCalibratorParameter(format!(
                "parameters of level {level} changed after hits were added"
            )));
        }
        let selection = slot.selection().clone();
        *slot = Calibrator::new(level, params).with_selection(selection);
        Ok(())
    }

    /// Add one hit, or one blob, to every level that is not skipped.
    pub fn add_hit(
        &mut self,
        hit: &HitSample,
        blob: Option<&HistogramBlob>,
    ) -> Result<(), DriftCalError> {
        for cal in self.levels.iter_mut().filter(|c| !c.skip()) {
            let key = sub_module_key(&hit.indices, cal.level());
            let make_histograms = cal.params().make_histograms;
            cal.add_hit(&key, hit, blob, make_histograms)?;
        }
        Ok(())
    }

    /// Apply an old t0 table, routing every key to the level it belongs to.
    ///
    /// Return
    /// ----------
    /// * The number of records updated.
    pub fn update_old_constants(&mut self, table: &str) -> Result<usize, DriftCalError> {
        let mut updated = 0;
        for entry in parse_old_t0_table(table)? {
            let rec = level_of_key(&entry.key)
                .and_then(|level| self.levels[level.index() as usize].record_mut(&entry.key));
            match rec {
                Some(rec) => {
                    rec.old_t0 = entry.t0;
                    updated += 1;
                }
                None => warn!("old t0 for unknown key {}", entry.key),
            }
        }
        info!("{updated} old t0 constants applied");
        Ok(updated)
    }

    pub fn update_old_constants_from_file(
        &mut self,
        path: &Utf8Path,
    ) -> Result<usize, DriftCalError> {
        let content = std::fs::read_to_string(path)?;
        self.update_old_constants(&content)
    }

    /// Nearest ancestor level of `level` that is not skipped.
    fn ancestor_of(&self, level: Level) -> Option<Level> {
        std::iter::successors(level.parent(), |l| l.parent())
            .find(|l| !self.levels[l.index() as usize].skip())
    }

    /// Calibrate every key of every non-skipped level, top-down.
    ///
    /// Return
    /// ----------
    /// * The statistics of each level, top level first, skipped levels excluded.
    /// * The first error raised by a calibration. Levels above it stay calibrated.
    pub fn calibrate_all<F: CurveFitter + ?Sized>(
        &mut self,
        fitter: &mut F,
    ) -> Result<Vec<(Level, EngineStats)>, DriftCalError> {
        let mut summary = Vec::new();

        for level in Level::ALL {
            let idx = level.index() as usize;
            if self.levels[idx].skip() {
                info!("{}: skipped", level.abbreviation());
                continue;
            }
            let ancestor = self.ancestor_of(level);
            let (above, below) = self.levels.split_at_mut(idx);
            let cal = &mut below[0];
            let parent_cal = ancestor.map(|a| &above[a.index() as usize]);
            let depth = ancestor.map_or(0, |a| level.index() - a.index());

            let keys: Vec<String> = cal.keys().into_iter().map(str::to_string).collect();
            for key in keys {
                let selected = cal.check_selection(
                    cal.get(&key).and_then(|rec| rec.position.index_at(level)),
                );
                let options = if selected {
                    self.options
                } else {
                    self.options.inherit_only()
                };
                let parent = parent_cal.and_then(|pc| {
                    let pkey = (0..depth).try_fold(key.clone(), |k, _| parent_key(&k))?;
                    pc.get(&pkey)
                });
                cal.calibrate(&key, &options, parent, fitter)?;
            }

            info!(
                "{} [{}]: {}",
                level.abbreviation(),
                cal.option_string(&self.options),
                cal.stats()
            );
            summary.push((level, *cal.stats()));
        }
        Ok(summary)
    }
}
