//! # Output of calibration results
//!
//! Three renderings of the calibrated records:
//!
//! * [`write_t0_constants`] – the `key t0` text table, the format read back by
//!   [`old_constants`](crate::old_constants) on the next iteration,
//! * [`write_stat_table`] – one CSV row per calibrated key with flags, constants, counters and
//!   residual statistics ([`StatRow`]),
//! * [`CalibratorDisplay`] – a human-readable summary table built with `comfy-table`.
//!
//! Keys are written in sorted order; records never calibrated are left out. The `_to_file`
//! helpers append to an existing file; the CSV header is only written to an empty one.
use std::{
    fmt,
    fs::{File, OpenOptions},
    io::Write,
};

use camino::Utf8Path;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Row, Table};
use serde::Serialize;

use crate::{
    calibrator::Calibrator, driftcal_errors::DriftCalError, pipeline::CalibrationPipeline,
    record::SubModuleRecord,
};

fn calibrated_records(cal: &Calibrator) -> impl Iterator<Item = &SubModuleRecord> {
    cal.keys()
        .into_iter()
        .filter_map(move |key| cal.get(key))
        .filter(|rec| rec.calflag)
}

/// Write one `key t0` line per calibrated record.
pub fn write_t0_constants<W: Write>(cal: &Calibrator, mut out: W) -> Result<(), DriftCalError> {
    for rec in calibrated_records(cal) {
        writeln!(out, "{} {:.4}", rec.key, rec.t0.t0)?;
    }
    Ok(())
}

/// One row of the statistics table.
///
/// Columns follow the field order; `None` values are written as empty cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRow {
    pub level: u8,
    pub key: String,
    pub det: Option<i32>,
    pub lay: Option<i32>,
    pub module: Option<i32>,
    pub brd: Option<i32>,
    pub chp: Option<i32>,
    pub stl: Option<i32>,
    pub stw: Option<i32>,
    pub sid: Option<i32>,
    pub rtflag: bool,
    pub t0flag: bool,
    pub t0: f64,
    pub old_t0: f64,
    pub ref_t0: Option<f64>,
    pub t0err: f64,
    pub t0off: Option<f64>,
    pub fit_type: Option<u8>,
    pub ntres: u64,
    pub nres: u64,
    pub nrt: u64,
    pub nhits: u64,
    pub res_mean: Option<f64>,
    pub res_width: Option<f64>,
    pub res_width_err: Option<f64>,
    pub res_mean_err: Option<f64>,
    pub tres_mean: Option<f64>,
    pub tres_width: Option<f64>,
    pub tres_width_err: Option<f64>,
    pub tres_mean_err: Option<f64>,
    pub rtt0: f64,
    pub a0: f64,
    pub a1: f64,
    pub a2: f64,
    pub a3: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<&SubModuleRecord> for StatRow {
    fn from(rec: &SubModuleRecord) -> Self {
        let p = rec.position;
        let [a0, a1, a2, a3] = rec.rt.coeffs;
        let [x, y, z] = rec.coords;
        StatRow {
            level: rec.level.index(),
            key: rec.key.clone(),
            det: p.det,
            lay: p.lay,
            module: p.module,
            brd: p.brd,
            chp: p.chp,
            stl: p.stl,
            stw: p.stw,
            sid: p.sid,
            rtflag: rec.rtflag,
            t0flag: rec.t0flag,
            t0: rec.t0.t0,
            old_t0: rec.old_t0,
            ref_t0: rec.ref_t0,
            t0err: rec.t0.t0err,
            t0off: rec.t0.t0off,
            fit_type: rec.fit_type().map(|f| f.code()),
            ntres: rec.counts.ntres,
            nres: rec.counts.nres,
            nrt: rec.counts.nrt,
            nhits: rec.counts.nhits,
            res_mean: rec.residual.map(|r| r.mean),
            res_width: rec.residual.map(|r| r.width),
            res_width_err: rec.residual.map(|r| r.width_error),
            res_mean_err: rec.residual.map(|r| r.mean_error),
            tres_mean: rec.time_residual.map(|r| r.mean),
            tres_width: rec.time_residual.map(|r| r.width),
            tres_width_err: rec.time_residual.map(|r| r.width_error),
            tres_mean_err: rec.time_residual.map(|r| r.mean_error),
            rtt0: rec.rt.rtt0,
            a0,
            a1,
            a2,
            a3,
            x,
            y,
            z,
        }
    }
}

fn serialize_rows<'a, W: Write>(
    records: impl Iterator<Item = &'a SubModuleRecord>,
    mut writer: csv::Writer<W>,
) -> Result<(), DriftCalError> {
    for rec in records {
        writer.serialize(StatRow::from(rec))?;
    }
    writer.flush()?;
    Ok(())
}

fn open_append(path: &Utf8Path) -> Result<File, DriftCalError> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Write the statistics table of one calibrator as CSV, header included.
pub fn write_stat_table<W: Write>(cal: &Calibrator, out: W) -> Result<(), DriftCalError> {
    serialize_rows(calibrated_records(cal), csv::Writer::from_writer(out))
}

impl CalibrationPipeline {
    /// `key t0` lines of every level, top level first.
    pub fn write_t0_constants<W: Write>(&self, mut out: W) -> Result<(), DriftCalError> {
        for cal in self.calibrators() {
            write_t0_constants(cal, &mut out)?;
        }
        Ok(())
    }

    /// Append the `key t0` lines to `path`, creating the file if needed.
    pub fn write_t0_constants_to_file(&self, path: &Utf8Path) -> Result<(), DriftCalError> {
        self.write_t0_constants(open_append(path)?)
    }

    /// Statistics rows of every level in a single table.
    pub fn write_stat_table<W: Write>(&self, out: W) -> Result<(), DriftCalError> {
        serialize_rows(
            self.calibrators().flat_map(calibrated_records),
            csv::Writer::from_writer(out),
        )
    }

    /// Append the statistics rows to `path`; the header goes to a new or empty file only.
    pub fn write_stat_table_to_file(&self, path: &Utf8Path) -> Result<(), DriftCalError> {
        let file = open_append(path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(file.metadata()?.len() == 0)
            .from_writer(file);
        serialize_rows(self.calibrators().flat_map(calibrated_records), writer)
    }
}

/// Display adaptor rendering the calibrated records of a [`Calibrator`] as a table.
///
/// Columns
/// -----------------
/// `key | hits | t0 ±err | old t0 | fit | R-t | rtt0 | σ(res)`
///
/// The header line carries the level, the engine modes and the [`EngineStats`](crate::accumulator::EngineStats).
pub struct CalibratorDisplay<'a> {
    cal: &'a Calibrator,
    prec: usize,
}

impl<'a> CalibratorDisplay<'a> {
    pub fn new(cal: &'a Calibrator) -> Self {
        CalibratorDisplay { cal, prec: 3 }
    }

    /// Digits after the decimal point for times.
    pub fn with_precision(mut self, prec: usize) -> Self {
        self.prec = prec;
        self
    }
}

impl fmt::Display for CalibratorDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.prec;
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        table.set_header(vec![
            Cell::new("key"),
            Cell::new("hits"),
            Cell::new("t0 ±err [ns]"),
            Cell::new("old t0 [ns]"),
            Cell::new("fit"),
            Cell::new("R-t"),
            Cell::new("rtt0 [ns]"),
            Cell::new("σ(res) [mm]"),
        ]);

        for rec in calibrated_records(self.cal) {
            let rt_flag = if rec.rtflag { "own" } else { "parent" };
            table.add_row(Row::from(vec![
                Cell::new(&rec.key),
                Cell::new(rec.counts.nhits).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.p$} ±{:.p$}", rec.t0.t0, rec.t0.t0err))
                    .set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.p$}", rec.old_t0)).set_alignment(CellAlignment::Right),
                Cell::new(rec.fit_type().map_or(String::new(), |t| t.to_string()))
                    .set_alignment(CellAlignment::Center),
                Cell::new(rt_flag),
                Cell::new(format!("{:.p$}", rec.rt.rtt0)).set_alignment(CellAlignment::Right),
                Cell::new(
                    rec.residual
                        .map_or(String::new(), |r| format!("{:.4}", r.width)),
                )
                .set_alignment(CellAlignment::Right),
            ]));
        }

        writeln!(
            f,
            "{} [{}] {}",
            self.cal.level(),
            self.cal.params().mode_string(),
            self.cal.stats()
        )?;
        write!(f, "{table}")
    }
}

impl Calibrator {
    pub fn show(&self) -> CalibratorDisplay<'_> {
        CalibratorDisplay::new(self)
    }
}
