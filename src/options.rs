//! Per-call calibration options.
//!
//! The option string passed to [`Calibrator::calibrate`](crate::calibrator::Calibrator::calibrate)
//! is a set of single-letter flags:
//!
//! | flag | effect |
//! |------|--------|
//! | `R`  | fit the R-t relation when enough statistics are available |
//! | `T`  | fit t0 when enough statistics are available |
//! | `N`  | do nothing, the record is left untouched |
//! | `B`  | chip-reference t0 at chip level |
//! | `S`  | short-straw t0 correction when inheriting at straw level |
//! | `0`  | hold the constant R-t coefficient at zero during the fit |
//! | `3`  | hold the cubic R-t coefficient at zero during the fit |
//!
//! Unknown characters are ignored.
use std::{convert::Infallible, fmt, str::FromStr};

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationOptions {
    pub fit_rt: bool,
    pub fit_t0: bool,
    pub no_op: bool,
    pub chip_reference: bool,
    pub short_straw: bool,
    pub fix_constant_term: bool,
    pub fix_cubic_term: bool,
}

impl CalibrationOptions {
    /// Same options with the independent fits disabled, so both branches inherit.
    pub fn inherit_only(self) -> Self {
        CalibrationOptions {
            fit_rt: false,
            fit_t0: false,
            ..self
        }
    }
}

impl FromStr for CalibrationOptions {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut opts = CalibrationOptions::default();
        for c in s.chars() {
            match c {
                'R' => opts.fit_rt = true,
                'T' => opts.fit_t0 = true,
                'N' => opts.no_op = true,
                'B' => opts.chip_reference = true,
                'S' => opts.short_straw = true,
                '0' => opts.fix_constant_term = true,
                '3' => opts.fix_cubic_term = true,
                other => debug!("ignoring unknown calibration option '{other}'"),
            }
        }
        Ok(opts)
    }
}

impl From<&str> for CalibrationOptions {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(opts) => opts,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for CalibrationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (self.fit_rt, 'R'),
            (self.fit_t0, 'T'),
            (self.no_op, 'N'),
            (self.chip_reference, 'B'),
            (self.short_straw, 'S'),
            (self.fix_constant_term, '0'),
            (self.fix_cubic_term, '3'),
        ];
        for (set, c) in flags {
            if set {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}
