//! # Detector granularity hierarchy
//!
//! The drift-tube detector is calibrated on a 7-level granularity tree:
//!
//! ```text
//! 0 Detector ── 1 Side ── 2 Layer ── 3 PhiModule ── 4 Board ── 5 Chip ── 6 Straw
//! ```
//!
//! This module defines:
//!
//! * [`Level`] – one granularity level, convertible from its integer index.
//! * [`StrawIndices`] – the full set of position indices carried by a hit.
//! * [`Position`] – the indices kept on a record bound to a level. Indices finer than the bound
//!   level are not discriminating and are stored as `None`.
//! * [`sub_module_key`] / [`parent_key`] / [`level_of_key`] – the key scheme linking a record to
//!   its parent.
//!
//! Keys
//! -----------------
//! Level 0 has the single key `"ALL"`. A level `L ≥ 1` key joins the indices of levels `1..=L`
//! with `_`, e.g. `_1_2_17` for side 1, layer 2, phi-module 17. The straw segment uses the
//! straw id. Dropping the last segment yields the parent key.
use std::fmt;

use crate::{
    constants::{Key, TOP_LEVEL_KEY},
    driftcal_errors::DriftCalError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Detector = 0,
    Side = 1,
    Layer = 2,
    PhiModule = 3,
    Board = 4,
    Chip = 5,
    Straw = 6,
}

impl Level {
    /// All levels, top-down.
    pub const ALL: [Level; 7] = [
        Level::Detector,
        Level::Side,
        Level::Layer,
        Level::PhiModule,
        Level::Board,
        Level::Chip,
        Level::Straw,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn is_top(self) -> bool {
        self == Level::Detector
    }

    /// The next coarser level, `None` for the whole detector.
    pub fn parent(self) -> Option<Level> {
        match self {
            Level::Detector => None,
            other => Level::try_from(other.index() - 1).ok(),
        }
    }

    /// Short name used in dumps and log lines.
    pub fn abbreviation(self) -> &'static str {
        match self {
            Level::Detector => "Dt",
            Level::Side => "Bc",
            Level::Layer => "Ly",
            Level::PhiModule => "Md",
            Level::Board => "Br",
            Level::Chip => "Ch",
            Level::Straw => "St",
        }
    }
}

impl TryFrom<u8> for Level {
    type Error = DriftCalError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Level::ALL
            .get(value as usize)
            .copied()
            .ok_or(DriftCalError::InvalidLevel(value as i64))
    }
}

impl TryFrom<i64> for Level {
    type Error = DriftCalError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| DriftCalError::InvalidLevel(value))
            .and_then(Level::try_from)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Detector => "detector",
            Level::Side => "barrel/endcap",
            Level::Layer => "layer",
            Level::PhiModule => "phi-module",
            Level::Board => "board",
            Level::Chip => "chip",
            Level::Straw => "straw",
        };
        write!(f, "{name} ({})", self.index())
    }
}

/// Position indices measured for one hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StrawIndices {
    pub det: i32,
    pub lay: i32,
    pub module: i32,
    pub brd: i32,
    pub chp: i32,
    pub stl: i32,
    pub stw: i32,
    pub sid: i32,
}

impl StrawIndices {
    /// Index discriminating a sub-module at `level` among its siblings.
    ///
    /// The whole detector has no index; straws are identified by their straw id.
    pub fn index_at(&self, level: Level) -> Option<i32> {
        match level {
            Level::Detector => None,
            Level::Side => Some(self.det),
            Level::Layer => Some(self.lay),
            Level::PhiModule => Some(self.module),
            Level::Board => Some(self.brd),
            Level::Chip => Some(self.chp),
            Level::Straw => Some(self.sid),
        }
    }
}

/// Position indices stored on a record bound to one level.
///
/// Indices belonging to levels finer than the bound level are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub det: Option<i32>,
    pub lay: Option<i32>,
    pub module: Option<i32>,
    pub brd: Option<i32>,
    pub chp: Option<i32>,
    pub stl: Option<i32>,
    pub stw: Option<i32>,
    pub sid: Option<i32>,
}

impl Position {
    /// Keep the indices of `indices` that are discriminating at `level`.
    pub fn masked(indices: &StrawIndices, level: Level) -> Self {
        let keep = |owner: Level, value: i32| (owner <= level).then_some(value);
        Position {
            det: keep(Level::Side, indices.det),
            lay: keep(Level::Layer, indices.lay),
            module: keep(Level::PhiModule, indices.module),
            brd: keep(Level::Board, indices.brd),
            chp: keep(Level::Chip, indices.chp),
            stl: keep(Level::Straw, indices.stl),
            stw: keep(Level::Straw, indices.stw),
            sid: keep(Level::Straw, indices.sid),
        }
    }

    /// Same as [`StrawIndices::index_at`], `None` when the index was masked.
    pub fn index_at(&self, level: Level) -> Option<i32> {
        match level {
            Level::Detector => None,
            Level::Side => self.det,
            Level::Layer => self.lay,
            Level::PhiModule => self.module,
            Level::Board => self.brd,
            Level::Chip => self.chp,
            Level::Straw => self.sid,
        }
    }
}

/// Build the key of the sub-module containing `indices` at `level`.
pub fn sub_module_key(indices: &StrawIndices, level: Level) -> Key {
    if level.is_top() {
        return TOP_LEVEL_KEY.to_string();
    }
    Level::ALL[1..=level.index() as usize]
        .iter()
        .filter_map(|l| indices.index_at(*l))
        .map(|idx| format!("_{idx}"))
        .collect()
}

/// Key of the parent sub-module, `None` for the top-level key.
pub fn parent_key(key: &str) -> Option<Key> {
    if key == TOP_LEVEL_KEY {
        return None;
    }
    match key.rsplit_once('_') {
        Some(("", _)) | None => Some(TOP_LEVEL_KEY.to_string()),
        Some((prefix, _)) => Some(prefix.to_string()),
    }
}

/// Level a key belongs to, from its number of segments.
pub fn level_of_key(key: &str) -> Option<Level> {
    if key == TOP_LEVEL_KEY {
        return Some(Level::Detector);
    }
    if !key.starts_with('_') {
        return None;
    }
    let segments = key.matches('_').count();
    u8::try_from(segments)
        .ok()
        .and_then(|n| Level::try_from(n).ok())
        .filter(|l| !l.is_top())
}

#[cfg(test)]
mod hierarchy_test {
    use super::*;

    fn indices() -> StrawIndices {
        StrawIndices {
            det: -1,
            lay: 2,
            module: 17,
            brd: 4,
            chp: 9,
            stl: 3,
            stw: 12,
            sid: 4411,
        }
    }

    #[test]
    fn test_level_conversion() {
        assert_eq!(Level::try_from(5u8), Ok(Level::Chip));
        assert_eq!(Level::try_from(7u8), Err(DriftCalError::InvalidLevel(7)));
        assert_eq!(Level::try_from(-3i64), Err(DriftCalError::InvalidLevel(-3)));
        assert_eq!(Level::Chip.parent(), Some(Level::Board));
        assert_eq!(Level::Detector.parent(), None);
    }

    #[test]
    fn test_position_masking() {
        let pos = Position::masked(&indices(), Level::Layer);
        assert_eq!(pos.det, Some(-1));
        assert_eq!(pos.lay, Some(2));
        assert_eq!(pos.module, None);
        assert_eq!(pos.sid, None);

        let pos = Position::masked(&indices(), Level::Detector);
        assert_eq!(pos, Position::default());

        let pos = Position::masked(&indices(), Level::Straw);
        assert_eq!(pos.stl, Some(3));
        assert_eq!(pos.sid, Some(4411));
    }

    #[test]
    fn test_key_scheme() {
        let idx = indices();
        assert_eq!(sub_module_key(&idx, Level::Detector), "ALL");
        assert_eq!(sub_module_key(&idx, Level::Side), "_-1");
        assert_eq!(sub_module_key(&idx, Level::PhiModule), "_-1_2_17");
        assert_eq!(sub_module_key(&idx, Level::Straw), "_-1_2_17_4_9_4411");

        for level in &Level::ALL[1..] {
            let key = sub_module_key(&idx, *level);
            let parent = level.parent().unwrap();
            assert_eq!(parent_key(&key), Some(sub_module_key(&idx, parent)));
        }
        assert_eq!(parent_key("ALL"), None);
    }

    #[test]
    fn test_level_of_key() {
        let idx = indices();
        for level in Level::ALL {
            assert_eq!(level_of_key(&sub_module_key(&idx, level)), Some(level));
        }
        assert_eq!(level_of_key("_1_2_3_4_5_6_7"), None);
        assert_eq!(level_of_key("layer2"), None);

        let pos = Position::masked(&idx, Level::Chip);
        assert_eq!(pos.index_at(Level::Chip), Some(9));
        assert_eq!(pos.index_at(Level::Straw), None);
        assert_eq!(pos.index_at(Level::Detector), None);
    }
}
