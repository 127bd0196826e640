//! # Sub-module selection
//!
//! A [`Selection`] decides, for one hierarchy level, which sub-modules are allowed to compute
//! their own constants and whether the level is processed at all.
//!
//! Selections are written as a list of sub-module indices, with two reserved values:
//!
//! * `-3` (or `all`) – every sub-module of the level is selected,
//! * `-4` (or `none`) – the level is skipped entirely.
//!
//! ```rust
//! use driftcal::selection::Selection;
//!
//! let sel: Selection = "1, 3 5".parse().unwrap();
//! assert!(sel.check_selection(Some(3)));
//! assert!(!sel.check_selection(Some(2)));
//! assert!(!sel.skip());
//! ```
use std::{collections::BTreeSet, fmt, str::FromStr};

use itertools::Itertools;
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{i32 as parse_i32, multispace0, multispace1},
    combinator::{all_consuming, map, value},
    multi::separated_list1,
    sequence::delimited,
    IResult, Parser,
};

use crate::driftcal_errors::DriftCalError;

/// Index value meaning "every sub-module".
pub const SELECT_ALL: i32 = -3;
/// Index value meaning "skip the level".
pub const SELECT_NONE: i32 = -4;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Skip,
    Only(BTreeSet<i32>),
}

impl Selection {
    /// Build a selection from raw index values, honoring the reserved values.
    pub fn from_indices<I: IntoIterator<Item = i32>>(indices: I) -> Self {
        let set: BTreeSet<i32> = indices.into_iter().collect();
        if set.contains(&SELECT_NONE) {
            Selection::Skip
        } else if set.contains(&SELECT_ALL) {
            Selection::All
        } else {
            Selection::Only(set)
        }
    }

    /// Whether the sub-module with the given index may compute its own constants.
    ///
    /// The whole detector has no index and is selected unless the level is skipped.
    pub fn check_selection(&self, index: Option<i32>) -> bool {
        match self {
            Selection::All => true,
            Selection::Skip => false,
            Selection::Only(set) => index.map_or(true, |i| set.contains(&i)),
        }
    }

    /// Whether the whole level is skipped.
    pub fn skip(&self) -> bool {
        matches!(self, Selection::Skip)
    }
}

fn parse_index_list(input: &str) -> IResult<&str, Vec<i32>> {
    separated_list1(
        alt((delimited(multispace0, tag(","), multispace0), multispace1)),
        parse_i32,
    )
    .parse(input)
}

fn parse_selection(input: &str) -> IResult<&str, Selection> {
    all_consuming(delimited(
        multispace0,
        alt((
            value(Selection::All, tag_no_case("all")),
            value(Selection::Skip, tag_no_case("none")),
            map(parse_index_list, Selection::from_indices),
        )),
        multispace0,
    ))
    .parse(input)
}

impl FromStr for Selection {
    type Err = DriftCalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Selection::All);
        }
        parse_selection(s)
            .map(|(_, sel)| sel)
            .map_err(|_| DriftCalError::InvalidSelection(s.to_string()))
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => write!(f, "all"),
            Selection::Skip => write!(f, "none"),
            Selection::Only(set) => write!(f, "{}", set.iter().join(",")),
        }
    }
}

#[cfg(test)]
mod selection_test {
    use super::*;

    #[test]
    fn test_parse_selection() {
        assert_eq!("all".parse::<Selection>(), Ok(Selection::All));
        assert_eq!(" NONE ".parse::<Selection>(), Ok(Selection::Skip));
        assert_eq!("-3".parse::<Selection>(), Ok(Selection::All));
        assert_eq!("1,-4".parse::<Selection>(), Ok(Selection::Skip));
        assert_eq!("".parse::<Selection>(), Ok(Selection::All));
        assert_eq!(
            "2, 4 7".parse::<Selection>(),
            Ok(Selection::Only([2, 4, 7].into_iter().collect()))
        );
        assert_eq!(
            "2;4".parse::<Selection>(),
            Err(DriftCalError::InvalidSelection("2;4".into()))
        );
    }

    #[test]
    fn test_check_selection() {
        let sel = Selection::from_indices([0, 1]);
        assert!(sel.check_selection(Some(1)));
        assert!(!sel.check_selection(Some(2)));
        assert!(sel.check_selection(None));
        assert!(!sel.skip());

        assert!(Selection::All.check_selection(Some(42)));
        assert!(!Selection::Skip.check_selection(Some(42)));
        assert!(Selection::Skip.skip());
        assert_eq!(sel.to_string(), "0,1");
    }
}
