//! # Old t0 constants
//!
//! Reading a persisted `key t0` table and overriding the reconstruction t0 of the records it
//! names. The table is a whitespace-separated stream of `(key, t0)` pairs; line breaks carry no
//! meaning, and a `#` starts a comment running to the end of the line.
//!
//! ```text
//! # key        t0
//! ALL          12.31
//! _1           12.08
//! _1_0         11.97
//! ```
//!
//! Keys present in the table but unknown to the calibrator are reported and ignored. Records
//! missing from the table keep the value accumulated from their hits.
use camino::Utf8Path;
use log::{info, warn};
use nom::{
    branch::alt,
    bytes::complete::{is_not, take_till1},
    character::complete::{char, multispace1},
    combinator::{all_consuming, map, opt, recognize},
    multi::many0,
    number::complete::double,
    sequence::{pair, preceded},
    IResult, Parser,
};

use crate::{calibrator::Calibrator, constants::Nanosecond, driftcal_errors::DriftCalError};

/// One `(key, t0)` pair of the table.
#[derive(Debug, Clone, PartialEq)]
pub struct OldT0 {
    pub key: String,
    pub t0: Nanosecond,
}

fn skip_blank(input: &str) -> IResult<&str, ()> {
    map(
        many0(alt((
            multispace1,
            recognize(pair(char('#'), opt(is_not("\n")))),
        ))),
        |_| (),
    )
    .parse(input)
}

fn parse_entry(input: &str) -> IResult<&str, OldT0> {
    let (input, key) = take_till1(|c: char| c.is_whitespace() || c == '#').parse(input)?;
    let (input, t0) = preceded(multispace1, double).parse(input)?;
    Ok((
        input,
        OldT0 {
            key: key.to_string(),
            t0,
        },
    ))
}

/// Parse a whole table.
///
/// Return
/// ----------
/// * The pairs in file order, or [`DriftCalError::OldConstantsParsing`] naming the first
///   unparsable token.
pub fn parse_old_t0_table(input: &str) -> Result<Vec<OldT0>, DriftCalError> {
    let table = all_consuming(preceded(
        skip_blank,
        many0(map(pair(parse_entry, skip_blank), |(entry, _)| entry)),
    ))
    .parse(input);

    match table {
        Ok((_, entries)) => Ok(entries),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            let at = e.input.split_whitespace().next().unwrap_or("");
            Err(DriftCalError::OldConstantsParsing(format!(
                "unexpected token {at:?}"
            )))
        }
        Err(nom::Err::Incomplete(_)) => Err(DriftCalError::OldConstantsParsing(
            "truncated table".into(),
        )),
    }
}

impl Calibrator {
    /// Override the reconstruction t0 of every record named in `table`.
    ///
    /// Return
    /// ----------
    /// * The number of records updated.
    pub fn update_old_constants(&mut self, table: &str) -> Result<usize, DriftCalError> {
        let entries = parse_old_t0_table(table)?;
        let level = self.level().abbreviation();
        let mut updated = 0;
        let mut unmatched = 0;

        for entry in &entries {
            match self.record_mut(&entry.key) {
                Some(rec) => {
                    rec.old_t0 = entry.t0;
                    updated += 1;
                }
                None => {
                    warn!("{level}: old t0 for unknown key {}", entry.key);
                    unmatched += 1;
                }
            }
        }

        info!("{level}: {updated} old t0 constants applied, {unmatched} ignored");
        Ok(updated)
    }

    /// [`update_old_constants`](Calibrator::update_old_constants) from a file.
    pub fn update_old_constants_from_file(
        &mut self,
        path: &Utf8Path,
    ) -> Result<usize, DriftCalError> {
        let content = std::fs::read_to_string(path)?;
        self.update_old_constants(&content)
    }
}

#[cfg(test)]
mod old_constants_test {
    use super::*;
    use crate::{hierarchy::Level, hit::HitSample, params::CalibratorParams};

    #[test]
    fn test_parse_table() {
        let table = "# key t0\nALL 12.5\n_1   -0.25 _2 3e1\n\n_2_0\t4 # trailing\n";
        let entries = parse_old_t0_table(table).unwrap();
        assert_eq!(
            entries,
            vec![
                OldT0 { key: "ALL".into(), t0: 12.5 },
                OldT0 { key: "_1".into(), t0: -0.25 },
                OldT0 { key: "_2".into(), t0: 30.0 },
                OldT0 { key: "_2_0".into(), t0: 4.0 },
            ]
        );
        assert_eq!(parse_old_t0_table("").unwrap(), vec![]);
        assert_eq!(parse_old_t0_table("  # nothing\n").unwrap(), vec![]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_old_t0_table("ALL twelve"),
            Err(DriftCalError::OldConstantsParsing(_))
        ));
        assert!(parse_old_t0_table("ALL 1.0 _1").is_err());
    }

    #[test]
    fn test_update_old_constants() {
        let mut cal = Calibrator::new(Level::Side, CalibratorParams::default());
        let hit = HitSample {
            t0: 7.0,
            ..Default::default()
        };
        cal.add_hit("_0", &hit, None, false).unwrap();
        cal.add_hit("_1", &hit, None, false).unwrap();

        let n = cal.update_old_constants("_1 9.5\n_5 3.0\n").unwrap();
        assert_eq!(n, 1);
        assert_eq!(cal.get("_1").unwrap().old_t0, 9.5);
        assert_eq!(cal.get("_0").unwrap().old_t0, 7.0);
        assert!(!cal.has_key("_5"));
    }
}
