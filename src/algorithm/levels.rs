//! Score-to-level tables.

/// Clinical shorthand of a level.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Deserialize,
    serde::Serialize,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
)]
pub enum Sir {
    /// Susceptible
    S,
    /// Intermediate
    I,
    /// Resistant
    R,
}

/// One row of the level table.
///
/// A row covers the scores from its `min_score` (inclusive) to the `min_score`
/// of the next row (exclusive).  The first row has no lower bound.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct LevelDefinition {
    /// Ordinal level.
    pub level: u32,
    /// Display text, e.g., "Low-Level Resistance".
    pub text: String,
    /// SIR code.
    pub sir: Sir,
    /// Inclusive lower bound of the score range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
}

/// Validated level table; contiguous and exhaustive over all scores.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelTable {
    /// Rows ordered by ascending lower bound.
    levels: Vec<LevelDefinition>,
}

impl LevelTable {
    /// Construct and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the table is empty, the first row is
    /// bounded, later rows are unbounded or not strictly increasing in bound and level,
    /// or the SIR code decreases with the level.
    pub fn new(levels: Vec<LevelDefinition>) -> Result<Self, String> {
        let Some(first) = levels.first() else {
            return Err("level table is empty".to_string());
        };
        if let Some(min_score) = first.min_score {
            return Err(format!(
                "first level {} must not have a lower bound but has {}",
                first.level, min_score
            ));
        }
        for (prev, curr) in levels.iter().zip(levels.iter().skip(1)) {
            let Some(min_score) = curr.min_score else {
                return Err(format!("level {} has no lower bound", curr.level));
            };
            if !min_score.is_finite() {
                return Err(format!(
                    "level {} has non-finite lower bound {}",
                    curr.level, min_score
                ));
            }
            if prev.min_score.is_some_and(|prev_min| prev_min >= min_score) {
                return Err(format!(
                    "lower bound of level {} is not above that of level {}",
                    curr.level, prev.level
                ));
            }
            if prev.level >= curr.level {
                return Err(format!(
                    "level {} does not increase over level {}",
                    curr.level, prev.level
                ));
            }
            if prev.sir > curr.sir {
                return Err(format!(
                    "SIR {} of level {} is below SIR {} of level {}",
                    curr.sir, curr.level, prev.sir, prev.level
                ));
            }
        }

        Ok(Self { levels })
    }

    /// All rows, ordered by ascending lower bound.
    pub fn levels(&self) -> &[LevelDefinition] {
        &self.levels
    }

    /// The row for the lowest scores.
    pub fn baseline(&self) -> &LevelDefinition {
        &self.levels[0]
    }

    /// The row whose range contains `score`.
    ///
    /// Only non-finite scores fall outside of a validated table.
    pub fn lookup(&self, score: f64) -> Option<&LevelDefinition> {
        if !score.is_finite() {
            return None;
        }
        self.levels
            .iter()
            .rev()
            .find(|def| def.min_score.map_or(true, |min_score| score >= min_score))
    }

    /// The half-open score range `[lower, upper)` of `level`; `None` means unbounded.
    pub fn range_of(&self, level: u32) -> Option<(Option<f64>, Option<f64>)> {
        let idx = self.levels.iter().position(|def| def.level == level)?;
        let upper = self.levels.get(idx + 1).and_then(|next| next.min_score);
        Some((self.levels[idx].min_score, upper))
    }
}

#[cfg(test)]
pub mod test {
    use strum::IntoEnumIterator as _;

    use super::{LevelDefinition, LevelTable, Sir};

    fn def(level: u32, text: &str, sir: Sir, min_score: Option<f64>) -> LevelDefinition {
        LevelDefinition {
            level,
            text: text.to_string(),
            sir,
            min_score,
        }
    }

    /// The five HIVDB levels.
    #[rstest::fixture]
    pub fn hivdb_levels() -> LevelTable {
        LevelTable::new(vec![
            def(1, "Susceptible", Sir::S, None),
            def(2, "Potential Low-Level Resistance", Sir::S, Some(10.0)),
            def(3, "Low-Level Resistance", Sir::I, Some(15.0)),
            def(4, "Intermediate Resistance", Sir::I, Some(30.0)),
            def(5, "High-Level Resistance", Sir::R, Some(60.0)),
        ])
        .expect("valid level table")
    }

    #[rstest::rstest]
    #[case(-35.0, 1)]
    #[case(0.0, 1)]
    #[case(9.5, 1)]
    #[case(10.0, 2)]
    #[case(14.0, 2)]
    #[case(15.0, 3)]
    #[case(59.0, 4)]
    #[case(60.0, 5)]
    #[case(1000.0, 5)]
    fn lookup(hivdb_levels: LevelTable, #[case] score: f64, #[case] level: u32) {
        assert_eq!(hivdb_levels.lookup(score).map(|def| def.level), Some(level));
    }

    #[rstest::rstest]
    fn lookup_non_finite(hivdb_levels: LevelTable) {
        assert_eq!(hivdb_levels.lookup(f64::NAN), None);
        assert_eq!(hivdb_levels.lookup(f64::INFINITY), None);
    }

    #[rstest::rstest]
    fn lookup_is_monotonic(hivdb_levels: LevelTable) {
        let levels: Vec<u32> = (-50..120)
            .map(|score| {
                hivdb_levels
                    .lookup(f64::from(score))
                    .map(|def| def.level)
                    .unwrap_or_default()
            })
            .collect();
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));
        assert!(levels.iter().all(|level| *level > 0));
    }

    #[rstest::rstest]
    fn range_of(hivdb_levels: LevelTable) {
        assert_eq!(hivdb_levels.range_of(1), Some((None, Some(10.0))));
        assert_eq!(hivdb_levels.range_of(3), Some((Some(15.0), Some(30.0))));
        assert_eq!(hivdb_levels.range_of(5), Some((Some(60.0), None)));
        assert_eq!(hivdb_levels.range_of(6), None);
    }

    #[rstest::rstest]
    fn baseline_snapshot(hivdb_levels: LevelTable) {
        insta::assert_yaml_snapshot!(hivdb_levels.baseline(), @r###"
        level: 1
        text: Susceptible
        sir: S
        "###);
    }

    #[test]
    fn sir_ordering() {
        assert_eq!(Sir::iter().collect::<Vec<_>>(), vec![Sir::S, Sir::I, Sir::R]);
        assert_eq!(Sir::I.to_string(), "I");
        assert_eq!("R".parse::<Sir>().ok(), Some(Sir::R));
    }

    #[rstest::rstest]
    #[case(vec![], "level table is empty")]
    #[case(
        vec![def(1, "S", Sir::S, Some(0.0))],
        "first level 1 must not have a lower bound but has 0"
    )]
    #[case(
        vec![def(1, "S", Sir::S, None), def(2, "R", Sir::R, None)],
        "level 2 has no lower bound"
    )]
    #[case(
        vec![def(1, "S", Sir::S, None), def(2, "I", Sir::I, Some(10.0)), def(3, "R", Sir::R, Some(10.0))],
        "lower bound of level 3 is not above that of level 2"
    )]
    #[case(
        vec![def(2, "S", Sir::S, None), def(1, "R", Sir::R, Some(10.0))],
        "level 1 does not increase over level 2"
    )]
    #[case(
        vec![def(1, "R", Sir::R, None), def(2, "S", Sir::S, Some(10.0))],
        "SIR S of level 2 is below SIR R of level 1"
    )]
    #[case(
        vec![def(1, "S", Sir::S, None), def(2, "R", Sir::R, Some(f64::INFINITY))],
        "level 2 has non-finite lower bound inf"
    )]
    fn invalid_tables(#[case] levels: Vec<LevelDefinition>, #[case] message: &str) {
        assert_eq!(LevelTable::new(levels).err().as_deref(), Some(message));
    }
}
