//! Aggregation of matched rules into per-drug scores.

use std::collections::BTreeSet;

use crate::{
    algorithm::{
        levels::LevelDefinition, Algorithm, CombinationKind, CombinationRule, DrugRules, Policy,
    },
    error::Error,
    mutations::MutationSet,
};

use super::{
    common::{total_score, SuggestedScore},
    matching::{matches, predicate_matches},
};

/// Kind of rule a partial score stems from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleKind {
    /// Single mutation rule.
    Atomic,
    /// Combination or MAX group rule.
    Combination,
}

/// Contribution of one matched rule.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PartialScore {
    /// The matched rule (for MAX groups, the winning member).
    pub rule: String,
    /// Kind of the rule.
    pub kind: RuleKind,
    /// Policy of a combination rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
    /// Declared score.
    pub score: f64,
    /// Positions consumed by the match.
    pub positions: BTreeSet<u32>,
    /// Whether an overriding combination replaced this contribution.
    #[serde(default)]
    pub superseded: bool,
    /// Id of the comment referenced by the rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl SuggestedScore for PartialScore {
    fn suggested_score(&self) -> f64 {
        if self.superseded {
            0.0
        } else {
            self.score
        }
    }
}

/// Score, level, and contributions for one drug.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DrugScore {
    /// Drug name.
    pub drug: String,
    /// Drug class name.
    pub drug_class: String,
    /// Sum of the non-superseded contributions.
    pub total_score: f64,
    /// Level whose range contains `total_score`.
    pub level: LevelDefinition,
    /// Contributions of all matched rules; atomic rules first, each in declaration order.
    pub partial_scores: Vec<PartialScore>,
}

/// Score one drug.
///
/// # Arguments
///
/// * `algorithm` - The algorithm providing the level table.
/// * `rules` - The rules of the drug within `algorithm`.
/// * `mutations` - The mutations of the gene.
///
/// # Errors
///
/// Returns `Error::DataIntegrity` if the total falls outside of the level table.
pub fn score_drug(
    algorithm: &Algorithm,
    rules: &DrugRules,
    mutations: &MutationSet,
) -> Result<DrugScore, Error> {
    let mut partial_scores = Vec::new();

    for rule in &rules.atomic_rules {
        if predicate_matches(&rule.predicate, mutations) {
            tracing::debug!(
                "{}: atomic rule {} matched ({})",
                rules.drug,
                rule.predicate,
                rule.score
            );
            partial_scores.push(PartialScore {
                rule: rule.predicate.to_string(),
                kind: RuleKind::Atomic,
                policy: None,
                score: rule.score,
                positions: BTreeSet::from([rule.predicate.position]),
                superseded: false,
                comment: rule.comment.clone(),
            });
        }
    }

    let mut overridden = BTreeSet::new();
    for rule in &rules.combination_rules {
        if let Some(partial) = match_combination(rule, mutations) {
            tracing::debug!(
                "{}: combination rule {} matched ({}, {})",
                rules.drug,
                partial.rule,
                partial.score,
                rule.policy
            );
            if rule.policy == Policy::Override {
                overridden.extend(partial.positions.iter().copied());
            }
            partial_scores.push(partial);
        }
    }

    for partial in partial_scores
        .iter_mut()
        .filter(|p| p.kind == RuleKind::Atomic)
    {
        if partial.positions.iter().any(|pos| overridden.contains(pos)) {
            tracing::trace!("{}: rule {} is superseded", rules.drug, partial.rule);
            partial.superseded = true;
        }
    }

    let total_score = total_score(&partial_scores);
    let level = algorithm.levels().lookup(total_score).cloned().ok_or_else(|| {
        tracing::error!(
            "score {} of drug {} in gene {} is outside all level ranges of algorithm {}",
            total_score,
            rules.drug,
            mutations.gene(),
            algorithm.name()
        );
        Error::DataIntegrity {
            algorithm: algorithm.name().to_string(),
            gene: mutations.gene().to_string(),
            drug: rules.drug.clone(),
            score: total_score,
        }
    })?;

    Ok(DrugScore {
        drug: rules.drug.clone(),
        drug_class: rules.drug_class.clone(),
        total_score,
        level,
        partial_scores,
    })
}

/// Match one combination rule; MAX groups resolve to their best satisfied member.
pub(crate) fn match_combination(rule: &CombinationRule, mutations: &MutationSet) -> Option<PartialScore> {
    let (member, result) = match &rule.kind {
        CombinationKind::Single(member) => {
            let result = matches(&member.condition, mutations);
            (member, result)
        }
        CombinationKind::Max(members) => members
            .iter()
            .map(|member| (member, matches(&member.condition, mutations)))
            .filter(|(_, result)| result.satisfied)
            .reduce(|best, curr| if curr.0.score > best.0.score { curr } else { best })?,
    };
    if !result.satisfied {
        return None;
    }

    Some(PartialScore {
        rule: member.condition.to_string(),
        kind: RuleKind::Combination,
        policy: Some(rule.policy),
        score: member.score,
        positions: result.positions,
        superseded: false,
        comment: rule.comment.clone(),
    })
}

#[cfg(test)]
mod test {
    use super::{score_drug, DrugScore, RuleKind};
    use crate::{
        algorithm::{
            test::{hivdb_v1, hivdb_v2},
            Algorithm,
        },
        catalog::test::catalog,
        error::Error,
        mutations::MutationSet,
    };

    fn score(
        algorithm: &Algorithm,
        gene: &str,
        drug: &str,
        mutations: &str,
    ) -> Result<DrugScore, anyhow::Error> {
        let rules = algorithm.drug_rules(gene, drug)?;
        let mutations = MutationSet::parse(gene, mutations)?;
        Ok(score_drug(algorithm, rules, &mutations)?)
    }

    #[rstest::rstest]
    fn single_184v(hivdb_v2: Algorithm) -> Result<(), anyhow::Error> {
        let result = score(&hivdb_v2, "RT", "ABC", "M184V")?;
        assert_eq!(result.total_score, 5.0);
        assert_eq!(result.partial_scores.len(), 1);
        assert_eq!(result.partial_scores[0].kind, RuleKind::Atomic);
        assert_eq!(result.level.text, "Susceptible");

        Ok(())
    }

    #[rstest::rstest]
    fn override_combination(hivdb_v2: Algorithm) -> Result<(), anyhow::Error> {
        let result = score(&hivdb_v2, "RT", "ABC", "L74V M184V")?;
        assert_eq!(result.total_score, 15.0);
        assert_eq!(result.level.level, 3);

        let superseded: Vec<_> = result
            .partial_scores
            .iter()
            .filter(|p| p.superseded)
            .map(|p| p.rule.as_str())
            .collect();
        assert_eq!(superseded, vec!["184IV", "74IV"]);
        insta::assert_yaml_snapshot!(result.partial_scores, @r###"
        - rule: 184IV
          kind: atomic
          score: 5.0
          positions:
            - 184
          superseded: true
          comment: RT184V
        - rule: 74IV
          kind: atomic
          score: 10.0
          positions:
            - 74
          superseded: true
          comment: RT74V
        - rule: 74V AND 184V
          kind: combination
          policy: override
          score: 15.0
          positions:
            - 74
            - 184
          superseded: false
        "###);

        Ok(())
    }

    #[rstest::rstest]
    fn legacy_combination_is_additive(hivdb_v1: Algorithm) -> Result<(), anyhow::Error> {
        let result = score(&hivdb_v1, "RT", "ABC", "L74V M184V")?;
        assert_eq!(result.total_score, 30.0);
        assert_eq!(result.level.text, "Intermediate Resistance");
        assert!(result.partial_scores.iter().all(|p| !p.superseded));

        Ok(())
    }

    #[rstest::rstest]
    fn max_group_and_select(hivdb_v2: Algorithm) -> Result<(), anyhow::Error> {
        let abc = score(&hivdb_v2, "RT", "ABC", "M41L D67N T215Y")?;
        let rules: Vec<_> = abc
            .partial_scores
            .iter()
            .map(|p| (p.rule.as_str(), p.score))
            .collect();
        assert_eq!(
            rules,
            vec![
                ("41L", 5.0),
                ("215FY", 10.0),
                ("67EGN AND 215FY", 10.0),
                (
                    "SELECT ATLEAST 2 FROM (41L, 67N, 70R, 210W, 215FY, 219EQ)",
                    5.0
                ),
            ]
        );
        assert_eq!(abc.total_score, 30.0);

        let azt = score(&hivdb_v2, "RT", "AZT", "M41L D67N T215Y")?;
        assert_eq!(azt.total_score, 80.0);
        assert_eq!(azt.level.sir.to_string(), "R");

        Ok(())
    }

    #[rstest::rstest]
    fn max_group_tie_goes_to_first_member(catalog: crate::catalog::Catalog) -> Result<(), anyhow::Error> {
        let text = r#"{"schema_version": 2, "family": "TEST", "version": "1.0",
            "publish_date": "2024-01-31",
            "levels": [{"level": 1, "text": "Susceptible", "sir": "S"}],
            "genes": [{"gene": "RT", "drugs": [{"drug": "ABC", "combination_rules": [
                {"max": [{"condition": "41L", "score": 5},
                         {"condition": "215Y", "score": 5}],
                 "policy": "override"}]}]}]}"#;
        let algorithm = Algorithm::load(text, &catalog)?;
        let result = score(&algorithm, "RT", "ABC", "41L 215Y")?;
        assert_eq!(result.partial_scores.len(), 1);
        assert_eq!(result.partial_scores[0].rule, "41L");
        assert_eq!(result.total_score, 5.0);

        Ok(())
    }

    #[rstest::rstest]
    fn mixture_triggers_both_rules(hivdb_v2: Algorithm) -> Result<(), anyhow::Error> {
        let result = score(&hivdb_v2, "RT", "TDF", "M184VI")?;
        assert_eq!(result.partial_scores.len(), 2);
        assert_eq!(result.total_score, -15.0);
        assert_eq!(result.level.level, 1);

        Ok(())
    }

    #[rstest::rstest]
    #[case("70E", 20.0)]
    #[case("K65R 70E", 75.0)]
    #[case("69T_", 60.0)]
    fn negation_and_insertion(
        hivdb_v2: Algorithm,
        #[case] mutations: &str,
        #[case] expected: f64,
    ) -> Result<(), anyhow::Error> {
        assert_eq!(score(&hivdb_v2, "RT", "TDF", mutations)?.total_score, expected);

        Ok(())
    }

    #[rstest::rstest]
    fn override_in_protease(hivdb_v1: Algorithm, hivdb_v2: Algorithm) -> Result<(), anyhow::Error> {
        assert_eq!(score(&hivdb_v2, "PR", "LPV", "M46I V82A")?.total_score, 45.0);
        assert_eq!(score(&hivdb_v1, "PR", "LPV", "M46I V82A")?.total_score, 85.0);

        Ok(())
    }

    #[rstest::rstest]
    fn additive_law(hivdb_v1: Algorithm) -> Result<(), anyhow::Error> {
        // Without overriding combinations, the total equals the sum of all
        // matched contributions.
        for mutations in ["L74V M184V", "M41L D67N T215Y", "K65R 70E", "M184VI"] {
            for drug in ["ABC", "AZT", "3TC", "TDF"] {
                let result = score(&hivdb_v1, "RT", drug, mutations)?;
                let sum: f64 = result.partial_scores.iter().map(|p| p.score).sum();
                assert_eq!(result.total_score, sum, "{drug} {mutations}");
            }
        }

        Ok(())
    }

    #[tracing_test::traced_test]
    #[rstest::rstest]
    fn overflowing_total_is_data_integrity_fault(
        catalog: crate::catalog::Catalog,
    ) -> Result<(), anyhow::Error> {
        let text = r#"{"schema_version": 2, "family": "TEST", "version": "1.0",
            "publish_date": "2024-01-31",
            "levels": [{"level": 1, "text": "Susceptible", "sir": "S"}],
            "genes": [{"gene": "RT", "drugs": [{"drug": "ABC", "rules": [
                {"condition": "41L", "score": 1e308}, {"condition": "67N", "score": 1e308}
            ]}]}]}"#;
        let algorithm = Algorithm::load(text, &catalog)?;
        let rules = algorithm.drug_rules("RT", "ABC")?;
        let mutations = MutationSet::parse("RT", "41L 67N")?;

        let err = score_drug(&algorithm, rules, &mutations).expect_err("must fail");
        assert_eq!(
            err,
            Error::DataIntegrity {
                algorithm: "TEST_1.0".into(),
                gene: "RT".into(),
                drug: "ABC".into(),
                score: f64::INFINITY,
            }
        );
        assert_eq!(
            err.to_string(),
            "score inf of drug ABC in gene RT is outside all level ranges of algorithm TEST_1.0"
        );
        assert!(logs_contain("outside all level ranges"));

        Ok(())
    }
}
