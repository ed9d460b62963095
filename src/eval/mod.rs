//! Evaluation of mutation sets under drug resistance algorithms.

pub mod common;
pub mod matching;
pub mod result;
pub mod score;

use crate::{
    algorithm::{Algorithm, DrugRules},
    error::Error,
    mutations::MutationSet,
};

use self::score::DrugScore;

/// Strategy for scoring one drug.
pub trait Scorer {
    /// Score the drug described by `rules` for `mutations`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DataIntegrity` if the total falls outside of the level table.
    fn score_drug(
        &self,
        algorithm: &Algorithm,
        rules: &DrugRules,
        mutations: &MutationSet,
    ) -> Result<DrugScore, Error>;
}

/// Scorer applying atomic and combination rules with their declared policies.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleScorer;

impl Scorer for RuleScorer {
    fn score_drug(
        &self,
        algorithm: &Algorithm,
        rules: &DrugRules,
        mutations: &MutationSet,
    ) -> Result<DrugScore, Error> {
        score::score_drug(algorithm, rules, mutations)
    }
}
