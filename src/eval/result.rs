//! Drug resistance result for one gene.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::OnceLock,
};

use crate::{
    algorithm::{levels::Sir, Algorithm, GeneRules},
    catalog::Catalog,
    error::Error,
    mutations::MutationSet,
};

use super::{
    matching::{matches, predicate_matches},
    score::{match_combination, DrugScore},
    RuleScorer, Scorer,
};

/// A comment triggered by the mutations.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct TriggeredComment {
    /// Comment id.
    pub id: String,
    /// Comment text.
    pub text: String,
    /// Drug class the comment is filed under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drug_class: Option<String>,
    /// Positions that triggered the comment.
    pub positions: BTreeSet<u32>,
}

/// Serializable snapshot of a `GeneDr`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct GeneDrReport {
    /// Name of the algorithm.
    pub algorithm: String,
    /// Gene name.
    pub gene: String,
    /// The scored mutations.
    pub mutations: String,
    /// Per-drug results in declaration order.
    pub drug_scores: Vec<DrugScore>,
    /// Triggered comments in declaration order.
    pub comments: Vec<TriggeredComment>,
}

/// Drug resistance of one gene's mutations under one algorithm.
///
/// Scores for all covered drugs are computed on first access and kept.
#[derive(Debug)]
pub struct GeneDr<'a, S = RuleScorer> {
    /// The algorithm.
    algorithm: &'a Algorithm,
    /// Catalog used to check drug membership.
    catalog: &'a Catalog,
    /// Rules of the gene within `algorithm`.
    gene_rules: &'a GeneRules,
    /// The mutations.
    mutations: &'a MutationSet,
    /// Scoring strategy.
    scorer: S,
    /// Per-drug results, indexed like `gene_rules.drugs()`.
    drug_scores: OnceLock<Vec<Result<DrugScore, Error>>>,
    /// Triggered comments.
    comments: OnceLock<Vec<TriggeredComment>>,
}

impl<'a> GeneDr<'a, RuleScorer> {
    /// Construct with the default scorer.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownGene` if the gene is known to neither the catalog nor
    /// the algorithm and `Error::InvalidMutation` for positions outside of the gene.
    pub fn new(
        algorithm: &'a Algorithm,
        catalog: &'a Catalog,
        mutations: &'a MutationSet,
    ) -> Result<Self, Error> {
        Self::with_scorer(algorithm, catalog, mutations, RuleScorer)
    }
}

impl<'a, S> GeneDr<'a, S>
where
    S: Scorer,
{
    /// Construct with a custom scorer.
    ///
    /// # Errors
    ///
    /// See `GeneDr::new`.
    pub fn with_scorer(
        algorithm: &'a Algorithm,
        catalog: &'a Catalog,
        mutations: &'a MutationSet,
        scorer: S,
    ) -> Result<Self, Error> {
        let gene = catalog.require_gene(mutations.gene())?;
        mutations.validate(gene)?;
        let gene_rules = algorithm.require_gene(mutations.gene())?;

        Ok(Self {
            algorithm,
            catalog,
            gene_rules,
            mutations,
            scorer,
            drug_scores: OnceLock::new(),
            comments: OnceLock::new(),
        })
    }

    /// Name of the gene.
    pub fn gene(&self) -> &str {
        self.gene_rules.gene()
    }

    /// The algorithm.
    pub fn algorithm(&self) -> &Algorithm {
        self.algorithm
    }

    /// The mutations.
    pub fn mutations(&self) -> &MutationSet {
        self.mutations
    }

    /// Drugs covered for the gene, in declaration order.
    pub fn drugs(&self) -> Vec<&str> {
        self.gene_rules
            .drugs()
            .iter()
            .map(|rules| rules.drug.as_str())
            .collect()
    }

    fn all_drug_scores(&self) -> &[Result<DrugScore, Error>] {
        self.drug_scores.get_or_init(|| {
            tracing::debug!(
                "scoring {} drugs of gene {} under {}",
                self.gene_rules.drugs().len(),
                self.gene(),
                self.algorithm.name()
            );
            self.gene_rules
                .drugs()
                .iter()
                .map(|rules| {
                    self.scorer
                        .score_drug(self.algorithm, rules, self.mutations)
                })
                .collect()
        })
    }

    /// Full result for one drug, including partial scores.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownDrug` if the drug is not in the gene's drug classes
    /// or not covered by the algorithm, and `Error::DataIntegrity` if its total
    /// falls outside of the level table.
    pub fn drug_score(&self, drug: &str) -> Result<&DrugScore, Error> {
        let idx = self
            .gene_rules
            .drug_index(drug)
            .filter(|_| self.catalog.drug_targets_gene(drug, self.gene()))
            .ok_or_else(|| Error::UnknownDrug {
                drug: drug.to_string(),
                gene: self.gene().to_string(),
                algorithm: self.algorithm.name().to_string(),
            })?;
        self.all_drug_scores()[idx].as_ref().map_err(Clone::clone)
    }

    /// Total score of one drug.
    ///
    /// # Errors
    ///
    /// See `GeneDr::drug_score`.
    pub fn total_score(&self, drug: &str) -> Result<f64, Error> {
        Ok(self.drug_score(drug)?.total_score)
    }

    /// Level number of one drug.
    ///
    /// # Errors
    ///
    /// See `GeneDr::drug_score`.
    pub fn level(&self, drug: &str) -> Result<u32, Error> {
        Ok(self.drug_score(drug)?.level.level)
    }

    /// Level text of one drug.
    ///
    /// # Errors
    ///
    /// See `GeneDr::drug_score`.
    pub fn level_text(&self, drug: &str) -> Result<&str, Error> {
        Ok(&self.drug_score(drug)?.level.text)
    }

    /// SIR code of one drug.
    ///
    /// # Errors
    ///
    /// See `GeneDr::drug_score`.
    pub fn level_sir(&self, drug: &str) -> Result<Sir, Error> {
        Ok(self.drug_score(drug)?.level.sir)
    }

    /// Triggered comments, once each, in declaration order.
    pub fn comments(&self) -> &[TriggeredComment] {
        self.comments.get_or_init(|| self.collect_comments())
    }

    fn collect_comments(&self) -> Vec<TriggeredComment> {
        let mut triggered: BTreeMap<usize, BTreeSet<u32>> = BTreeMap::new();
        let mut trigger = |id: &str, positions: &BTreeSet<u32>| {
            if let Some(idx) = self.gene_rules.comment_index(id) {
                triggered
                    .entry(idx)
                    .or_default()
                    .extend(positions.iter().copied());
            }
        };

        for comment in self.gene_rules.comments() {
            let result = matches(&comment.condition, self.mutations);
            if result.satisfied {
                trigger(&comment.id, &result.positions);
            }
        }
        for rules in self.gene_rules.drugs() {
            for rule in &rules.atomic_rules {
                if let Some(id) = &rule.comment {
                    if predicate_matches(&rule.predicate, self.mutations) {
                        trigger(id, &BTreeSet::from([rule.predicate.position]));
                    }
                }
            }
            for rule in &rules.combination_rules {
                if let Some(id) = &rule.comment {
                    if let Some(partial) = match_combination(rule, self.mutations) {
                        trigger(id, &partial.positions);
                    }
                }
            }
        }

        let comments = self.gene_rules.comments();
        triggered
            .into_iter()
            .map(|(idx, positions)| TriggeredComment {
                id: comments[idx].id.clone(),
                text: comments[idx].text.clone(),
                drug_class: comments[idx].drug_class.clone(),
                positions,
            })
            .collect()
    }

    /// Snapshot of all drug results and comments.
    ///
    /// # Errors
    ///
    /// Returns the first `Error::DataIntegrity` among the drugs.
    pub fn report(&self) -> Result<GeneDrReport, Error> {
        let drug_scores = self
            .all_drug_scores()
            .iter()
            .cloned()
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GeneDrReport {
            algorithm: self.algorithm.name().to_string(),
            gene: self.gene().to_string(),
            mutations: self.mutations.to_string(),
            drug_scores,
            comments: self.comments().to_vec(),
        })
    }
}
