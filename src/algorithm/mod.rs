//! Rule definition model of drug resistance algorithms.
//!
//! An `Algorithm` is built once from the raw text of a document and never changes
//! afterwards.  All validation happens in `Algorithm::load`; evaluation code may
//! rely on the invariants checked there.

pub mod condition;
pub mod io;
pub mod levels;
pub mod registry;

use std::{hash::Hasher as _, ops::RangeInclusive};

use crate::{catalog::Catalog, error::Error};

use self::{
    condition::{Condition, MutationPredicate},
    levels::LevelTable,
};

/// Document schema versions understood by `Algorithm::load`.
pub const SCHEMA_VERSIONS: RangeInclusive<u32> = 1..=2;

/// How a matched combination rule interacts with the atomic rules it consumes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Deserialize,
    serde::Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Policy {
    /// The combination score is added on top of the atomic scores.
    Additive,
    /// The combination score replaces the atomic scores of the consumed positions.
    Override,
}

/// Identity of an algorithm version.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct AlgorithmInfo {
    /// Family, e.g., `HIVDB`.
    pub family: String,
    /// Unique name and registry key, e.g., `HIVDB_9.4`.
    pub name: String,
    /// Version within the family.
    pub version: String,
    /// Publication date.
    pub publish_date: chrono::NaiveDate,
    /// Layout version of the source document.
    pub schema_version: u32,
}

/// Score for a single mutation predicate.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AtomicRule {
    pub predicate: MutationPredicate,
    pub score: f64,
    /// Id of the comment triggered on match.
    pub comment: Option<String>,
}

/// A condition with the score it yields.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ScoredCondition {
    pub condition: Condition,
    pub score: f64,
}

impl std::fmt::Display for ScoredCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}) => {}", self.condition, self.score)
    }
}

/// Shape of a combination rule.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationKind {
    /// One condition and its score.
    Single(ScoredCondition),
    /// The best-scoring satisfied member counts; never empty.
    Max(Vec<ScoredCondition>),
}

/// Score for a combination of mutations.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CombinationRule {
    pub kind: CombinationKind,
    pub policy: Policy,
    /// Id of the comment triggered on match.
    pub comment: Option<String>,
}

impl std::fmt::Display for CombinationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            CombinationKind::Single(member) => write!(f, "{}", member.condition),
            CombinationKind::Max(members) => {
                write!(f, "MAX(")?;
                for (idx, member) in members.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{member}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// All rules scoring one drug.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DrugRules {
    /// Drug name.
    pub drug: String,
    /// Name of the drug's class.
    pub drug_class: String,
    /// Atomic rules in declaration order.
    pub atomic_rules: Vec<AtomicRule>,
    /// Combination rules in declaration order.
    pub combination_rules: Vec<CombinationRule>,
}

/// Comment definition.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CommentRule {
    pub id: String,
    /// Condition triggering the comment on its own.
    pub condition: Condition,
    pub text: String,
    pub drug_class: Option<String>,
}

/// Rules and comments of one gene.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneRules {
    /// Gene name.
    gene: String,
    /// Drug rules in declaration order.
    drugs: Vec<DrugRules>,
    /// Mapping from drug name to index in `drugs`.
    drug_idx: rustc_hash::FxHashMap<String, usize>,
    /// Comment definitions in declaration order.
    comments: Vec<CommentRule>,
    /// Mapping from comment id to index in `comments`.
    comment_idx: rustc_hash::FxHashMap<String, usize>,
}

impl GeneRules {
    /// Gene name.
    pub fn gene(&self) -> &str {
        &self.gene
    }

    /// Rules of all covered drugs in declaration order.
    pub fn drugs(&self) -> &[DrugRules] {
        &self.drugs
    }

    /// Rules of one drug, if covered.
    pub fn drug(&self, name: &str) -> Option<&DrugRules> {
        self.drug_idx.get(name).map(|idx| &self.drugs[*idx])
    }

    /// Index of the drug in declaration order.
    pub fn drug_index(&self, name: &str) -> Option<usize> {
        self.drug_idx.get(name).copied()
    }

    /// All comment definitions in declaration order.
    pub fn comments(&self) -> &[CommentRule] {
        &self.comments
    }

    /// Index of the comment in declaration order.
    pub fn comment_index(&self, id: &str) -> Option<usize> {
        self.comment_idx.get(id).copied()
    }
}

/// One validated version of a drug resistance algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct Algorithm {
    /// Identity.
    info: AlgorithmInfo,
    /// The document text the algorithm was built from.
    raw_text: String,
    /// Hash of `raw_text`.
    fingerprint: u64,
    /// Per-gene rules in declaration order.
    genes: Vec<GeneRules>,
    /// Mapping from gene name to index in `genes`.
    gene_idx: rustc_hash::FxHashMap<String, usize>,
    /// Score-to-level table.
    levels: LevelTable,
}

impl Algorithm {
    /// Build the algorithm from the raw text of its JSON document.
    ///
    /// Loading does no I/O; the text is handed in by the caller.
    ///
    /// # Arguments
    ///
    /// * `raw_text` - The document text.
    /// * `catalog` - Catalog to resolve genes, drug classes, and drugs against.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedAlgorithm` naming the algorithm and the offending
    /// gene, drug, or rule on the first problem found.
    pub fn load(raw_text: &str, catalog: &Catalog) -> Result<Self, Error> {
        let key = io::Header::peek(raw_text).key();
        let doc: io::Document =
            serde_json::from_str(raw_text).map_err(|e| Error::malformed(&key, e.to_string()))?;

        if doc.family.trim().is_empty() {
            return Err(Error::malformed(&key, "family is empty"));
        }
        if doc.version.trim().is_empty() {
            return Err(Error::malformed(&key, "version is empty"));
        }
        let name = key;
        if !SCHEMA_VERSIONS.contains(&doc.schema_version) {
            return Err(Error::malformed(
                &name,
                format!(
                    "unsupported schema version {} (supported: {}..={})",
                    doc.schema_version,
                    SCHEMA_VERSIONS.start(),
                    SCHEMA_VERSIONS.end()
                ),
            ));
        }
        let publish_date = chrono::NaiveDate::parse_from_str(&doc.publish_date, "%Y-%m-%d")
            .map_err(|e| {
                Error::malformed(
                    &name,
                    format!("invalid publish date {:?}: {}", doc.publish_date, e),
                )
            })?;
        let levels = LevelTable::new(doc.levels)
            .map_err(|e| Error::malformed(&name, format!("invalid level table: {e}")))?;

        let mut genes = Vec::with_capacity(doc.genes.len());
        let mut gene_idx = rustc_hash::FxHashMap::default();
        for block in doc.genes {
            if gene_idx.contains_key(&block.gene) {
                return Err(Error::malformed(
                    &name,
                    format!("duplicate gene {}", block.gene),
                ));
            }
            let gene_rules = load_gene(block, catalog, doc.schema_version, &name)
                .map_err(|reason| Error::malformed(&name, reason))?;
            gene_idx.insert(gene_rules.gene.clone(), genes.len());
            genes.push(gene_rules);
        }

        let info = AlgorithmInfo {
            family: doc.family,
            name,
            version: doc.version,
            publish_date,
            schema_version: doc.schema_version,
        };
        tracing::info!(
            "loaded algorithm {} (family {}, version {}, published {}, schema v{}) with {} genes",
            info.name,
            info.family,
            info.version,
            info.publish_date,
            info.schema_version,
            genes.len()
        );

        Ok(Self {
            info,
            raw_text: raw_text.to_string(),
            fingerprint: fingerprint(raw_text),
            genes,
            gene_idx,
            levels,
        })
    }

    /// Identity of the algorithm.
    pub fn info(&self) -> &AlgorithmInfo {
        &self.info
    }

    /// Unique name, e.g., `HIVDB_9.4`.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// The document text the algorithm was built from.
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Hash of the document text.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Score-to-level table.
    pub fn levels(&self) -> &LevelTable {
        &self.levels
    }

    /// Rules of all genes in declaration order.
    pub fn genes(&self) -> &[GeneRules] {
        &self.genes
    }

    /// Rules of one gene, if covered.
    pub fn gene(&self, name: &str) -> Option<&GeneRules> {
        self.gene_idx.get(name).map(|idx| &self.genes[*idx])
    }

    /// Rules of one gene or `Error::UnknownGene`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownGene` if the algorithm has no rules for the gene.
    pub fn require_gene(&self, name: &str) -> Result<&GeneRules, Error> {
        self.gene(name).ok_or_else(|| Error::UnknownGene {
            gene: name.to_string(),
            context: format!("algorithm {}", self.info.name),
        })
    }

    /// Rules of one drug for one gene.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownGene` if the gene is not covered and
    /// `Error::UnknownDrug` if the drug is not covered for the gene.
    pub fn drug_rules(&self, gene: &str, drug: &str) -> Result<&DrugRules, Error> {
        self.require_gene(gene)?
            .drug(drug)
            .ok_or_else(|| Error::UnknownDrug {
                drug: drug.to_string(),
                gene: gene.to_string(),
                algorithm: self.info.name.clone(),
            })
    }
}

/// Hash of an algorithm document's text.
pub fn fingerprint(raw_text: &str) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    hasher.write(raw_text.as_bytes());
    hasher.finish()
}

/// Convert and validate the block of one gene.
///
/// Errors are returned as messages naming the gene and rule; the caller adds the
/// algorithm name.
fn load_gene(
    block: io::GeneBlock,
    catalog: &Catalog,
    schema_version: u32,
    algorithm: &str,
) -> Result<GeneRules, String> {
    let gene = catalog
        .gene(&block.gene)
        .ok_or_else(|| format!("unknown gene {}", block.gene))?;
    let parse_condition = |text: &str, what: &str| -> Result<Condition, String> {
        let condition =
            Condition::parse(text).map_err(|e| format!("gene {} {}: {}", gene.name, what, e))?;
        condition
            .validate(gene)
            .map_err(|e| format!("gene {} {}: {}", gene.name, what, e))?;
        Ok(condition)
    };

    let mut comments = Vec::with_capacity(block.comments.len());
    let mut comment_idx = rustc_hash::FxHashMap::default();
    for entry in block.comments {
        let what = format!("comment {}", entry.id);
        if comment_idx.contains_key(&entry.id) {
            return Err(format!("gene {}: duplicate comment {}", gene.name, entry.id));
        }
        if let Some(class) = &entry.drug_class {
            if !catalog.drug_class(class).is_some_and(|c| c.gene == gene.name) {
                return Err(format!(
                    "gene {} {}: drug class {} does not target the gene",
                    gene.name, what, class
                ));
            }
        }
        let condition = parse_condition(&entry.condition, &what)?;
        comment_idx.insert(entry.id.clone(), comments.len());
        comments.push(CommentRule {
            id: entry.id,
            condition,
            text: entry.text,
            drug_class: entry.drug_class,
        });
    }
    let check_comment = |comment: Option<&str>, what: &str| -> Result<(), String> {
        match comment {
            Some(id) if !comment_idx.contains_key(id) => Err(format!(
                "gene {} {}: unknown comment {}",
                gene.name, what, id
            )),
            _ => Ok(()),
        }
    };
    let check_score = |score: f64, what: &str| -> Result<(), String> {
        if score.is_finite() {
            Ok(())
        } else {
            Err(format!(
                "gene {} {}: score {} is not finite",
                gene.name, what, score
            ))
        }
    };

    let mut drugs = Vec::with_capacity(block.drugs.len());
    let mut drug_idx = rustc_hash::FxHashMap::default();
    for drug_block in block.drugs {
        let drug = catalog
            .drug(&drug_block.drug)
            .ok_or_else(|| format!("gene {}: unknown drug {}", gene.name, drug_block.drug))?;
        if !catalog.drug_targets_gene(&drug.name, &gene.name) {
            return Err(format!(
                "gene {}: drug {} of class {} does not target the gene",
                gene.name, drug.name, drug.drug_class
            ));
        }
        if drug_idx.contains_key(&drug.name) {
            return Err(format!("gene {}: duplicate drug {}", gene.name, drug.name));
        }

        let mut atomic_rules = Vec::with_capacity(drug_block.rules.len());
        for (idx, entry) in drug_block.rules.into_iter().enumerate() {
            let what = format!("drug {} rule {}", drug.name, idx + 1);
            check_score(entry.score, &what)?;
            check_comment(entry.comment.as_deref(), &what)?;
            let condition = parse_condition(&entry.condition, &what)?;
            let predicate = condition.as_mutation().cloned().ok_or_else(|| {
                format!(
                    "gene {} {}: {} is not a single mutation",
                    gene.name, what, condition
                )
            })?;
            atomic_rules.push(AtomicRule {
                predicate,
                score: entry.score,
                comment: entry.comment,
            });
        }

        let mut combination_rules = Vec::with_capacity(drug_block.combination_rules.len());
        for (idx, entry) in drug_block.combination_rules.into_iter().enumerate() {
            let what = format!("drug {} combination rule {}", drug.name, idx + 1);
            let policy = match (schema_version, entry.policy()) {
                (1, None) => Policy::Additive,
                (1, Some(_)) => {
                    return Err(format!(
                        "gene {} {}: schema version 1 does not allow a policy",
                        gene.name, what
                    ))
                }
                (_, Some(policy)) => policy,
                (_, None) => {
                    return Err(format!(
                        "gene {} {}: schema version {} requires an explicit policy",
                        gene.name, what, schema_version
                    ))
                }
            };
            let comment = entry.comment().map(str::to_string);
            check_comment(comment.as_deref(), &what)?;
            let kind = match entry {
                io::CombinationEntry::Single(single) => {
                    check_score(single.score, &what)?;
                    CombinationKind::Single(ScoredCondition {
                        condition: parse_condition(&single.condition, &what)?,
                        score: single.score,
                    })
                }
                io::CombinationEntry::Max(max) => {
                    if max.max.is_empty() {
                        return Err(format!("gene {} {}: MAX group is empty", gene.name, what));
                    }
                    let members = max
                        .max
                        .iter()
                        .map(|member| {
                            check_score(member.score, &what)?;
                            Ok(ScoredCondition {
                                condition: parse_condition(&member.condition, &what)?,
                                score: member.score,
                            })
                        })
                        .collect::<Result<Vec<_>, String>>()?;
                    CombinationKind::Max(members)
                }
            };
            combination_rules.push(CombinationRule {
                kind,
                policy,
                comment,
            });
        }

        if atomic_rules.is_empty() && combination_rules.is_empty() {
            tracing::warn!(
                "algorithm {}: drug {} of gene {} has no rules",
                algorithm,
                drug.name,
                gene.name
            );
        }
        drug_idx.insert(drug.name.clone(), drugs.len());
        drugs.push(DrugRules {
            drug: drug.name.clone(),
            drug_class: drug.drug_class.clone(),
            atomic_rules,
            combination_rules,
        });
    }

    Ok(GeneRules {
        gene: gene.name.clone(),
        drugs,
        drug_idx,
        comments,
        comment_idx,
    })
}
