//! Validation of algorithm documents.

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use itertools::Itertools as _;
use strum::IntoEnumIterator as _;

use crate::{
    algorithm::{levels::Sir, registry::AlgorithmRegistry, Algorithm},
    catalog::Catalog,
    common::read_text,
    error::ErrorReport,
};

/// Command line arguments for `check` command.
#[derive(Parser, Debug)]
#[command(about = "Validate algorithm documents", long_about = None)]
pub struct Args {
    /// Path to the catalog JSON file.
    #[clap(long)]
    pub path_catalog: PathBuf,

    /// The algorithm documents to check.
    #[clap(required = true)]
    pub paths_algorithm: Vec<PathBuf>,
}

/// Overview of one gene of a valid algorithm.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GeneSummary {
    pub gene: String,
    /// Drug classes the catalog lists for the gene.
    pub drug_classes: Vec<String>,
    pub drugs: Vec<String>,
    pub atomic_rules: usize,
    pub combination_rules: usize,
    pub comments: usize,
}

/// One row of the level table with its score range.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LevelSummary {
    pub level: u32,
    pub text: String,
    pub sir: Sir,
    /// Inclusive lower bound; unbounded if absent.
    pub min_score: Option<f64>,
    /// Exclusive upper bound; unbounded if absent.
    pub max_score: Option<f64>,
}

/// Overview of a valid algorithm.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AlgorithmSummary {
    pub name: String,
    pub family: String,
    pub version: String,
    pub publish_date: chrono::NaiveDate,
    pub schema_version: u32,
    /// Hex-encoded fingerprint of the document text.
    pub fingerprint: String,
    /// Number of levels per SIR code.
    pub sir_counts: Vec<(Sir, usize)>,
    pub levels: Vec<LevelSummary>,
    pub genes: Vec<GeneSummary>,
}

impl AlgorithmSummary {
    /// Summarize `algorithm`, taking drug classes from `catalog`.
    pub fn new(algorithm: &Algorithm, catalog: &Catalog) -> Self {
        let info = algorithm.info();
        let table = algorithm.levels();
        let sir_counts = Sir::iter()
            .map(|sir| {
                let count = table.levels().iter().filter(|def| def.sir == sir).count();
                (sir, count)
            })
            .collect();
        let levels = table
            .levels()
            .iter()
            .map(|def| {
                let (min_score, max_score) = table.range_of(def.level).unwrap_or_default();
                LevelSummary {
                    level: def.level,
                    text: def.text.clone(),
                    sir: def.sir,
                    min_score,
                    max_score,
                }
            })
            .collect();
        let genes = algorithm
            .genes()
            .iter()
            .map(|gene| GeneSummary {
                gene: gene.gene().to_string(),
                drug_classes: catalog
                    .drug_classes_of(gene.gene())
                    .map(|class| class.name.clone())
                    .collect(),
                drugs: gene.drugs().iter().map(|d| d.drug.clone()).collect(),
                atomic_rules: gene.drugs().iter().map(|d| d.atomic_rules.len()).sum(),
                combination_rules: gene
                    .drugs()
                    .iter()
                    .map(|d| d.combination_rules.len())
                    .sum(),
                comments: gene.comments().len(),
            })
            .collect();

        Self {
            name: info.name.clone(),
            family: info.family.clone(),
            version: info.version.clone(),
            publish_date: info.publish_date,
            schema_version: info.schema_version,
            fingerprint: format!("{:016x}", algorithm.fingerprint()),
            sir_counts,
            levels,
            genes,
        }
    }
}

/// Outcome of checking one document.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CheckResult {
    /// Path of the document.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<AlgorithmSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// Check all documents, registering the valid ones.
///
/// # Errors
///
/// If a document cannot be read, it returns a generic `anyhow::Error`.
pub fn check_documents(
    registry: &AlgorithmRegistry,
    paths: &[PathBuf],
) -> Result<Vec<CheckResult>, anyhow::Error> {
    paths
        .iter()
        .map(|path| {
            let text = read_text(path, "algorithm")?;
            let path = format!("{}", path.display());
            Ok(match registry.register(&text) {
                Ok(algorithm) => {
                    tracing::info!("- {}: ok ({})", path, algorithm.name());
                    CheckResult {
                        path,
                        summary: Some(AlgorithmSummary::new(&algorithm, registry.catalog())),
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::warn!("- {}: {}", path, e);
                    CheckResult {
                        path,
                        summary: None,
                        error: Some(ErrorReport::from(&e)),
                    }
                }
            })
        })
        .collect()
}

/// Main entry point for the `check` command.
///
/// # Arguments
///
/// * `common_args` - Commonly used command line arguments.
/// * `args` - Command line arguments specific to `check` command.
///
/// # Errors
///
/// If any document is invalid, it returns a generic `anyhow::Error`.
pub fn run(common_args: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("  running command `check`");
    tracing::info!("  common_args = {:?}", &common_args);
    tracing::info!("  args = {:?}", &args);

    let catalog = Catalog::load(&args.path_catalog)
        .map_err(|e| anyhow::anyhow!("failed to load catalog: {}", e))?;
    let registry = AlgorithmRegistry::new(Arc::new(catalog));

    let results = check_documents(&registry, &args.paths_algorithm)?;
    for result in &results {
        println!("{}", serde_json::to_string(result)?);
    }

    let failed = results.iter().filter(|r| r.error.is_some()).collect_vec();
    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!(
            "{} of {} algorithm documents are invalid: {}",
            failed.len(),
            results.len(),
            failed.iter().map(|r| r.path.as_str()).join(", ")
        )
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        algorithm::registry::AlgorithmRegistry,
        catalog::{test::catalog, Catalog},
    };

    #[rstest::rstest]
    fn check_documents(catalog: Catalog) -> Result<(), anyhow::Error> {
        let registry = AlgorithmRegistry::new(Arc::new(catalog));
        let results = super::check_documents(
            &registry,
            &[
                "tests/data/algorithms/hivdb_v2.json".into(),
                "tests/data/broken/missing_policy.json".into(),
            ],
        )?;

        assert_eq!(results.len(), 2);
        let summary = results[0].summary.as_ref().expect("valid document");
        assert_eq!(summary.name, "HIVDB_9.4");
        insta::assert_yaml_snapshot!(summary.sir_counts, @r###"
        - - S
          - 2
        - - I
          - 2
        - - R
          - 1
        "###);
        let ranges: Vec<_> = summary
            .levels
            .iter()
            .map(|l| (l.level, l.min_score, l.max_score))
            .collect();
        assert_eq!(
            ranges,
            vec![
                (1, None, Some(10.0)),
                (2, Some(10.0), Some(15.0)),
                (3, Some(15.0), Some(30.0)),
                (4, Some(30.0), Some(60.0)),
                (5, Some(60.0), None),
            ]
        );
        assert_eq!(summary.genes[1].drugs.len(), 6);
        assert_eq!(summary.genes[1].drug_classes, vec!["NRTI", "NNRTI"]);
        assert_eq!(
            results[1].error.as_ref().map(|e| e.code.as_str()),
            Some("malformed_algorithm")
        );
        assert_eq!(registry.names(), vec!["HIVDB_9.4"]);

        Ok(())
    }

    #[test]
    fn run_smoke() -> Result<(), anyhow::Error> {
        let common = crate::common::Args {
            verbose: clap_verbosity_flag::Verbosity::new(1, 0),
        };
        let args = super::Args {
            path_catalog: "tests/data/catalog.json".into(),
            paths_algorithm: vec![
                "tests/data/algorithms/hivdb_v1.json".into(),
                "tests/data/algorithms/hivdb_v2.json".into(),
            ],
        };

        super::run(&common, &args)
    }

    #[test]
    fn run_fails_on_invalid() {
        let common = crate::common::Args {
            verbose: clap_verbosity_flag::Verbosity::new(1, 0),
        };
        let args = super::Args {
            path_catalog: "tests/data/catalog.json".into(),
            paths_algorithm: vec!["tests/data/broken/missing_policy.json".into()],
        };

        let err = super::run(&common, &args).expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "1 of 1 algorithm documents are invalid: tests/data/broken/missing_policy.json"
        );
    }
}
