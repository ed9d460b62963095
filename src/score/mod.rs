//! Batch scoring of mutation lists.

pub mod io;

use std::path::PathBuf;

use clap::Parser;
use rayon::prelude::*;

use crate::{
    algorithm::Algorithm,
    catalog::Catalog,
    error::{Error, ErrorReport},
    eval::result::GeneDr,
    mutations::MutationSet,
};

use self::io::{InputRecord, RecordResult};

/// Command line arguments for `score` command.
#[derive(Parser, Debug)]
#[command(about = "Score mutation lists against an algorithm", long_about = None)]
pub struct Args {
    /// Path to the catalog JSON file.
    #[clap(long)]
    pub path_catalog: PathBuf,
    /// Path(s) to algorithm JSON files to load.
    #[clap(long, required = true)]
    pub path_algorithm: Vec<PathBuf>,
    /// Name of the algorithm to use; defaults to the latest of `--family`.
    #[clap(long)]
    pub algorithm: Option<String>,
    /// Family to pick the latest algorithm from.
    #[clap(long, default_value = "HIVDB")]
    pub family: String,
    /// Path to the TSV file with columns `sequence_id`, `gene`, `mutations`.
    #[clap(long)]
    pub path_input: PathBuf,
    /// Number of worker threads; 0 uses one per CPU.
    #[clap(long, default_value_t = 0, env = "HIVDR_THREADS")]
    pub threads: usize,
}

/// Score one input record; failures end up in the result.
pub fn score_record(algorithm: &Algorithm, catalog: &Catalog, record: &InputRecord) -> RecordResult {
    let outcome = MutationSet::parse(&record.gene, &record.mutations).and_then(|mutations| {
        log_partial_calls(&record.sequence_id, &mutations);
        GeneDr::new(algorithm, catalog, &mutations).and_then(|result| result.report())
    });
    let (result, error) = match outcome {
        Ok(report) => (Some(report), None),
        Err(e) => {
            if matches!(e, Error::DataIntegrity { .. }) {
                tracing::error!("{}: {}", record.sequence_id, e);
            } else {
                tracing::debug!("{}: {}", record.sequence_id, e);
            }
            (None, Some(ErrorReport::from(&e)))
        }
    };

    RecordResult {
        sequence_id: record.sequence_id.clone(),
        gene: record.gene.clone(),
        result,
        error,
    }
}

/// Log calls that are scored only by their unambiguous residues.
fn log_partial_calls(sequence_id: &str, mutations: &MutationSet) {
    for mutation in mutations.iter() {
        if mutation.is_ambiguous() {
            tracing::debug!("{}: ambiguous call {}", sequence_id, mutation);
        }
        if mutation.has_stop() {
            tracing::debug!("{}: stop codon in {}", sequence_id, mutation);
        }
    }
}

/// Score all records in parallel, keeping the input order.
pub fn score_records(
    algorithm: &Algorithm,
    catalog: &Catalog,
    records: &[InputRecord],
) -> Vec<RecordResult> {
    records
        .par_iter()
        .map(|record| score_record(algorithm, catalog, record))
        .collect()
}

/// Main entry point for the `score` command.
///
/// # Arguments
///
/// * `common_args` - Commonly used command line arguments.
/// * `args` - Command line arguments specific to `score` command.
///
/// # Errors
///
/// If anything goes wrong, it returns a generic `anyhow::Error`.
pub fn run(common_args: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("  running command `score`");
    tracing::info!("  common_args = {:?}", &common_args);
    tracing::info!("  args = {:?}", &args);

    let registry = crate::common::load_registry(&args.path_catalog, &args.path_algorithm)?;
    let algorithm = match &args.algorithm {
        Some(name) => registry.require(name)?,
        None => registry
            .latest(&args.family)
            .ok_or_else(|| anyhow::anyhow!("no algorithm of family {} loaded", args.family))?,
    };
    tracing::info!("Using algorithm {}", algorithm.name());

    let records = io::read_records(&args.path_input)?;
    tracing::info!("Scoring {} records ...", records.len());
    let before_scoring = std::time::Instant::now();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build thread pool: {}", e))?;
    let results = pool.install(|| score_records(&algorithm, registry.catalog(), &records));
    tracing::info!(
        "... done scoring {} records in {:?} ({} failed)",
        results.len(),
        before_scoring.elapsed(),
        results.iter().filter(|r| r.error.is_some()).count()
    );

    for result in &results {
        println!("{}", serde_json::to_string(result)?);
    }

    Ok(())
}
