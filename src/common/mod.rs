//! Commonly used code.

use std::{path::Path, sync::Arc};

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

use crate::{algorithm::registry::AlgorithmRegistry, catalog::Catalog};

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

/// Read a text file, naming the file on failure.
///
/// # Errors
///
/// If the file cannot be read, it returns a generic `anyhow::Error`.
pub fn read_text<P>(path: P, what: &str) -> Result<String, anyhow::Error>
where
    P: AsRef<Path>,
{
    std::fs::read_to_string(path.as_ref())
        .map_err(|e| anyhow::anyhow!("problem reading {} {}: {}", what, path.as_ref().display(), e))
}

/// Load the catalog and register all algorithm documents.
///
/// # Arguments
///
/// * `path_catalog` - Path to the catalog JSON file.
/// * `paths_algorithm` - Paths to the algorithm JSON files.
///
/// # Returns
///
/// A registry holding all algorithms.
///
/// # Errors
///
/// If any file cannot be read or any document is invalid, it returns a generic
/// `anyhow::Error`.
pub fn load_registry<P, Q>(
    path_catalog: P,
    paths_algorithm: &[Q],
) -> Result<AlgorithmRegistry, anyhow::Error>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    tracing::info!("Loading catalog ...");
    let catalog = Catalog::load(path_catalog)
        .map_err(|e| anyhow::anyhow!("failed to load catalog: {}", e))?;
    let registry = AlgorithmRegistry::new(Arc::new(catalog));

    tracing::info!("Loading {} algorithm documents ...", paths_algorithm.len());
    for path in paths_algorithm {
        let text = read_text(path, "algorithm")?;
        registry.register(&text).map_err(|e| {
            anyhow::anyhow!("failed to register {}: {}", path.as_ref().display(), e)
        })?;
    }
    tracing::info!("... done loading {} algorithms", registry.len());

    Ok(registry)
}

#[cfg(test)]
mod test {
    #[test]
    fn load_registry() -> Result<(), anyhow::Error> {
        let registry = super::load_registry(
            "tests/data/catalog.json",
            &[
                "tests/data/algorithms/hivdb_v1.json",
                "tests/data/algorithms/hivdb_v2.json",
            ],
        )?;
        assert_eq!(registry.names(), vec!["HIVDB_8.9", "HIVDB_9.4"]);

        Ok(())
    }

    #[test]
    fn load_registry_fails() {
        let err = super::load_registry(
            "tests/data/catalog.json",
            &["tests/data/broken/missing_policy.json"],
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("requires an explicit policy"));

        let err = super::load_registry("tests/data/nope.json", &[] as &[&str])
            .expect_err("must fail");
        assert!(err.to_string().starts_with("failed to load catalog"));
    }
}
