//! Error types of the scoring engine.
//!
//! Load-time problems are reported when a catalog or algorithm document is
//! handed in; evaluation of a validated model only fails on caller input
//! (unknown drug/gene) or on a corrupt level table.

/// Errors raised by the catalog, algorithm model, and evaluator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The algorithm document is not well-formed or references unknown entities.
    #[error("malformed algorithm {algorithm}: {reason}")]
    MalformedAlgorithm {
        /// Name of the algorithm (or `<unknown>` if the header could not be read).
        algorithm: String,
        /// Description of the problem.
        reason: String,
    },
    /// The catalog document is not well-formed.
    #[error("malformed catalog: {0}")]
    MalformedCatalog(String),
    /// A different document was already registered under the same name.
    #[error("conflicting definition for algorithm {0}")]
    ConflictingAlgorithm(String),
    /// No algorithm with the given name has been registered.
    #[error("unknown algorithm {0}")]
    UnknownAlgorithm(String),
    /// The gene is not known in the given context.
    #[error("unknown gene {gene} ({context})")]
    UnknownGene {
        /// Gene name as queried.
        gene: String,
        /// Catalog or algorithm the lookup was made against.
        context: String,
    },
    /// The drug does not belong to the gene's drug classes or the algorithm.
    #[error("unknown drug {drug} for gene {gene} under algorithm {algorithm}")]
    UnknownDrug {
        /// Drug name as queried.
        drug: String,
        /// Gene the drug was queried for.
        gene: String,
        /// Algorithm the lookup was made against.
        algorithm: String,
    },
    /// The mutation text could not be interpreted.
    #[error("invalid mutation {input:?}: {reason}")]
    InvalidMutation {
        /// Offending input.
        input: String,
        /// Description of the problem.
        reason: String,
    },
    /// A total score fell outside of all level ranges.
    #[error(
        "score {score} of drug {drug} in gene {gene} is outside all level ranges of algorithm {algorithm}"
    )]
    DataIntegrity {
        /// Algorithm with the incomplete level table.
        algorithm: String,
        /// Gene the drug was scored for.
        gene: String,
        /// Drug being scored.
        drug: String,
        /// Offending total score.
        score: f64,
    },
}

impl Error {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::MalformedAlgorithm { .. } => "malformed_algorithm",
            Error::MalformedCatalog(_) => "malformed_catalog",
            Error::ConflictingAlgorithm(_) => "conflicting_algorithm",
            Error::UnknownAlgorithm(_) => "unknown_algorithm",
            Error::UnknownGene { .. } => "unknown_gene",
            Error::UnknownDrug { .. } => "unknown_drug",
            Error::InvalidMutation { .. } => "invalid_mutation",
            Error::DataIntegrity { .. } => "data_integrity",
        }
    }

    /// Shortcut for constructing `Error::MalformedAlgorithm`.
    pub(crate) fn malformed<A, R>(algorithm: A, reason: R) -> Self
    where
        A: Into<String>,
        R: Into<String>,
    {
        Error::MalformedAlgorithm {
            algorithm: algorithm.into(),
            reason: reason.into(),
        }
    }

    /// Shortcut for constructing `Error::InvalidMutation`.
    pub(crate) fn invalid_mutation<I, R>(input: I, reason: R) -> Self
    where
        I: Into<String>,
        R: Into<String>,
    {
        Error::InvalidMutation {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Structured error for API consumers and batch output.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ErrorReport {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl From<&Error> for ErrorReport {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Error, ErrorReport};

    #[test]
    fn report_from_unknown_drug() {
        let err = Error::UnknownDrug {
            drug: "DRV".into(),
            gene: "RT".into(),
            algorithm: "HIVDB_9.4".into(),
        };
        let report = ErrorReport::from(&err);

        assert_eq!(report.code, "unknown_drug");
        assert_eq!(
            report.message,
            "unknown drug DRV for gene RT under algorithm HIVDB_9.4"
        );
    }

    #[test]
    fn malformed_shortcut() {
        let err = Error::malformed("HIVDB_9.4", "bad level table");
        assert_eq!(err.code(), "malformed_algorithm");
        assert_eq!(
            err.to_string(),
            "malformed algorithm HIVDB_9.4: bad level table"
        );
    }
}
