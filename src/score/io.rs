//! I/O of batch scoring records.

use std::path::Path;

use crate::{error::ErrorReport, eval::result::GeneDrReport};

/// One row of the batch input TSV.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct InputRecord {
    /// Identifier of the sequence.
    pub sequence_id: String,
    /// Gene name.
    pub gene: String,
    /// Mutations separated by commas and/or whitespace.
    #[serde(default)]
    pub mutations: String,
}

/// Result line of the batch output.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RecordResult {
    /// Identifier of the sequence.
    pub sequence_id: String,
    /// Gene name.
    pub gene: String,
    /// Scoring result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<GeneDrReport>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// Read all records from a tab-separated file with header.
///
/// # Errors
///
/// If anything goes wrong, it returns a generic `anyhow::Error`.
pub fn read_records<P>(path: P) -> Result<Vec<InputRecord>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(path.as_ref())
        .map_err(|e| {
            anyhow::anyhow!("problem opening input {}: {}", path.as_ref().display(), e)
        })?;
    let mut result = Vec::new();
    for record in reader.deserialize() {
        let record: InputRecord =
            record.map_err(|e| anyhow::anyhow!("problem parsing input record: {}", e))?;
        result.push(record);
    }

    Ok(result)
}
