//! On-disk representation of algorithm documents.
//!
//! The records mirror the JSON layout one-to-one; conditions are kept as text and
//! only parsed when converting to the model in `super::Algorithm::load`.

use super::{levels::LevelDefinition, Policy};

/// Placeholder name used when even the header of a document cannot be read.
pub const UNKNOWN_NAME: &str = "<unknown>";

/// Lenient view on the identity fields, used for naming errors and registry keys
/// before the full document is validated.
#[derive(Debug, Default, serde::Deserialize)]
pub struct Header {
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Header {
    /// Read the header from `raw_text`; malformed text yields an empty header.
    pub fn peek(raw_text: &str) -> Self {
        serde_json::from_str(raw_text).unwrap_or_default()
    }

    /// Identity key of the document: `name`, else `{family}_{version}`.
    pub fn key(&self) -> String {
        match (&self.name, &self.family, &self.version) {
            (Some(name), _, _) if !name.is_empty() => name.clone(),
            (_, Some(family), Some(version)) => format!("{family}_{version}"),
            _ => UNKNOWN_NAME.to_string(),
        }
    }
}

/// A complete algorithm document.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct Document {
    /// Layout version of the document itself.
    pub schema_version: u32,
    /// Algorithm family, e.g., `HIVDB`.
    pub family: String,
    /// Algorithm version, e.g., `9.4`.
    pub version: String,
    /// Optional explicit name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// ISO 8601 publication date.
    pub publish_date: String,
    /// Level table.
    pub levels: Vec<LevelDefinition>,
    /// Per-gene rule blocks.
    pub genes: Vec<GeneBlock>,
}

/// Rules and comments for one gene.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeneBlock {
    /// Gene name.
    pub gene: String,
    /// Per-drug rule blocks.
    #[serde(default)]
    pub drugs: Vec<DrugBlock>,
    /// Comment definitions.
    #[serde(default)]
    pub comments: Vec<CommentEntry>,
}

/// Rules for one drug.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct DrugBlock {
    /// Drug name.
    pub drug: String,
    /// Atomic rules.
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
    /// Combination rules.
    #[serde(default)]
    pub combination_rules: Vec<CombinationEntry>,
}

/// `condition => score` for a single mutation.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEntry {
    pub condition: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Combination rule, either a single condition or a MAX group.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum CombinationEntry {
    /// `MAX(condition => score, ...)`
    Max(MaxEntry),
    /// `condition => score`
    Single(SingleEntry),
}

impl CombinationEntry {
    /// The declared policy, if any.
    pub fn policy(&self) -> Option<Policy> {
        match self {
            CombinationEntry::Max(entry) => entry.policy,
            CombinationEntry::Single(entry) => entry.policy,
        }
    }

    /// The referenced comment id, if any.
    pub fn comment(&self) -> Option<&str> {
        match self {
            CombinationEntry::Max(entry) => entry.comment.as_deref(),
            CombinationEntry::Single(entry) => entry.comment.as_deref(),
        }
    }
}

/// Group of scored conditions of which only the best satisfied one counts.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct MaxEntry {
    pub max: Vec<MaxMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// One member of a MAX group.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct MaxMember {
    pub condition: String,
    pub score: f64,
}

/// Single combination condition with its score.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct SingleEntry {
    pub condition: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Comment definition of a gene.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct CommentEntry {
    /// Identifier referenced by rules.
    pub id: String,
    /// Condition triggering the comment on its own.
    pub condition: String,
    /// Comment text.
    pub text: String,
    /// Drug class the comment is filed under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drug_class: Option<String>,
}
