//! Mutations and immutable per-gene mutation sets.
//!
//! Observed amino acids are stored as single characters.  Besides the 20 standard
//! one-letter codes, the following fixed symbols are used.

pub mod parse;

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools as _;

use crate::{catalog, error::Error};

/// Symbol for an insertion.
pub const INSERTION: char = '_';
/// Symbol for a deletion.
pub const DELETION: char = '-';
/// Symbol for a stop codon.
pub const STOP: char = '*';
/// Symbol for a highly ambiguous call.
pub const AMBIGUOUS: char = 'X';
/// The standard amino acid one-letter codes.
pub const AMINO_ACIDS: &str = "ACDEFGHIKLMNPQRSTVWY";

/// Whether `c` is a valid residue symbol.
pub fn is_residue(c: char) -> bool {
    AMINO_ACIDS.contains(c) || c == INSERTION || c == DELETION || c == STOP || c == AMBIGUOUS
}

/// Render a residue set, spelling out lone insertions and deletions.
pub fn format_residues(residues: &BTreeSet<char>) -> String {
    if residues.len() == 1 {
        match residues.first() {
            Some(&INSERTION) => return "ins".to_string(),
            Some(&DELETION) => return "del".to_string(),
            _ => (),
        }
    }
    residues.iter().collect()
}

/// An observed amino acid call at one gene position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub struct Mutation {
    /// Name of the gene.
    gene: String,
    /// 1-based amino acid position.
    position: u32,
    /// Reference amino acid, if known.
    reference: Option<char>,
    /// Observed residues; never empty.
    aas: BTreeSet<char>,
}

impl Mutation {
    /// Create a new mutation.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMutation` if `position` is zero, `aas` is empty, or
    /// contains a symbol that is not a residue.
    pub fn new<G, I>(gene: G, position: u32, aas: I) -> Result<Self, Error>
    where
        G: Into<String>,
        I: IntoIterator<Item = char>,
    {
        let gene = gene.into();
        let aas: BTreeSet<char> = aas.into_iter().collect();
        let label = || format!("{}:{}{}", gene, position, aas.iter().collect::<String>());
        if position == 0 {
            return Err(Error::invalid_mutation(label(), "positions are 1-based"));
        }
        if aas.is_empty() {
            return Err(Error::invalid_mutation(label(), "no amino acids given"));
        }
        if let Some(c) = aas.iter().find(|c| !is_residue(**c)) {
            return Err(Error::invalid_mutation(
                label(),
                format!("invalid residue symbol {c:?}"),
            ));
        }
        Ok(Self {
            gene,
            position,
            reference: None,
            aas,
        })
    }

    /// Return a copy with the reference amino acid set.
    pub fn with_reference(self, reference: char) -> Self {
        Self {
            reference: Some(reference),
            ..self
        }
    }

    /// Parse a mutation such as `M184VI` or `RT:69ins`.
    ///
    /// # Arguments
    ///
    /// * `gene` - Gene to use when the text has no `GENE:` prefix.
    /// * `text` - The mutation text.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMutation` on syntax errors, when the prefix disagrees
    /// with `gene`, or when the parts do not form a valid mutation.
    pub fn parse(gene: &str, text: &str) -> Result<Self, Error> {
        let raw = parse::parse_raw_mutation(text.trim())
            .ok_or_else(|| Error::invalid_mutation(text, "could not parse mutation"))?;
        if let Some(prefix) = raw.gene {
            if prefix != gene {
                return Err(Error::invalid_mutation(
                    text,
                    format!("gene prefix {prefix} does not match gene {gene}"),
                ));
            }
        }
        let result = Self::new(gene, raw.position, raw.residues)?;
        Ok(match raw.reference {
            Some(reference) => result.with_reference(reference),
            None => result,
        })
    }

    /// Name of the gene.
    pub fn gene(&self) -> &str {
        &self.gene
    }

    /// 1-based position.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Reference amino acid, if known.
    pub fn reference(&self) -> Option<char> {
        self.reference
    }

    /// Observed residues.
    pub fn aas(&self) -> &BTreeSet<char> {
        &self.aas
    }

    /// Whether more than one residue was observed.
    pub fn is_mixture(&self) -> bool {
        self.aas.len() > 1
    }

    /// Whether an insertion was observed.
    pub fn is_insertion(&self) -> bool {
        self.aas.contains(&INSERTION)
    }

    /// Whether a deletion was observed.
    pub fn is_deletion(&self) -> bool {
        self.aas.contains(&DELETION)
    }

    /// Whether a stop codon was observed.
    pub fn has_stop(&self) -> bool {
        self.aas.contains(&STOP)
    }

    /// Whether the call is highly ambiguous.
    pub fn is_ambiguous(&self) -> bool {
        self.aas.contains(&AMBIGUOUS)
    }

    /// Whether any observed residue is in `residues`.
    pub fn intersects(&self, residues: &BTreeSet<char>) -> bool {
        !self.aas.is_disjoint(residues)
    }

    /// Combine two calls at the same position into one mixture.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMutation` if gene or position differ.
    pub fn merge(&self, other: &Mutation) -> Result<Mutation, Error> {
        if self.gene != other.gene || self.position != other.position {
            return Err(Error::invalid_mutation(
                other.to_string(),
                format!("cannot merge into {self}"),
            ));
        }
        Ok(Mutation {
            gene: self.gene.clone(),
            position: self.position,
            reference: self.reference.or(other.reference),
            aas: self.aas.union(&other.aas).copied().collect(),
        })
    }
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(reference) = self.reference {
            write!(f, "{reference}")?;
        }
        write!(f, "{}{}", self.position, format_residues(&self.aas))
    }
}

/// Ordered collection with at most one mutation per position of one gene.
///
/// Sets are never changed in place; the editing operations return new sets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MutationSet {
    /// Name of the gene.
    gene: String,
    /// Mutations by position.
    mutations: BTreeMap<u32, Mutation>,
}

impl MutationSet {
    /// Create an empty set for `gene`.
    pub fn empty<G: Into<String>>(gene: G) -> Self {
        Self {
            gene: gene.into(),
            mutations: BTreeMap::new(),
        }
    }

    /// Build from mutations, merging repeated positions into mixtures.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMutation` if a mutation belongs to another gene.
    pub fn from_mutations<G, I>(gene: G, mutations: I) -> Result<Self, Error>
    where
        G: Into<String>,
        I: IntoIterator<Item = Mutation>,
    {
        let mut result = Self::empty(gene);
        for mutation in mutations {
            result.insert(mutation)?;
        }
        Ok(result)
    }

    /// Parse a list of mutations separated by commas and/or whitespace.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMutation` on the first token that cannot be parsed.
    pub fn parse(gene: &str, text: &str) -> Result<Self, Error> {
        let mutations = text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(|token| Mutation::parse(gene, token))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_mutations(gene, mutations)
    }

    fn insert(&mut self, mutation: Mutation) -> Result<(), Error> {
        if mutation.gene != self.gene {
            return Err(Error::invalid_mutation(
                format!("{}:{}", mutation.gene, mutation),
                format!("does not belong to gene {}", self.gene),
            ));
        }
        let merged = match self.mutations.get(&mutation.position) {
            Some(existing) => existing.merge(&mutation)?,
            None => mutation,
        };
        self.mutations.insert(merged.position, merged);
        Ok(())
    }

    /// Check that all positions lie within `gene`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownGene` on a gene name mismatch and `Error::InvalidMutation`
    /// for the first position outside of the gene.
    pub fn validate(&self, gene: &catalog::Gene) -> Result<(), Error> {
        if gene.name != self.gene {
            return Err(Error::UnknownGene {
                gene: self.gene.clone(),
                context: format!("mutation set checked against gene {}", gene.name),
            });
        }
        match self
            .mutations
            .values()
            .find(|m| !gene.contains_position(m.position))
        {
            Some(m) => Err(Error::invalid_mutation(
                format!("{}:{}", self.gene, m),
                format!("position outside of 1..={}", gene.length),
            )),
            None => Ok(()),
        }
    }

    /// Name of the gene.
    pub fn gene(&self) -> &str {
        &self.gene
    }

    /// Number of mutated positions.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Whether there are no mutations.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Iterate mutations in position order.
    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.values()
    }

    /// Mutation at the given position, if any.
    pub fn get(&self, position: u32) -> Option<&Mutation> {
        self.mutations.get(&position)
    }

    /// Mutated positions in ascending order.
    pub fn positions(&self) -> impl Iterator<Item = u32> + '_ {
        self.mutations.keys().copied()
    }

    /// New set with `mutation` added (merged into a mixture if the position exists).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMutation` if the mutation belongs to another gene.
    pub fn with_mutation(&self, mutation: Mutation) -> Result<Self, Error> {
        let mut result = self.clone();
        result.insert(mutation)?;
        Ok(result)
    }

    /// New set without the mutation at `position`.
    pub fn without_position(&self, position: u32) -> Self {
        let mut result = self.clone();
        result.mutations.remove(&position);
        result
    }

    /// New set with the mutations of both sets.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMutation` if `other` is for another gene.
    pub fn merge(&self, other: &MutationSet) -> Result<Self, Error> {
        let mut result = self.clone();
        for mutation in other.iter() {
            result.insert(mutation.clone())?;
        }
        Ok(result)
    }

    /// New set with only the mutations for which `predicate` holds.
    pub fn filter<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&Mutation) -> bool,
    {
        Self {
            gene: self.gene.clone(),
            mutations: self
                .mutations
                .iter()
                .filter(|(_, m)| predicate(m))
                .map(|(pos, m)| (*pos, m.clone()))
                .collect(),
        }
    }
}

impl std::fmt::Display for MutationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mutations.values().join(", "))
    }
}

#[cfg(test)]
mod test {
    use super::{Mutation, MutationSet};
    use crate::error::Error;

    #[test]
    fn parse_mutation() -> Result<(), anyhow::Error> {
        let m = Mutation::parse("RT", "M184VI")?;
        assert_eq!(m.gene(), "RT");
        assert_eq!(m.position(), 184);
        assert_eq!(m.reference(), Some('M'));
        assert!(m.is_mixture());
        assert_eq!(m.to_string(), "M184IV");

        let ins = Mutation::parse("RT", "RT:69ins")?;
        assert!(ins.is_insertion());
        assert_eq!(ins.to_string(), "69ins");

        let del = Mutation::parse("RT", "67d")?;
        assert!(del.is_deletion());
        assert!(!del.is_mixture());

        Ok(())
    }

    #[rstest::rstest]
    #[case("PR:M184V")]
    #[case("M0V")]
    #[case("M184")]
    #[case("garbage")]
    fn parse_mutation_fails(#[case] text: &str) {
        assert!(matches!(
            Mutation::parse("RT", text),
            Err(Error::InvalidMutation { .. })
        ));
    }

    #[test]
    fn set_merges_positions() -> Result<(), anyhow::Error> {
        let set = MutationSet::parse("RT", "M184V, 184I K65R 41L")?;
        assert_eq!(set.len(), 3);
        assert_eq!(set.positions().collect::<Vec<_>>(), vec![41, 65, 184]);
        assert_eq!(set.to_string(), "41L, K65R, M184IV");

        Ok(())
    }

    #[test]
    fn set_editing_returns_new_sets() -> Result<(), anyhow::Error> {
        let set = MutationSet::parse("RT", "K65R M184V")?;
        let added = set.with_mutation(Mutation::parse("RT", "T215Y")?)?;
        let removed = added.without_position(65);
        let only_184 = added.filter(|m| m.position() == 184);

        assert_eq!(set.len(), 2);
        assert_eq!(added.len(), 3);
        assert_eq!(removed.to_string(), "M184V, T215Y");
        assert_eq!(only_184.to_string(), "M184V");

        let merged = set.merge(&MutationSet::parse("RT", "184I 74V")?)?;
        assert_eq!(merged.to_string(), "74V, K65R, M184IV");

        assert!(set.with_mutation(Mutation::parse("PR", "D30N")?).is_err());

        Ok(())
    }

    #[test]
    fn empty_set() {
        let set = MutationSet::empty("IN");
        assert!(set.is_empty());
        assert_eq!(set.to_string(), "");
    }
}
