//! Virus catalog with genes, drug classes, and drugs.
//!
//! The catalog is data, loaded from a versioned JSON document at startup, so
//! that new drugs or classes do not require code changes.

use std::path::Path;

use crate::error::Error;

/// A gene that is aligned and scored independently.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Gene {
    /// Gene name, e.g., `RT`.
    pub name: String,
    /// Number of amino acid positions.
    pub length: u32,
    /// Optional consensus amino acid sequence, used to check reference letters in rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<String>,
}

impl Gene {
    /// Consensus amino acid at the 1-based `position`, if the consensus is known.
    pub fn consensus_at(&self, position: u32) -> Option<char> {
        let idx = usize::try_from(position).ok()?.checked_sub(1)?;
        self.consensus.as_ref().and_then(|seq| seq.chars().nth(idx))
    }

    /// Whether the 1-based `position` lies within the gene.
    pub fn contains_position(&self, position: u32) -> bool {
        (1..=self.length).contains(&position)
    }
}

/// A group of drugs sharing a mechanism and a gene target.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct DrugClass {
    /// Short name, e.g., `NRTI`.
    pub name: String,
    /// Descriptive name.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Name of the targeted gene.
    pub gene: String,
}

/// A single drug.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Drug {
    /// Abbreviation, e.g., `ABC`.
    pub name: String,
    /// Full name, e.g., `abacavir`.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Name of the drug class.
    pub drug_class: String,
}

/// On-disk representation of the catalog.
#[derive(Debug, serde::Deserialize)]
struct Document {
    virus: String,
    version: String,
    genes: Vec<Gene>,
    drug_classes: Vec<DrugClass>,
    drugs: Vec<Drug>,
}

/// Facade struct for querying the catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Name of the virus, e.g., `HIV1`.
    virus: String,
    /// Version of the catalog document.
    version: String,
    /// Genes in declaration order.
    genes: Vec<Gene>,
    /// Drug classes in declaration order.
    drug_classes: Vec<DrugClass>,
    /// Drugs in declaration order.
    drugs: Vec<Drug>,
    /// Mapping from gene name to index in `genes`.
    gene_idx: rustc_hash::FxHashMap<String, usize>,
    /// Mapping from drug class name to index in `drug_classes`.
    drug_class_idx: rustc_hash::FxHashMap<String, usize>,
    /// Mapping from drug name to index in `drugs`.
    drug_idx: rustc_hash::FxHashMap<String, usize>,
}

impl Catalog {
    /// Load the catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// If anything goes wrong, it returns a generic `anyhow::Error`.
    pub fn load<P>(path: P) -> Result<Self, anyhow::Error>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!(
                "problem reading catalog {}: {}",
                path.as_ref().display(),
                e
            )
        })?;
        Ok(Self::from_json(&text)?)
    }

    /// Construct from the JSON text of a catalog document.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedCatalog` if the document cannot be parsed, names are
    /// duplicated, or references between genes, classes, and drugs do not resolve.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let doc: Document =
            serde_json::from_str(text).map_err(|e| Error::MalformedCatalog(e.to_string()))?;
        Self::new(doc.virus, doc.version, doc.genes, doc.drug_classes, doc.drugs)
    }

    /// Construct from already parsed records.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedCatalog` on duplicate names or dangling references.
    pub fn new(
        virus: String,
        version: String,
        genes: Vec<Gene>,
        drug_classes: Vec<DrugClass>,
        drugs: Vec<Drug>,
    ) -> Result<Self, Error> {
        for gene in &genes {
            if gene.length == 0 {
                return Err(Error::MalformedCatalog(format!(
                    "gene {} has length zero",
                    gene.name
                )));
            }
            if let Some(consensus) = &gene.consensus {
                if consensus.chars().count() != gene.length as usize {
                    return Err(Error::MalformedCatalog(format!(
                        "consensus of gene {} does not have length {}",
                        gene.name, gene.length
                    )));
                }
            }
        }
        let gene_idx = index_by_name(genes.iter().map(|g| g.name.as_str()), "gene")?;
        let drug_class_idx =
            index_by_name(drug_classes.iter().map(|c| c.name.as_str()), "drug class")?;
        let drug_idx = index_by_name(drugs.iter().map(|d| d.name.as_str()), "drug")?;

        if let Some(class) = drug_classes
            .iter()
            .find(|class| !gene_idx.contains_key(&class.gene))
        {
            return Err(Error::MalformedCatalog(format!(
                "drug class {} targets unknown gene {}",
                class.name, class.gene
            )));
        }
        if let Some(drug) = drugs
            .iter()
            .find(|drug| !drug_class_idx.contains_key(&drug.drug_class))
        {
            return Err(Error::MalformedCatalog(format!(
                "drug {} has unknown drug class {}",
                drug.name, drug.drug_class
            )));
        }

        tracing::debug!(
            "catalog {} v{}: {} genes, {} drug classes, {} drugs",
            virus,
            version,
            genes.len(),
            drug_classes.len(),
            drugs.len()
        );

        Ok(Self {
            virus,
            version,
            genes,
            drug_classes,
            drugs,
            gene_idx,
            drug_class_idx,
            drug_idx,
        })
    }

    /// Name of the virus.
    pub fn virus(&self) -> &str {
        &self.virus
    }

    /// Version of the catalog document.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// All genes in declaration order.
    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    /// Obtain the gene with the given name.
    pub fn gene(&self, name: &str) -> Option<&Gene> {
        self.gene_idx.get(name).map(|idx| &self.genes[*idx])
    }

    /// Obtain the gene with the given name or fail with `Error::UnknownGene`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownGene` if there is no such gene.
    pub fn require_gene(&self, name: &str) -> Result<&Gene, Error> {
        self.gene(name).ok_or_else(|| Error::UnknownGene {
            gene: name.to_string(),
            context: format!("catalog {}", self.virus),
        })
    }

    /// Obtain the drug class with the given name.
    pub fn drug_class(&self, name: &str) -> Option<&DrugClass> {
        self.drug_class_idx
            .get(name)
            .map(|idx| &self.drug_classes[*idx])
    }

    /// Obtain the drug with the given name.
    pub fn drug(&self, name: &str) -> Option<&Drug> {
        self.drug_idx.get(name).map(|idx| &self.drugs[*idx])
    }

    /// Drug classes targeting `gene`, in declaration order.
    pub fn drug_classes_of<'a>(&'a self, gene: &'a str) -> impl Iterator<Item = &'a DrugClass> {
        self.drug_classes
            .iter()
            .filter(move |class| class.gene == gene)
    }

    /// Drugs whose class targets `gene`, in declaration order.
    pub fn drugs_of<'a>(&'a self, gene: &'a str) -> impl Iterator<Item = &'a Drug> {
        self.drugs.iter().filter(move |drug| {
            self.drug_class(&drug.drug_class)
                .is_some_and(|class| class.gene == gene)
        })
    }

    /// Whether `drug` belongs to one of the drug classes of `gene`.
    pub fn drug_targets_gene(&self, drug: &str, gene: &str) -> bool {
        self.drug(drug)
            .and_then(|drug| self.drug_class(&drug.drug_class))
            .is_some_and(|class| class.gene == gene)
    }
}

/// Build a name-to-index map, rejecting duplicates.
fn index_by_name<'a, I>(names: I, what: &str) -> Result<rustc_hash::FxHashMap<String, usize>, Error>
where
    I: Iterator<Item = &'a str>,
{
    let mut result = rustc_hash::FxHashMap::default();
    for (idx, name) in names.enumerate() {
        if result.insert(name.to_string(), idx).is_some() {
            return Err(Error::MalformedCatalog(format!("duplicate {what} {name}")));
        }
    }
    Ok(result)
}

#[cfg(test)]
pub mod test {
    use super::Catalog;

    /// Fixture with the HIV-1 catalog from the test data.
    #[rstest::fixture]
    pub fn catalog() -> Catalog {
        Catalog::load("tests/data/catalog.json").expect("could not load test catalog")
    }

    #[rstest::rstest]
    fn load_catalog(catalog: Catalog) {
        assert_eq!(catalog.virus(), "HIV1");
        assert_eq!(catalog.genes().len(), 3);
        assert_eq!(catalog.require_gene("RT").map(|g| g.length).ok(), Some(560));
        assert!(catalog.gene("GAG").is_none());
    }

    #[rstest::rstest]
    fn drugs_of_gene(catalog: Catalog) {
        let pr: Vec<_> = catalog.drugs_of("PR").map(|d| d.name.as_str()).collect();
        assert_eq!(pr, vec!["ATV", "DRV", "LPV"]);
        let rt_classes: Vec<_> = catalog
            .drug_classes_of("RT")
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(rt_classes, vec!["NRTI", "NNRTI"]);

        assert!(catalog.drug_targets_gene("ABC", "RT"));
        assert!(!catalog.drug_targets_gene("ABC", "PR"));
        assert!(!catalog.drug_targets_gene("XYZ", "RT"));
    }

    #[rstest::rstest]
    fn consensus_lookup(catalog: Catalog) -> Result<(), anyhow::Error> {
        let pr = catalog.require_gene("PR")?;
        assert_eq!(pr.consensus_at(1), Some('P'));
        assert_eq!(pr.consensus_at(99), Some('F'));
        assert_eq!(pr.consensus_at(0), None);
        assert_eq!(pr.consensus_at(100), None);
        assert!(pr.contains_position(99));
        assert!(!pr.contains_position(100));

        Ok(())
    }

    #[rstest::rstest]
    #[case::dangling_class(
        r#"{"virus":"HIV1","version":"1","genes":[{"name":"PR","length":99}],
            "drug_classes":[{"name":"PI","gene":"RT"}],"drugs":[]}"#,
        "drug class PI targets unknown gene RT"
    )]
    #[case::dangling_drug(
        r#"{"virus":"HIV1","version":"1","genes":[{"name":"PR","length":99}],
            "drug_classes":[{"name":"PI","gene":"PR"}],
            "drugs":[{"name":"DRV","drug_class":"NRTI"}]}"#,
        "drug DRV has unknown drug class NRTI"
    )]
    #[case::duplicate_gene(
        r#"{"virus":"HIV1","version":"1",
            "genes":[{"name":"PR","length":99},{"name":"PR","length":99}],
            "drug_classes":[],"drugs":[]}"#,
        "duplicate gene PR"
    )]
    #[case::bad_consensus(
        r#"{"virus":"HIV1","version":"1",
            "genes":[{"name":"PR","length":3,"consensus":"PQ"}],
            "drug_classes":[],"drugs":[]}"#,
        "consensus of gene PR does not have length 3"
    )]
    fn malformed_catalog(#[case] text: &str, #[case] message: &str) {
        let err = Catalog::from_json(text).expect_err("catalog must be rejected");
        assert_eq!(err, crate::error::Error::MalformedCatalog(message.to_string()));
    }
}
