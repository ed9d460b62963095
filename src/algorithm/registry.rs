//! Explicit cache of loaded algorithms, keyed by name.

use std::sync::{Arc, PoisonError, RwLock};

use crate::{catalog::Catalog, error::Error};

use super::{fingerprint, io::Header, Algorithm};

/// Thread-safe registry of algorithms sharing one catalog.
///
/// Registering the same text twice yields the same `Arc`; registering a different
/// text under an existing name fails.
#[derive(Debug)]
pub struct AlgorithmRegistry {
    /// The catalog all algorithms are validated against.
    catalog: Arc<Catalog>,
    /// Loaded algorithms by name.
    algorithms: RwLock<rustc_hash::FxHashMap<String, Arc<Algorithm>>>,
}

impl AlgorithmRegistry {
    /// Create an empty registry.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            algorithms: RwLock::new(rustc_hash::FxHashMap::default()),
        }
    }

    /// The shared catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Load and register the algorithm in `raw_text`, or return the instance
    /// registered earlier for identical text.
    ///
    /// Each document is loaded at most once; concurrent registrations of the same
    /// new text wait for the first one and share its instance.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedAlgorithm` if the document is invalid and
    /// `Error::ConflictingAlgorithm` if another text was registered under the name.
    pub fn register(&self, raw_text: &str) -> Result<Arc<Algorithm>, Error> {
        let key = Header::peek(raw_text).key();
        let fp = fingerprint(raw_text);
        {
            let algorithms = self
                .algorithms
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = same_or_conflict(&algorithms, &key, raw_text, fp)? {
                tracing::trace!("algorithm {} already registered", key);
                return Ok(existing);
            }
        }

        let mut algorithms = self
            .algorithms
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = same_or_conflict(&algorithms, &key, raw_text, fp)? {
            return Ok(existing);
        }
        // Loading happens under the write lock so that it runs once per document.
        let algorithm = Arc::new(Algorithm::load(raw_text, &self.catalog)?);
        algorithms.insert(algorithm.name().to_string(), Arc::clone(&algorithm));
        tracing::info!(
            "registered algorithm {} ({} algorithms in registry)",
            algorithm.name(),
            algorithms.len()
        );

        Ok(algorithm)
    }

    /// Algorithm registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<Arc<Algorithm>> {
        self.algorithms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Algorithm registered under `name` or `Error::UnknownAlgorithm`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownAlgorithm` if nothing is registered under the name.
    pub fn require(&self, name: &str) -> Result<Arc<Algorithm>, Error> {
        self.get(name)
            .ok_or_else(|| Error::UnknownAlgorithm(name.to_string()))
    }

    /// Most recently published algorithm of `family`; ties go to the larger name.
    pub fn latest(&self, family: &str) -> Option<Arc<Algorithm>> {
        self.algorithms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|algorithm| algorithm.info().family == family)
            .max_by(|a, b| {
                (a.info().publish_date, a.name()).cmp(&(b.info().publish_date, b.name()))
            })
            .cloned()
    }

    /// Sorted names of all registered algorithms.
    pub fn names(&self) -> Vec<String> {
        let mut result: Vec<_> = self
            .algorithms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        result.sort();
        result
    }

    /// Number of registered algorithms.
    pub fn len(&self) -> usize {
        self.algorithms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no algorithm is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The algorithm registered under `key` if it was built from `raw_text`.
fn same_or_conflict(
    algorithms: &rustc_hash::FxHashMap<String, Arc<Algorithm>>,
    key: &str,
    raw_text: &str,
    fp: u64,
) -> Result<Option<Arc<Algorithm>>, Error> {
    match algorithms.get(key) {
        Some(existing) if existing.fingerprint() == fp && existing.raw_text() == raw_text => {
            Ok(Some(Arc::clone(existing)))
        }
        Some(_) => Err(Error::ConflictingAlgorithm(key.to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::AlgorithmRegistry;
    use crate::{
        algorithm::test::{v1_text, v2_text},
        catalog::{test::catalog, Catalog},
        error::Error,
    };

    #[rstest::fixture]
    fn registry(catalog: Catalog) -> AlgorithmRegistry {
        AlgorithmRegistry::new(Arc::new(catalog))
    }

    #[rstest::rstest]
    fn register_and_get(registry: AlgorithmRegistry) -> Result<(), anyhow::Error> {
        assert!(registry.is_empty());
        let v1 = registry.register(&v1_text())?;
        let v2 = registry.register(&v2_text())?;

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["HIVDB_8.9", "HIVDB_9.4"]);
        assert!(registry.get("HIVDB_8.9").is_some_and(|a| Arc::ptr_eq(&a, &v1)));
        assert!(registry
            .latest("HIVDB")
            .is_some_and(|a| Arc::ptr_eq(&a, &v2)));
        assert!(registry.latest("ANRS").is_none());
        assert_eq!(
            registry.require("REGA_10.0").err(),
            Some(Error::UnknownAlgorithm("REGA_10.0".into()))
        );

        Ok(())
    }

    #[rstest::rstest]
    fn same_text_is_shared(registry: AlgorithmRegistry) -> Result<(), anyhow::Error> {
        let first = registry.register(&v2_text())?;
        let second = registry.register(&v2_text())?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);

        Ok(())
    }

    #[rstest::rstest]
    fn conflicting_text(registry: AlgorithmRegistry) -> Result<(), anyhow::Error> {
        registry.register(&v2_text())?;
        let altered = v2_text().replace("\"score\": 45", "\"score\": 50");
        assert_eq!(
            registry.register(&altered).err(),
            Some(Error::ConflictingAlgorithm("HIVDB_9.4".into()))
        );

        Ok(())
    }

    #[rstest::rstest]
    fn malformed_is_not_registered(registry: AlgorithmRegistry) {
        let broken = v2_text().replace("\"policy\": \"override\"", "\"policy\": \"maybe\"");
        assert!(matches!(
            registry.register(&broken),
            Err(Error::MalformedAlgorithm { .. })
        ));
        assert!(registry.is_empty());
    }

    #[tracing_test::traced_test]
    #[rstest::rstest]
    fn concurrent_registration(registry: AlgorithmRegistry) {
        let text = v2_text();
        let (registry, text) = (&registry, text.as_str());
        let span = tracing::Span::current();
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let span = span.clone();
                    s.spawn(move || span.in_scope(|| registry.register(text)))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("thread panicked"))
                .collect()
        });

        let first = results[0].as_ref().expect("registration failed");
        assert!(results
            .iter()
            .all(|r| r.as_ref().is_ok_and(|a| Arc::ptr_eq(a, first))));
        assert_eq!(registry.len(), 1);
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("loaded algorithm HIVDB_9.4"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("algorithm loaded {n} times")),
            }
        });
    }
}
