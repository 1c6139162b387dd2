use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::tasks::{
    DOWNLOAD_NPM, DOWNLOAD_PYPI, DOWNLOAD_RUST, EXTRACT_REPORT_DATA, FETCH_NPM, FETCH_PYPI,
    FETCH_RUST, GENERATE_REPORT, GENERATE_SBOM, RUN_ANALYSES, SCAN_VULNERABILITIES,
};

/// Ordered task names for each audit source.
///
/// This is the only place that decides which tasks run for a source and in
/// what order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTable {
    chains: BTreeMap<String, Vec<String>>,
}

impl ChainTable {
    pub fn builder() -> ChainTableBuilder {
        ChainTableBuilder {
            chains: BTreeMap::new(),
        }
    }

    pub fn resolve(&self, source_id: &str) -> Result<&[String], ConfigError> {
        self.chains
            .get(source_id)
            .map(Vec::as_slice)
            .ok_or_else(|| ConfigError::UnknownSource {
                source_id: source_id.to_string(),
                available: self.chains.keys().cloned().collect(),
            })
    }

    /// Known source identifiers, sorted.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }
}

impl Default for ChainTable {
    fn default() -> Self {
        let tail = [
            GENERATE_SBOM,
            SCAN_VULNERABILITIES,
            RUN_ANALYSES,
            EXTRACT_REPORT_DATA,
            GENERATE_REPORT,
        ];
        let chain = |fetch: &'static str, download: &'static str| {
            [fetch, download].into_iter().chain(tail).collect::<Vec<_>>()
        };

        Self::builder()
            .chain("pypi", chain(FETCH_PYPI, DOWNLOAD_PYPI))
            .chain("npm", chain(FETCH_NPM, DOWNLOAD_NPM))
            .chain("rust", chain(FETCH_RUST, DOWNLOAD_RUST))
            .build()
    }
}

pub struct ChainTableBuilder {
    chains: BTreeMap<String, Vec<String>>,
}

impl ChainTableBuilder {
    /// Set the chain for `source_id`, replacing any earlier one.
    pub fn chain<I, S>(mut self, source_id: impl Into<String>, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chains
            .insert(source_id.into(), tasks.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> ChainTable {
        ChainTable {
            chains: self.chains,
        }
    }
}
