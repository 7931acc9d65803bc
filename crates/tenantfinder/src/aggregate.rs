use crate::sources::{ResultKind, SourceResult};
use futures::{Stream, StreamExt};
use lazy_regex::regex_replace_all;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, trace, warn};

const TRIM_CUTSET: &[char] = &['\n', '\t', '"', '\'', '`', ' '];

// region:        --- Models

/// First sighting of a unique host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostEntry {
    pub domain: String,
    pub host: String,
    pub source: String,
}

// endregion:     --- Models

// region:        --- Normalization

/// Canonical form of a discovered value: comments and quoting removed,
/// lowercased, without scheme, wildcard markers or slashes.
///
/// Steps are repeated until nothing changes, so the result is a fixed point.
pub fn normalize(value: &str) -> String {
    let mut current = value.to_string();
    loop {
        let next = normalize_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn normalize_once(value: &str) -> String {
    let value = value.split('#').next().unwrap_or_default();
    let value = value.trim_matches(TRIM_CUTSET).to_lowercase();
    let value = regex_replace_all!(r"https?://|\*\.|•\.?|/", &value, "");
    value.trim_matches(TRIM_CUTSET).to_string()
}

// endregion:     --- Normalization

// region:        --- Aggregator

/// Single consumer of the merged stream for one input domain.
#[derive(Debug, Default)]
pub struct Aggregator {
    domain: String,
    unique: BTreeMap<String, HostEntry>,
    sources: BTreeMap<String, BTreeSet<String>>,
    skipped: HashMap<String, usize>,
    errors: HashMap<String, usize>,
}

impl Aggregator {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    pub async fn consume<S>(&mut self, mut results: S)
    where
        S: Stream<Item = SourceResult> + Unpin,
    {
        while let Some(result) = results.next().await {
            self.ingest(result);
        }
    }

    pub fn ingest(&mut self, result: SourceResult) {
        let SourceResult { source, kind } = result;
        match kind {
            ResultKind::Error(message) => {
                warn!("Encountered an error with source {}: {}", source, message);
                *self.errors.entry(source).or_default() += 1;
            }
            ResultKind::Domain(value) => {
                let host = normalize(&value);
                if host.is_empty() {
                    // still counted by the source, so it must not reach the corrected results
                    trace!("Dropping empty value {:?} from {}", value, source);
                    *self.skipped.entry(source).or_default() += 1;
                    return;
                }

                let seen_by = self.sources.entry(host.clone()).or_default();
                if !seen_by.contains(&source) {
                    debug!(source = %source, "{}", host);
                    seen_by.insert(source.clone());
                }

                if self.unique.contains_key(&host) {
                    *self.skipped.entry(source).or_default() += 1;
                    return;
                }

                let entry = HostEntry {
                    domain: self.domain.clone(),
                    host: host.clone(),
                    source,
                };
                self.unique.insert(host, entry);
            }
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn unique(&self) -> &BTreeMap<String, HostEntry> {
        &self.unique
    }

    /// Host to every source that reported it.
    pub fn attribution(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.sources
    }

    pub fn skipped(&self) -> &HashMap<String, usize> {
        &self.skipped
    }

    pub fn errors(&self) -> &HashMap<String, usize> {
        &self.errors
    }
}

// endregion:     --- Aggregator
