use crate::sources::{aad::Aad, Source};
use crate::{Error, Result};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub fn all_sources() -> Vec<Arc<dyn Source>> {
    vec![Arc::new(Aad::new())]
}

/// Which sources an enumeration uses: an explicit include list wins over
/// `all`, which wins over the default sources. Exclusions apply last.
#[derive(Debug, Clone, Default)]
pub struct SourceSelection {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub all: bool,
}

/// Every known source, keyed by its name. Read-only once built.
pub struct Registry {
    sources: BTreeMap<&'static str, Arc<dyn Source>>,
}

impl Registry {
    pub fn new(sources: Vec<Arc<dyn Source>>) -> Result<Self> {
        let mut registered = BTreeMap::new();
        for source in sources {
            match registered.entry(source.name()) {
                Entry::Vacant(entry) => {
                    entry.insert(source);
                }
                Entry::Occupied(entry) => {
                    return Err(Error::DuplicateSource(entry.key().to_string()));
                }
            }
        }
        Ok(Self {
            sources: registered,
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(all_sources())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Source>> {
        self.sources.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.values()
    }

    pub fn select(&self, selection: &SourceSelection) -> Vec<Arc<dyn Source>> {
        let mut selected: BTreeMap<&'static str, Arc<dyn Source>> = if !selection.include.is_empty()
        {
            selection
                .include
                .iter()
                .filter_map(|name| {
                    let name = name.trim().to_lowercase();
                    let found = self.sources.get_key_value(name.as_str());
                    if found.is_none() {
                        warn!("Unknown source {:?} ignored", name);
                    }
                    found
                })
                .map(|(name, source)| (*name, Arc::clone(source)))
                .collect()
        } else {
            self.sources
                .iter()
                .filter(|(_, source)| selection.all || source.is_default())
                .map(|(name, source)| (*name, Arc::clone(source)))
                .collect()
        };

        for name in &selection.exclude {
            let name = name.trim().to_lowercase();
            if !self.contains(&name) {
                warn!("Unknown excluded source {:?} ignored", name);
            }
            selected.remove(name.as_str());
        }

        selected.into_values().collect()
    }

    pub fn display_all(&self) {
        println!("\nCurrent list of available sources. [{}]", self.len());
        println!("Sources marked with an * need key(s) or token(s) to work.\n");
        for source in self.iter() {
            let marker = if source.needs_key() { " *" } else { "" };
            let name = format!("{}{}", source.name(), marker);
            println!("- {:25}{}", name, source.description());
        }
    }
}
