//! Display-name lookup for source identifiers.

use std::collections::HashMap;

use notiwatch_core::config::NotiwatchConfig;

/// Maps a source identifier to a human-readable name.
///
/// `None` means "unknown"; the pipeline then falls back to the identifier.
pub trait DisplayNameResolver: Send + Sync {
    fn resolve(&self, source_id: &str) -> Option<String>;
}

/// Resolver backed by a fixed table, usually the `[display_names]` config
/// section.
#[derive(Debug, Clone, Default)]
pub struct StaticNameResolver {
    names: HashMap<String, String>,
}

impl StaticNameResolver {
    pub fn new(names: HashMap<String, String>) -> Self {
        Self { names }
    }

    pub fn from_config(config: &NotiwatchConfig) -> Self {
        Self::new(
            config
                .display_names
                .iter()
                .map(|(id, name)| (id.clone(), name.clone()))
                .collect(),
        )
    }

    pub fn insert(&mut self, source_id: impl Into<String>, name: impl Into<String>) {
        self.names.insert(source_id.into(), name.into());
    }
}

impl DisplayNameResolver for StaticNameResolver {
    fn resolve(&self, source_id: &str) -> Option<String> {
        self.names
            .get(source_id)
            .filter(|name| !name.trim().is_empty())
            .cloned()
    }
}
