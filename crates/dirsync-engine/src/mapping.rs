//! Attribute mapping between source and target schemas.
//!
//! A mapping table lists, for each source attribute, one or more target
//! attribute names separated by `|`. Source attributes missing from the
//! table are dropped; an empty table passes entries through unchanged.

use std::path::Path;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use dirsync_connector::operation::{AttributeSet, EntryMap};

use crate::error::{SyncError, SyncResult};

/// Separator between target names in a mapping value.
pub const TARGET_SEPARATOR: char = '|';

/// Source attribute name to delimiter-separated target attribute names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMapping {
    entries: IndexMap<String, String>,
}

impl AttributeMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping using builder pattern.
    #[must_use]
    pub fn with(mut self, source: impl Into<String>, targets: impl Into<String>) -> Self {
        self.insert(source, targets);
        self
    }

    pub fn insert(&mut self, source: impl Into<String>, targets: impl Into<String>) {
        self.entries.insert(source.into(), targets.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether `source` has an entry.
    pub fn maps(&self, source: &str) -> bool {
        self.entries.contains_key(source)
    }

    /// Source attribute names, in table order.
    pub fn source_attributes(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Target names for one source attribute.
    pub fn targets(&self, source: &str) -> SyncResult<Option<Vec<String>>> {
        self.entries
            .get(source)
            .map(|raw| split_targets(source, raw))
            .transpose()
    }

    /// Every target attribute name, deduplicated, in table order.
    pub fn target_attributes(&self) -> SyncResult<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for (source, raw) in &self.entries {
            for name in split_targets(source, raw)? {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Check that every value splits into at least one target name.
    pub fn validate(&self) -> SyncResult<()> {
        self.target_attributes().map(|_| ())
    }
}

fn split_targets(source: &str, raw: &str) -> SyncResult<Vec<String>> {
    let names: Vec<String> = raw
        .split(TARGET_SEPARATOR)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() || source.trim().is_empty() {
        return Err(SyncError::configuration(format!(
            "malformed attribute mapping '{source}' -> '{raw}'"
        )));
    }
    Ok(names)
}

/// Applies an [`AttributeMapping`] to retrieved source entries.
pub struct AttributeMapper;

impl AttributeMapper {
    /// Map every entry. Values of a source attribute are copied into each of
    /// its target attributes; unmapped attributes are dropped.
    pub fn apply(entries: EntryMap, mapping: &AttributeMapping) -> SyncResult<EntryMap> {
        if mapping.is_empty() {
            return Ok(entries);
        }

        let mut mapped = EntryMap::new();
        for (name, attributes) in entries {
            mapped.insert(name, Self::map_attributes(&attributes, mapping)?);
        }
        debug!(entries = mapped.len(), "Applied attribute mapping");
        Ok(mapped)
    }

    fn map_attributes(
        attributes: &AttributeSet,
        mapping: &AttributeMapping,
    ) -> SyncResult<AttributeSet> {
        let mut result = AttributeSet::new();
        for (source, values) in attributes.iter() {
            if let Some(targets) = mapping.targets(source)? {
                for target in targets {
                    result.set(target, values.iter().cloned());
                }
            }
        }
        Ok(result)
    }
}

/// Supplies attribute mappings by descriptor path.
#[async_trait]
pub trait DescriptorLoader: Send + Sync {
    async fn load_attribute_mapping(&self, path: &Path) -> SyncResult<AttributeMapping>;
}

#[derive(Debug, Deserialize)]
struct DescriptorFile {
    #[serde(default)]
    attributes: AttributeMapping,
}

/// Reads YAML descriptors from the filesystem.
///
/// ```yaml
/// attributes:
///   cn: cn
///   description: description|displayName
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDescriptorLoader;

impl FileDescriptorLoader {
    pub fn new() -> Self {
        Self
    }

    /// Parse descriptor text. `origin` names the source in errors.
    pub fn parse(origin: &str, content: &str) -> SyncResult<AttributeMapping> {
        let file: DescriptorFile = serde_yaml::from_str(content)
            .map_err(|e| SyncError::descriptor(origin, e.to_string()))?;
        file.attributes.validate()?;
        Ok(file.attributes)
    }
}

#[async_trait]
impl DescriptorLoader for FileDescriptorLoader {
    async fn load_attribute_mapping(&self, path: &Path) -> SyncResult<AttributeMapping> {
        let origin = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SyncError::descriptor(origin.as_str(), e.to_string()))?;
        let mapping = Self::parse(&origin, &content)?;
        debug!(path = %origin, attributes = mapping.len(), "Loaded attribute mapping");
        Ok(mapping)
    }
}
