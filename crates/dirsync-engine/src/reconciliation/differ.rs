//! Tree comparison.
//!
//! Partitions two entry maps into ADD, MODIFY and DELETE groups.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::operation::{AttributeSet, EntryMap};

use crate::error::SyncResult;

/// What has to happen to an entry on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryTag {
    /// Present in source, absent in target.
    Add,
    /// Present in both, attributes differ.
    Modify,
    /// Present in target, absent in source.
    Delete,
}

impl EntryTag {
    /// Every tag, in apply order.
    pub const ALL: [EntryTag; 3] = [EntryTag::Add, EntryTag::Modify, EntryTag::Delete];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryTag::Add => "ADD",
            EntryTag::Modify => "MODIFY",
            EntryTag::Delete => "DELETE",
        }
    }
}

impl fmt::Display for EntryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry removed from a comparison by a post-filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedEntry {
    pub tag: EntryTag,
    pub rdn: DistinguishedName,
}

/// Entries to create, update and remove, keyed by relative name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    #[serde(default, skip_serializing_if = "EntryMap::is_empty")]
    add: EntryMap,
    #[serde(default, skip_serializing_if = "EntryMap::is_empty")]
    modify: EntryMap,
    #[serde(default, skip_serializing_if = "EntryMap::is_empty")]
    delete: EntryMap,
}

impl ComparisonResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries carrying `tag`.
    pub fn group(&self, tag: EntryTag) -> &EntryMap {
        match tag {
            EntryTag::Add => &self.add,
            EntryTag::Modify => &self.modify,
            EntryTag::Delete => &self.delete,
        }
    }

    fn group_mut(&mut self, tag: EntryTag) -> &mut EntryMap {
        match tag {
            EntryTag::Add => &mut self.add,
            EntryTag::Modify => &mut self.modify,
            EntryTag::Delete => &mut self.delete,
        }
    }

    /// Record an entry under `tag`, removing it from the other groups.
    pub fn insert(&mut self, tag: EntryTag, rdn: DistinguishedName, attributes: AttributeSet) {
        for other in EntryTag::ALL {
            if other != tag {
                self.group_mut(other).remove(&rdn);
            }
        }
        self.group_mut(tag).insert(rdn, attributes);
    }

    /// Tag of an entry, if it has one.
    pub fn tag_of(&self, rdn: &DistinguishedName) -> Option<EntryTag> {
        EntryTag::ALL
            .into_iter()
            .find(|tag| self.group(*tag).contains_key(rdn))
    }

    /// Non-empty groups, in apply order.
    pub fn groups(&self) -> impl Iterator<Item = (EntryTag, &EntryMap)> {
        EntryTag::ALL
            .into_iter()
            .map(|tag| (tag, self.group(tag)))
            .filter(|(_, entries)| !entries.is_empty())
    }

    pub fn len(&self) -> usize {
        self.add.len() + self.modify.len() + self.delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep only the `keep` groups. Returns the filtered result and every
    /// entry that was dropped.
    #[must_use]
    pub fn retain_tags(mut self, keep: &[EntryTag]) -> (ComparisonResult, Vec<DroppedEntry>) {
        let mut dropped = Vec::new();
        for tag in EntryTag::ALL {
            if keep.contains(&tag) {
                continue;
            }
            let removed = std::mem::take(self.group_mut(tag));
            dropped.extend(removed.into_keys().map(|rdn| DroppedEntry { tag, rdn }));
        }
        (self, dropped)
    }
}

/// Default modification check.
///
/// Zero-valued attributes are ignored. The sets differ when the remaining
/// attribute counts differ or any attribute's values differ as a multiset.
pub fn default_is_modified(source: &AttributeSet, target: &AttributeSet) -> bool {
    let source = source.without_empty();
    let target = target.without_empty();
    if source.len() != target.len() {
        return true;
    }
    let modified = source.iter().any(|(name, values)| match target.get(name) {
        Some(other) => !same_values(values, other),
        None => true,
    });
    modified
}

/// Multiset equality of two value lists.
pub fn same_values(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut counts: HashMap<&str, isize> = HashMap::new();
    for value in a {
        *counts.entry(value.as_str()).or_default() += 1;
    }
    for value in b {
        *counts.entry(value.as_str()).or_default() -= 1;
    }
    counts.values().all(|count| *count == 0)
}

/// Computes the ADD/MODIFY/DELETE partition of two entry maps.
pub struct TreeDiffer;

impl TreeDiffer {
    /// Compare `source` against `target`.
    ///
    /// `transform` produces the desired attributes of every source entry,
    /// given the current target attributes if the entry exists there.
    /// `is_modified` decides whether an existing entry needs an update.
    ///
    /// Modified entries list attributes present only on the target with no
    /// values, so applying the result clears them.
    pub fn compare<T, M>(
        source: &EntryMap,
        target: &EntryMap,
        mut transform: T,
        mut is_modified: M,
    ) -> SyncResult<ComparisonResult>
    where
        T: FnMut(&DistinguishedName, &AttributeSet, Option<&AttributeSet>) -> SyncResult<AttributeSet>,
        M: FnMut(&AttributeSet, &AttributeSet) -> bool,
    {
        let mut result = ComparisonResult::new();
        let mut delete_candidates = target.clone();

        for (rdn, source_attrs) in source {
            let target_attrs = target.get(rdn);
            let effective = transform(rdn, source_attrs, target_attrs)?;

            match target_attrs {
                None => result.insert(EntryTag::Add, rdn.clone(), effective),
                Some(existing) => {
                    if is_modified(&effective, existing) {
                        result.insert(EntryTag::Modify, rdn.clone(), with_cleared(effective, existing));
                    }
                }
            }
            delete_candidates.remove(rdn);
        }

        for (rdn, attrs) in delete_candidates {
            result.insert(EntryTag::Delete, rdn, attrs);
        }

        Ok(result)
    }
}

fn with_cleared(mut desired: AttributeSet, existing: &AttributeSet) -> AttributeSet {
    for (name, values) in existing.iter() {
        if !values.is_empty() && !desired.has(name) {
            desired.set(name.clone(), Vec::<String>::new());
        }
    }
    desired
}
