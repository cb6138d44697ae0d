//! Entry store operation types
//!
//! Attribute sets, entries, deltas, filters and paging used by the
//! [`EntryStore`](crate::traits::EntryStore) contract.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dn::DistinguishedName;

/// Name of the object class attribute.
pub const OBJECT_CLASS: &str = "objectClass";

/// An ordered mapping from attribute name to an ordered list of string values.
///
/// Attribute names are case-sensitive identifiers. An attribute with zero
/// values is treated as absent when comparing and is never sent to `create`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet {
    attributes: IndexMap<String, Vec<String>>,
}

impl AttributeSet {
    /// Create a new empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute, replacing any previous values.
    pub fn set<I, V>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
    }

    /// Set an attribute using builder pattern.
    pub fn with<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.set(name, values);
        self
    }

    /// Append one value, creating the attribute if needed.
    pub fn push_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// Get the values of an attribute.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// Values of an attribute, empty if absent.
    pub fn values(&self, name: &str) -> &[String] {
        self.get(name).unwrap_or(&[])
    }

    /// Get the first value of an attribute.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Check if an attribute exists (possibly with zero values).
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.attributes.shift_remove(name)
    }

    /// Get all attribute names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Get the number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.attributes.iter()
    }

    /// Keep only the attributes matching the predicate.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &[String]) -> bool) {
        self.attributes.retain(|name, values| keep(name, values));
    }

    /// Copy of the set without zero-valued attributes.
    pub fn without_empty(&self) -> Self {
        self.iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect()
    }

    /// Convert to the underlying map.
    pub fn into_map(self) -> IndexMap<String, Vec<String>> {
        self.attributes
    }
}

impl FromIterator<(String, Vec<String>)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for AttributeSet {
    type Item = (String, Vec<String>);
    type IntoIter = indexmap::map::IntoIter<String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.into_iter()
    }
}

/// A directory entry: its name and its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: DistinguishedName,
    pub attributes: AttributeSet,
}

impl Entry {
    pub fn new(name: DistinguishedName, attributes: AttributeSet) -> Self {
        Self { name, attributes }
    }
}

/// Entries keyed by their name relative to a search base.
pub type EntryMap = BTreeMap<DistinguishedName, AttributeSet>;

/// Changes to apply to an entry during modify operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDelta {
    /// Values to add to an attribute.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub add: IndexMap<String, Vec<String>>,

    /// Values to remove from an attribute.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub remove: IndexMap<String, Vec<String>>,

    /// Attributes to replace entirely.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub replace: IndexMap<String, Vec<String>>,

    /// Attributes to clear (remove all values).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clear: Vec<String>,
}

impl AttributeDelta {
    /// Create a new empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta that makes the entry carry exactly `desired` for the listed
    /// attributes: non-empty attributes are replaced, zero-valued ones cleared.
    pub fn replacing(desired: &AttributeSet) -> Self {
        let mut delta = Self::new();
        for (name, values) in desired.iter() {
            if values.is_empty() {
                delta.clear_attribute(name.clone());
            } else {
                delta.replace(name.clone(), values.clone());
            }
        }
        delta
    }

    /// Add values to an attribute.
    pub fn add(&mut self, name: impl Into<String>, values: Vec<String>) -> &mut Self {
        self.add.insert(name.into(), values);
        self
    }

    /// Remove values from an attribute.
    pub fn remove(&mut self, name: impl Into<String>, values: Vec<String>) -> &mut Self {
        self.remove.insert(name.into(), values);
        self
    }

    /// Replace an attribute's values entirely.
    pub fn replace(&mut self, name: impl Into<String>, values: Vec<String>) -> &mut Self {
        self.replace.insert(name.into(), values);
        self
    }

    /// Clear all values from an attribute.
    pub fn clear_attribute(&mut self, name: impl Into<String>) -> &mut Self {
        self.clear.push(name.into());
        self
    }

    /// Check if this delta has any changes.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty()
            && self.remove.is_empty()
            && self.replace.is_empty()
            && self.clear.is_empty()
    }

    /// Get all affected attribute names.
    pub fn affected_attributes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        names.extend(self.add.keys().map(String::as_str));
        names.extend(self.remove.keys().map(String::as_str));
        names.extend(self.replace.keys().map(String::as_str));
        names.extend(self.clear.iter().map(String::as_str));
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Filter for search operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Match entries where attribute equals value.
    Equals { attribute: String, value: String },

    /// Match entries where attribute exists (has any value).
    Present { attribute: String },

    /// Logical AND of multiple filters.
    And { filters: Vec<Filter> },

    /// Logical OR of multiple filters.
    Or { filters: Vec<Filter> },

    /// Logical NOT of a filter.
    Not { filter: Box<Filter> },
}

impl Filter {
    /// Create an equals filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a present (attribute exists) filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    /// Create an AND filter.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    /// Create an OR filter.
    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or { filters }
    }

    /// Create a NOT filter (negation).
    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// Filter selecting entries of any of the given object classes.
    ///
    /// No classes selects every entry, a single class an equality match and
    /// several classes a disjunction.
    pub fn object_classes<S: AsRef<str>>(classes: &[S]) -> Self {
        match classes {
            [] => Filter::present(OBJECT_CLASS),
            [single] => Filter::eq(OBJECT_CLASS, single.as_ref()),
            many => Filter::or(
                many.iter()
                    .map(|class| Filter::eq(OBJECT_CLASS, class.as_ref()))
                    .collect(),
            ),
        }
    }

    /// Evaluate the filter against an attribute set.
    ///
    /// Attribute names match case-insensitively, values ASCII
    /// case-insensitively.
    pub fn matches(&self, attributes: &AttributeSet) -> bool {
        match self {
            Filter::Equals { attribute, value } => {
                values_of(attributes, attribute).any(|v| v.eq_ignore_ascii_case(value))
            }
            Filter::Present { attribute } => values_of(attributes, attribute).next().is_some(),
            Filter::And { filters } => filters.iter().all(|f| f.matches(attributes)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(attributes)),
            Filter::Not { filter } => !filter.matches(attributes),
        }
    }
}

fn values_of<'a>(attributes: &'a AttributeSet, name: &'a str) -> impl Iterator<Item = &'a String> {
    attributes
        .iter()
        .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
        .flat_map(|(_, values)| values.iter())
}

/// Opaque continuation token returned by a paged search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCookie(pub Vec<u8>);

/// A subtree search below a base name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Search base, relative to the session's base context.
    pub base: DistinguishedName,

    /// Entry filter.
    pub filter: Filter,

    /// Attributes to return; empty returns all user attributes.
    #[serde(default)]
    pub attributes: Vec<String>,

    /// Maximum number of entries per page.
    pub page_size: u32,
}

impl SearchRequest {
    /// Create a request returning all attributes of every entry below `base`.
    pub fn new(base: DistinguishedName, page_size: u32) -> Self {
        Self {
            base,
            filter: Filter::object_classes::<&str>(&[]),
            attributes: Vec::new(),
            page_size,
        }
    }

    /// Set the filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the returned attributes.
    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes = attributes;
        self
    }
}

/// One page of a search.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Entries, named relative to the session's base context.
    pub entries: Vec<Entry>,

    /// Continuation for the next page, `None` on the last page.
    pub next: Option<PageCookie>,
}

impl SearchPage {
    /// Create a final page.
    pub fn last(entries: Vec<Entry>) -> Self {
        Self {
            entries,
            next: None,
        }
    }

    /// Whether more pages follow.
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_set_keeps_insertion_order() {
        let attrs = AttributeSet::new()
            .with("cn", ["DS1"])
            .with("description", ["Division 1"])
            .with("member", ["cn=a", "cn=b"]);

        let names: Vec<&str> = attrs.names().collect();
        assert_eq!(names, vec!["cn", "description", "member"]);
        assert_eq!(attrs.values("member"), ["cn=a", "cn=b"]);
        assert_eq!(attrs.first("cn"), Some("DS1"));
        assert!(attrs.values("missing").is_empty());
    }

    #[test]
    fn test_attribute_set_push_and_remove() {
        let mut attrs = AttributeSet::new();
        attrs.push_value("member", "cn=a");
        attrs.push_value("member", "cn=b");
        assert_eq!(attrs.values("member").len(), 2);

        assert_eq!(attrs.remove("member").map(|v| v.len()), Some(2));
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_without_empty() {
        let attrs = AttributeSet::new()
            .with("cn", ["a"])
            .with("description", Vec::<String>::new());
        let stripped = attrs.without_empty();
        assert_eq!(stripped.len(), 1);
        assert!(stripped.has("cn"));
        assert!(!stripped.has("description"));
    }

    #[test]
    fn test_delta_replacing() {
        let desired = AttributeSet::new()
            .with("cn", ["a"])
            .with("description", Vec::<String>::new());
        let delta = AttributeDelta::replacing(&desired);

        assert_eq!(delta.replace.get("cn"), Some(&vec!["a".to_string()]));
        assert_eq!(delta.clear, vec!["description".to_string()]);
        assert_eq!(delta.affected_attributes(), vec!["cn", "description"]);
        assert!(!delta.is_empty());
        assert!(AttributeDelta::new().is_empty());
    }

    #[test]
    fn test_object_class_filter() {
        assert_eq!(
            Filter::object_classes::<&str>(&[]),
            Filter::present(OBJECT_CLASS)
        );
        assert_eq!(
            Filter::object_classes(&["groupOfNames"]),
            Filter::eq(OBJECT_CLASS, "groupOfNames")
        );
        assert!(matches!(
            Filter::object_classes(&["a", "b"]),
            Filter::Or { filters } if filters.len() == 2
        ));
    }

    #[test]
    fn test_filter_matches() {
        let attrs = AttributeSet::new()
            .with("objectClass", ["top", "groupOfNames"])
            .with("cn", ["DS1"]);

        assert!(Filter::eq("objectclass", "GROUPOFNAMES").matches(&attrs));
        assert!(Filter::present("cn").matches(&attrs));
        assert!(!Filter::present("member").matches(&attrs));
        assert!(Filter::object_classes(&["organizationalUnit", "groupOfNames"]).matches(&attrs));
        assert!(!Filter::negate(Filter::present("cn")).matches(&attrs));
        assert!(Filter::and(vec![Filter::present("cn"), Filter::eq("cn", "ds1")]).matches(&attrs));
    }

    #[test]
    fn test_attribute_set_serializes_as_map() {
        let attrs = AttributeSet::new().with("cn", ["a"]);
        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(json, r#"{"cn":["a"]}"#);
    }
}
