//! Parsed distinguished names.
//!
//! A [`DistinguishedName`] is an ordered sequence of naming components, leaf
//! first. Parsing follows RFC 4514: components are separated by unescaped
//! commas, escaped separators stay inside their value, and values keep their
//! escaped form so that a parsed name re-emits exactly what the directory sent.
//!
//! Depth is the number of components, never a count of separator characters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// One naming component (`type=value`) of a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RdnComponent {
    attribute: String,
    /// Value in RFC 4514 escaped form.
    value: String,
}

impl RdnComponent {
    /// Create a component from an attribute type and an already escaped value.
    pub fn new(attribute: impl Into<String>, escaped_value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: escaped_value.into(),
        }
    }

    /// Create a component from a raw value, escaping it.
    pub fn from_raw(attribute: impl Into<String>, value: &str) -> Self {
        Self::new(attribute, escape_value(value))
    }

    /// Attribute type of the component (`cn`, `ou`, ...).
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Value in escaped form.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Value with RFC 4514 escapes resolved.
    pub fn unescaped_value(&self) -> String {
        unescape_value(&self.value)
    }

    /// Same component with another attribute type.
    pub fn with_attribute(&self, attribute: impl Into<String>) -> Self {
        Self::new(attribute, self.value.clone())
    }

    /// Directory matching: attribute type and value compared ASCII
    /// case-insensitively.
    pub fn matches(&self, other: &RdnComponent) -> bool {
        self.attribute.eq_ignore_ascii_case(&other.attribute)
            && self.value.eq_ignore_ascii_case(&other.value)
    }
}

impl fmt::Display for RdnComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, self.value)
    }
}

/// A hierarchical name, leaf component first.
///
/// Equality and ordering are exact (case-sensitive), so names can key entry
/// maps the way the directory returned them. Suffix operations use directory
/// matching rules instead, see [`RdnComponent::matches`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistinguishedName {
    components: Vec<RdnComponent>,
}

impl DistinguishedName {
    /// The empty name (the root of a store or search base).
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a name, failing with [`StoreError::InvalidName`].
    pub fn parse(value: &str) -> StoreResult<Self> {
        value.parse()
    }

    /// Build a name from components, leaf first.
    pub fn from_components(components: Vec<RdnComponent>) -> Self {
        Self { components }
    }

    /// Whether the name has no components.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Number of naming components.
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Components, leaf first.
    pub fn components(&self) -> &[RdnComponent] {
        &self.components
    }

    /// Leftmost component.
    pub fn leaf(&self) -> Option<&RdnComponent> {
        self.components.first()
    }

    /// The name without its leaf component. The parent of the root is the root.
    pub fn parent(&self) -> Self {
        Self {
            components: self.components.iter().skip(1).cloned().collect(),
        }
    }

    /// Whether `suffix` names this entry or one of its ancestors.
    pub fn ends_with(&self, suffix: &DistinguishedName) -> bool {
        if suffix.depth() > self.depth() {
            return false;
        }
        let offset = self.depth() - suffix.depth();
        self.components[offset..]
            .iter()
            .zip(&suffix.components)
            .all(|(a, b)| a.matches(b))
    }

    /// The part of the name in front of `suffix`, if the name ends with it.
    pub fn strip_suffix(&self, suffix: &DistinguishedName) -> Option<Self> {
        if !self.ends_with(suffix) {
            return None;
        }
        let keep = self.depth() - suffix.depth();
        Some(Self {
            components: self.components[..keep].to_vec(),
        })
    }

    /// Append `suffix` below this name: `cn=a`.join(`ou=b`) is `cn=a,ou=b`.
    pub fn join(&self, suffix: &DistinguishedName) -> Self {
        let mut components = self.components.clone();
        components.extend(suffix.components.iter().cloned());
        Self { components }
    }

    /// Prepend a leaf component.
    pub fn child(&self, leaf: RdnComponent) -> Self {
        let mut components = Vec::with_capacity(self.depth() + 1);
        components.push(leaf);
        components.extend(self.components.iter().cloned());
        Self { components }
    }

    /// Rewrite the attribute type of the leaf component only.
    pub fn with_leaf_type(&self, attribute: &str) -> Self {
        let mut renamed = self.clone();
        if let Some(leaf) = renamed.components.first_mut() {
            *leaf = leaf.with_attribute(attribute);
        }
        renamed
    }

    /// Rewrite every component whose attribute type is exactly `from`.
    pub fn rename_types(&self, from: &str, to: &str) -> Self {
        if from == to {
            return self.clone();
        }
        Self {
            components: self
                .components
                .iter()
                .map(|c| {
                    if c.attribute == from {
                        c.with_attribute(to)
                    } else {
                        c.clone()
                    }
                })
                .collect(),
        }
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

impl FromStr for DistinguishedName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let components = split_unescaped(trimmed, ',')
            .map_err(|message| StoreError::invalid_name(s, message))?
            .into_iter()
            .map(|raw| parse_component(&raw).map_err(|message| StoreError::invalid_name(s, message)))
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Self { components })
    }
}

impl TryFrom<String> for DistinguishedName {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.to_string()
    }
}

/// Split on unescaped, unquoted occurrences of `separator`.
fn split_unescaped(input: &str, separator: char) -> Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    let mut quoted = false;

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| "trailing escape character".to_string())?;
                current.push(ch);
                current.push(escaped);
            }
            '"' => {
                quoted = !quoted;
                current.push(ch);
            }
            c if c == separator && !quoted => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }

    if quoted {
        return Err("unterminated quoted value".to_string());
    }
    parts.push(current);
    Ok(parts)
}

fn parse_component(raw: &str) -> Result<RdnComponent, String> {
    let raw = raw.trim_start();
    let (attribute, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("component '{raw}' has no '='"))?;

    let attribute = attribute.trim();
    if attribute.is_empty() {
        return Err(format!("component '{raw}' has an empty attribute type"));
    }
    if !attribute
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(format!("invalid attribute type '{attribute}'"));
    }

    let value = trim_value(value);
    if value.is_empty() {
        return Err(format!("component '{raw}' has an empty value"));
    }

    Ok(RdnComponent::new(attribute, value))
}

/// Trim surrounding whitespace, keeping an escaped trailing space.
fn trim_value(value: &str) -> &str {
    let value = value.trim_start();
    let trimmed = value.trim_end();
    if trimmed.ends_with('\\') && trimmed.len() < value.len() {
        // "\ " at the end is an escaped space and part of the value
        &value[..trimmed.len() + 1]
    } else {
        trimmed
    }
}

/// Escape a raw attribute value for use in a distinguished name (RFC 4514).
pub fn escape_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len() * 2);
    let count = value.chars().count();

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i + 1 == count;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if is_first || is_last => result.push_str("\\20"),
            '#' if is_first => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}

/// Resolve RFC 4514 escapes (`\,` and `\2C` forms).
pub fn unescape_value(value: &str) -> String {
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);

    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let Some(first) = chars.next() else {
            break;
        };
        match (first.to_digit(16), chars.peek().and_then(|c| c.to_digit(16))) {
            (Some(high), Some(low)) => {
                chars.next();
                bytes.push((high * 16 + low) as u8);
            }
            _ => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(first.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(value: &str) -> DistinguishedName {
        DistinguishedName::parse(value).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let name = dn("cn=DS1, ou=Orgs,dc=example,dc=com");
        assert_eq!(name.depth(), 4);
        assert_eq!(name.to_string(), "cn=DS1,ou=Orgs,dc=example,dc=com");
        assert_eq!(name.leaf().unwrap().attribute(), "cn");
        assert_eq!(name.leaf().unwrap().value(), "DS1");
    }

    #[test]
    fn test_escaped_comma_is_not_a_separator() {
        let name = dn(r"cn=Doe\, John,ou=Users");
        assert_eq!(name.depth(), 2);
        assert_eq!(name.leaf().unwrap().value(), r"Doe\, John");
        assert_eq!(name.leaf().unwrap().unescaped_value(), "Doe, John");
        assert_eq!(name.to_string(), r"cn=Doe\, John,ou=Users");
    }

    #[test]
    fn test_hex_escape() {
        let name = dn(r"cn=Doe\2C John,ou=Users");
        assert_eq!(name.depth(), 2);
        assert_eq!(name.leaf().unwrap().unescaped_value(), "Doe, John");
    }

    #[test]
    fn test_quoted_value() {
        let name = dn(r#"cn="Doe, John",ou=Users"#);
        assert_eq!(name.depth(), 2);
        assert_eq!(name.leaf().unwrap().unescaped_value(), "Doe, John");
    }

    #[test]
    fn test_empty_is_root() {
        let name = dn("  ");
        assert!(name.is_root());
        assert_eq!(name.depth(), 0);
        assert_eq!(name.to_string(), "");
    }

    #[test]
    fn test_invalid_names() {
        assert!(DistinguishedName::parse("cn").unwrap_err().is_invalid_name());
        assert!(DistinguishedName::parse("=value").is_err());
        assert!(DistinguishedName::parse("cn=a,,ou=b").is_err());
        assert!(DistinguishedName::parse(r"cn=a\").is_err());
        assert!(DistinguishedName::parse(r#"cn="open"#).is_err());
        assert!(DistinguishedName::parse("c n=a").is_err());
        assert!(DistinguishedName::parse("cn=").is_err());
    }

    #[test]
    fn test_escaped_trailing_space_kept() {
        let name = dn(r"cn=a\ ,ou=b");
        assert_eq!(name.leaf().unwrap().value(), r"a\ ");
        assert_eq!(name.leaf().unwrap().unescaped_value(), "a ");
    }

    #[test]
    fn test_ends_with_and_strip_suffix() {
        let name = dn("cn=DS1_Lead,ou=Intermediate,ou=Orgs,dc=example");
        let base = dn("OU=Orgs,DC=example");

        assert!(name.ends_with(&base));
        assert!(name.ends_with(&DistinguishedName::root()));
        assert!(!base.ends_with(&name));
        assert!(!name.ends_with(&dn("ou=Roles,dc=example")));

        let relative = name.strip_suffix(&base).unwrap();
        assert_eq!(relative.to_string(), "cn=DS1_Lead,ou=Intermediate");
        assert!(dn("ou=Orgs,dc=example").strip_suffix(&base).unwrap().is_root());
        assert!(name.strip_suffix(&dn("dc=other")).is_none());
    }

    #[test]
    fn test_suffix_match_is_component_wise() {
        // "ou=XOrgs" must not match suffix "ou=Orgs" even though the string does
        let name = dn("cn=a,ou=XOrgs");
        assert!(!name.ends_with(&dn("ou=Orgs")));
    }

    #[test]
    fn test_join_and_child() {
        let relative = dn("cn=DS1_Lead");
        let joined = relative.join(&dn("ou=DS1,dc=example"));
        assert_eq!(joined.to_string(), "cn=DS1_Lead,ou=DS1,dc=example");
        assert_eq!(joined.parent().to_string(), "ou=DS1,dc=example");

        let child = dn("ou=DS1").child(RdnComponent::from_raw("cn", "A, B"));
        assert_eq!(child.to_string(), r"cn=A\, B,ou=DS1");
    }

    #[test]
    fn test_with_leaf_type_rewrites_only_leftmost() {
        let name = dn("cn=DS1,cn=Parent");
        assert_eq!(name.with_leaf_type("ou").to_string(), "ou=DS1,cn=Parent");
    }

    #[test]
    fn test_rename_types() {
        let name = dn("cn=a,ou=b,cn=c");
        assert_eq!(name.rename_types("cn", "CN").to_string(), "CN=a,ou=b,CN=c");
        assert_eq!(name.rename_types("ou", "ou"), name);
    }

    #[test]
    fn test_escape_value() {
        assert_eq!(escape_value("a,b"), r"a\,b");
        assert_eq!(escape_value(" lead"), r"\20lead");
        assert_eq!(escape_value("trail "), r"trail\20");
        assert_eq!(escape_value("#hash"), r"\23hash");
        assert_eq!(escape_value("plain"), "plain");
    }

    #[test]
    fn test_serde_as_string() {
        let name = dn("cn=a,ou=b");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"cn=a,ou=b\"");
        let back: DistinguishedName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
        assert!(serde_json::from_str::<DistinguishedName>("\"broken\"").is_err());
    }
}
