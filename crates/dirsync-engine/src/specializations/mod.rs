//! Reconciliation specializations.
//!
//! Each specialization is a [`SyncHooks`](crate::hooks::SyncHooks)
//! implementation. The housekeeping job runs them in this order:
//!
//! | Name             | Type                      | Source → target          |
//! |------------------|---------------------------|--------------------------|
//! | `structure`      | [`StructuralUnitSync`]    | groups → units           |
//! | `group`          | [`GroupUnderStructureSync`] | intermediates → groups |
//! | `role-structure` | [`RoleStructureSync`]     | units → units            |
//! | `role-group`     | [`RoleGroupSync`]         | role groups              |
//! | `special-role`   | [`SpecialRoleSync`]       | membership only          |
//! | `entitlement`    | [`EntitlementSync`]       | membership only          |

mod entitlement;
mod group;
mod role_group;
mod role_structure;
mod special_role;
mod structure;

pub use entitlement::EntitlementSync;
pub use group::GroupUnderStructureSync;
pub use role_group::RoleGroupSync;
pub use role_structure::RoleStructureSync;
pub use special_role::SpecialRoleSync;
pub use structure::StructuralUnitSync;

use tracing::{debug, warn};

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::error::StoreError;
use dirsync_connector::operation::AttributeSet;

use crate::config::{NamingTranslation, SearchBases, SyncConfiguration};
use crate::error::{SyncError, SyncResult};
use crate::mapping::AttributeMapping;
use crate::reconciliation::retrieval::relative_to;

pub const STRUCTURE: &str = "structure";
pub const GROUP: &str = "group";
pub const ROLE_STRUCTURE: &str = "role-structure";
pub const ROLE_GROUP: &str = "role-group";
pub const SPECIAL_ROLE: &str = "special-role";
pub const ENTITLEMENT: &str = "entitlement";

/// Specialization names in job order.
pub const ORDER: [&str; 6] = [
    STRUCTURE,
    GROUP,
    ROLE_STRUCTURE,
    ROLE_GROUP,
    SPECIAL_ROLE,
    ENTITLEMENT,
];

/// Source and target group object classes.
pub(crate) fn group_classes(config: &SyncConfiguration) -> (Vec<String>, Vec<String>) {
    (
        vec![config.source().features().group_object_class.clone()],
        vec![config.target().features().group_object_class.clone()],
    )
}

/// Source and target organizational unit object classes.
pub(crate) fn unit_classes(config: &SyncConfiguration) -> (Vec<String>, Vec<String>) {
    (
        vec![config.source().features().organizational_unit_object_class.clone()],
        vec![config.target().features().organizational_unit_object_class.clone()],
    )
}

/// Subtrees lying below `base`, expressed relative to it.
pub(crate) fn exclusions(base: &DistinguishedName, subtrees: &[&DistinguishedName]) -> Vec<DistinguishedName> {
    subtrees
        .iter()
        .filter_map(|subtree| relative_to(subtree, base))
        .collect()
}

/// Parse a membership value.
pub(crate) fn member_name(value: &str) -> SyncResult<DistinguishedName> {
    DistinguishedName::parse(value).map_err(|e| match e {
        StoreError::InvalidName { value, message } => SyncError::naming_syntax(value, message),
        other => SyncError::naming_syntax(value, other.to_string()),
    })
}

/// Parse a membership value, logging and skipping malformed names.
pub(crate) fn parse_member(value: &str) -> Option<DistinguishedName> {
    match member_name(value) {
        Ok(name) => Some(name),
        Err(e) => {
            warn!(error = %e, "Skipping malformed membership value");
            None
        }
    }
}

/// Mapping of a membership-managing specialization: the membership attribute
/// is always read and carried, mapped to itself when the descriptor leaves
/// it out. An empty mapping already carries every attribute.
pub(crate) fn with_membership(mut mapping: AttributeMapping, membership: &str) -> AttributeMapping {
    if !mapping.is_empty() && !mapping.maps(membership) {
        debug!(attribute = %membership, "Membership attribute not in descriptor, carried as is");
        mapping.insert(membership, membership);
    }
    mapping
}

/// Same entry under directory matching rules.
pub(crate) fn same_name(a: &DistinguishedName, b: &DistinguishedName) -> bool {
    a.depth() == b.depth() && a.ends_with(b)
}

/// Add the naming attribute of `rdn` when the attributes lack it.
pub(crate) fn ensure_naming_attribute(rdn: &DistinguishedName, attributes: &mut AttributeSet) {
    if let Some(leaf) = rdn.leaf() {
        let present = attributes
            .names()
            .any(|name| name.eq_ignore_ascii_case(leaf.attribute()));
        if !present {
            attributes.set(leaf.attribute(), [leaf.unescaped_value()]);
        }
    }
}

/// Source attributes plus the naming attribute of `rdn`. An existing target
/// entry only gets it when it already carries one, spelled as the target
/// spells it, so a mapping that leaves it out does not flag every entry.
pub(crate) fn with_naming_attribute(
    rdn: &DistinguishedName,
    source: &AttributeSet,
    target: Option<&AttributeSet>,
) -> AttributeSet {
    let mut desired = source.clone();
    let Some(leaf) = rdn.leaf() else {
        return desired;
    };
    match target {
        None => ensure_naming_attribute(rdn, &mut desired),
        Some(existing) => {
            let spelled = existing
                .names()
                .find(|name| name.eq_ignore_ascii_case(leaf.attribute()));
            let present = desired
                .names()
                .any(|name| name.eq_ignore_ascii_case(leaf.attribute()));
            if let (Some(name), false) = (spelled, present) {
                desired.set(name.to_string(), [leaf.unescaped_value()]);
            }
        }
    }
    desired
}

/// Rewrites role references from the source to the target role subtree.
#[derive(Debug, Clone)]
pub(crate) struct RoleNamespace {
    roles: SearchBases,
    naming: NamingTranslation,
}

impl RoleNamespace {
    pub(crate) fn new(config: &SyncConfiguration) -> Self {
        Self {
            roles: config.roles().clone(),
            naming: config.naming(),
        }
    }

    /// Target name of a source role reference; `None` if `member` is not a role.
    pub(crate) fn rewrite(&self, member: &DistinguishedName) -> Option<DistinguishedName> {
        member
            .strip_suffix(&self.roles.source)
            .map(|relative| self.naming.apply(&relative).join(&self.roles.target))
    }

    /// Whether a target value lies inside the target role subtree.
    pub(crate) fn is_target_role(&self, member: &DistinguishedName) -> bool {
        member.ends_with(&self.roles.target)
    }
}

/// Append preserved values to `members`, skipping names already listed.
pub(crate) fn merge_members(members: &mut Vec<String>, preserved: Vec<String>) {
    for value in preserved {
        let duplicate = match DistinguishedName::parse(&value) {
            Ok(name) => members.iter().any(|m| {
                DistinguishedName::parse(m).map_or(false, |existing| same_name(&existing, &name))
            }),
            Err(_) => members.contains(&value),
        };
        if !duplicate {
            members.push(value);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{config, dn};
    use super::*;

    #[test]
    fn test_role_namespace_rewrite() {
        let roles = RoleNamespace::new(&config());
        assert_eq!(
            roles.rewrite(&dn("cn=Admins,ou=Roles,dc=source")),
            Some(dn("CN=Admins,ou=Roles,dc=target"))
        );
        assert_eq!(roles.rewrite(&dn("cn=alice,ou=Users,dc=source")), None);
        assert!(roles.is_target_role(&dn("CN=Admins,OU=Roles,DC=target")));
    }

    #[test]
    fn test_exclusions_relative_to_base() {
        let base = dn("ou=Roles,dc=source");
        let special = dn("ou=Special,ou=Roles,dc=source");
        let outside = dn("ou=Other,dc=source");
        assert_eq!(exclusions(&base, &[&special, &outside]), vec![dn("ou=Special")]);
    }

    #[test]
    fn test_ensure_naming_attribute() {
        let mut attrs = AttributeSet::new().with("description", ["d"]);
        ensure_naming_attribute(&dn("CN=DS1_Lead,OU=DS1"), &mut attrs);
        assert_eq!(attrs.values("CN"), ["DS1_Lead"]);

        let mut named = AttributeSet::new().with("cn", ["x"]);
        ensure_naming_attribute(&dn("CN=x"), &mut named);
        assert_eq!(named.len(), 1);
    }

    #[test]
    fn test_with_naming_attribute_follows_target_spelling() {
        let source = AttributeSet::new().with("description", ["d"]);
        let added = with_naming_attribute(&dn("CN=Lead"), &source, None);
        assert_eq!(added.values("CN"), ["Lead"]);

        let existing = AttributeSet::new().with("cn", ["Lead"]);
        let updated = with_naming_attribute(&dn("CN=Lead"), &source, Some(&existing));
        assert_eq!(updated.values("cn"), ["Lead"]);
        assert!(!updated.has("CN"));

        let unnamed = with_naming_attribute(&dn("CN=Lead"), &source, Some(&AttributeSet::new()));
        assert_eq!(unnamed, source);
    }

    #[test]
    fn test_merge_members_skips_same_names() {
        let mut members = vec!["CN=a,OU=Roles,DC=t".to_string()];
        merge_members(
            &mut members,
            vec!["cn=a,ou=roles,dc=t".to_string(), "cn=alice,ou=Users".to_string()],
        );
        assert_eq!(members, vec!["CN=a,OU=Roles,DC=t", "cn=alice,ou=Users"]);
    }

    #[test]
    fn test_parse_member() {
        assert!(parse_member("cn=a,ou=b").is_some());
        assert!(parse_member("not a name").is_none());
    }

    #[test]
    fn test_malformed_member_is_naming_syntax() {
        let err = member_name("not a name").unwrap_err();
        assert!(err.is_naming_syntax());
        assert!(err.to_string().contains("'not a name'"));

        assert_eq!(member_name("cn=a,ou=b").unwrap().depth(), 2);
    }
}
