//! Organization structure synchronization.
//!
//! The source models organizational units as groups (`cn=DS1,ou=Orgs`); the
//! target gets a real unit for each (`ou=DS1,ou=Orgs`).

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::operation::{AttributeSet, EntryMap};
use tracing::warn;

use crate::config::{NamingTranslation, SyncConfiguration, SyncScope};
use crate::error::SyncResult;
use crate::hooks::SyncHooks;
use crate::mapping::AttributeMapping;

use super::{exclusions, group_classes, unit_classes, with_naming_attribute, STRUCTURE};

pub struct StructuralUnitSync {
    scope: SyncScope,
    naming: NamingTranslation,
    excluded: Vec<DistinguishedName>,
}

impl StructuralUnitSync {
    pub fn new(config: &SyncConfiguration, mapping: AttributeMapping) -> Self {
        let (source_classes, _) = group_classes(config);
        let (_, target_classes) = unit_classes(config);
        let scope = SyncScope::new(STRUCTURE, config.organizations())
            .with_object_classes(source_classes, target_classes)
            .with_mapping(mapping);
        let intermediates: Vec<&DistinguishedName> = config.intermediate_source().into_iter().collect();
        let excluded = exclusions(&scope.source_base, &intermediates);
        Self {
            scope,
            naming: config.naming(),
            excluded,
        }
    }
}

impl SyncHooks for StructuralUnitSync {
    fn scope(&self) -> &SyncScope {
        &self.scope
    }

    fn exclude_source(&self) -> Vec<DistinguishedName> {
        self.excluded.clone()
    }

    /// Rename the leftmost component of every group entry to a unit.
    fn source_post_process(&self, entries: EntryMap) -> SyncResult<EntryMap> {
        let group_prefix = self.naming.source_group_prefix();
        let unit_prefix = self.naming.source_unit_prefix();

        let mut units = EntryMap::new();
        for (rdn, attributes) in entries {
            let renamed = match rdn.leaf() {
                Some(leaf) if leaf.attribute().eq_ignore_ascii_case(group_prefix) => {
                    rdn.with_leaf_type(unit_prefix)
                }
                _ => rdn,
            };
            if units.contains_key(&renamed) {
                warn!(rdn = %renamed, "Unit name collision, keeping first");
                continue;
            }
            units.insert(renamed, attributes);
        }
        Ok(units)
    }

    fn transform(
        &self,
        rdn: &DistinguishedName,
        source: &AttributeSet,
        target: Option<&AttributeSet>,
    ) -> SyncResult<AttributeSet> {
        Ok(with_naming_attribute(rdn, source, target))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{config, dn};
    use super::*;

    #[test]
    fn test_scope() {
        let sync = StructuralUnitSync::new(&config(), AttributeMapping::new());
        assert_eq!(sync.name(), "structure");
        assert_eq!(sync.scope().source_object_classes, vec!["groupOfNames"]);
        assert_eq!(sync.scope().target_object_classes, vec!["organizationalUnit"]);
        assert_eq!(sync.exclude_source(), vec![dn("ou=Intermediate")]);
    }

    #[test]
    fn test_groups_become_units() {
        let sync = StructuralUnitSync::new(&config(), AttributeMapping::new());
        let mut entries = EntryMap::new();
        entries.insert(dn("cn=DS1"), AttributeSet::new().with("cn", ["DS1"]));
        entries.insert(dn("cn=Sub,cn=DS1"), AttributeSet::new());
        entries.insert(dn("ou=Plain"), AttributeSet::new());

        let units = sync.source_post_process(entries).unwrap();
        assert!(units.contains_key(&dn("ou=DS1")));
        assert!(units.contains_key(&dn("ou=Sub,cn=DS1")));
        assert!(units.contains_key(&dn("ou=Plain")));
    }

    #[test]
    fn test_naming_attribute_tracks_target() {
        let sync = StructuralUnitSync::new(&config(), AttributeMapping::new());
        let desired = sync
            .transform(&dn("OU=DS1"), &AttributeSet::new(), None)
            .unwrap();
        assert_eq!(desired.values("OU"), ["DS1"]);

        let existing = AttributeSet::new();
        let desired = sync
            .transform(&dn("OU=DS1"), &AttributeSet::new(), Some(&existing))
            .unwrap();
        assert!(desired.is_empty());

        let existing = AttributeSet::new().with("ou", ["DS1"]);
        let desired = sync
            .transform(&dn("OU=DS1"), &AttributeSet::new(), Some(&existing))
            .unwrap();
        assert_eq!(desired, existing);
    }
}
