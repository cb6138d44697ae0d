//! Role structure synchronization: units of the role subtree, copied unit
//! for unit. Special role and entitlement subtrees are managed elsewhere.

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::operation::AttributeSet;

use crate::config::{SyncConfiguration, SyncScope};
use crate::error::SyncResult;
use crate::hooks::SyncHooks;
use crate::mapping::AttributeMapping;

use super::{exclusions, unit_classes, with_naming_attribute, ROLE_STRUCTURE};

pub struct RoleStructureSync {
    scope: SyncScope,
    excluded_source: Vec<DistinguishedName>,
    excluded_target: Vec<DistinguishedName>,
}

impl RoleStructureSync {
    pub fn new(config: &SyncConfiguration, mapping: AttributeMapping) -> Self {
        let (source_classes, target_classes) = unit_classes(config);
        let scope = SyncScope::new(ROLE_STRUCTURE, config.roles())
            .with_object_classes(source_classes, target_classes)
            .with_mapping(mapping);
        let excluded_source = exclusions(
            &scope.source_base,
            &[&config.special_roles().source, &config.entitlements().source],
        );
        let excluded_target = exclusions(
            &scope.target_base,
            &[&config.special_roles().target, &config.entitlements().target],
        );
        Self {
            scope,
            excluded_source,
            excluded_target,
        }
    }
}

impl SyncHooks for RoleStructureSync {
    fn scope(&self) -> &SyncScope {
        &self.scope
    }

    fn exclude_source(&self) -> Vec<DistinguishedName> {
        self.excluded_source.clone()
    }

    fn exclude_target(&self) -> Vec<DistinguishedName> {
        self.excluded_target.clone()
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
    fn test_excludes_special_and_entitlement_subtrees() {
        let sync = RoleStructureSync::new(&config(), AttributeMapping::new());
        assert_eq!(sync.name(), "role-structure");
        assert_eq!(sync.exclude_source(), vec![dn("ou=Special"), dn("ou=Ent")]);
        assert_eq!(sync.exclude_target(), vec![dn("ou=Special"), dn("ou=Ent")]);
        assert_eq!(sync.scope().target_object_classes, vec!["organizationalUnit"]);
    }
}
