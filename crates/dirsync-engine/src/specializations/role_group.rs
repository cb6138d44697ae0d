//! Role group synchronization.
//!
//! Role membership lists mix three kinds of references:
//!
//! - users: left alone, the target manages them;
//! - roles: moved from the source role subtree to the target role subtree;
//! - intermediates: resolved to the organization group that lists them and
//!   re-pointed at that organization on the target.
//!
//! Target members that are neither roles nor organization groups are kept.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::operation::AttributeSet;

use crate::config::{NamingTranslation, SearchBases, SyncConfiguration, SyncScope};
use crate::engine::{Side, SyncContext};
use crate::error::SyncResult;
use crate::hooks::SyncHooks;
use crate::mapping::AttributeMapping;
use crate::reconciliation::retrieval::RetrievalQuery;

use super::{
    exclusions, group_classes, merge_members, parse_member, same_name, with_membership,
    RoleNamespace, ROLE_GROUP,
};

/// Organization groups, loaded before comparing.
#[derive(Debug, Default)]
struct OrganizationIndex {
    /// Source groups (full names) with their parsed members.
    source: Vec<(DistinguishedName, Vec<DistinguishedName>)>,
    /// Full names of target groups.
    target: Vec<DistinguishedName>,
}

pub struct RoleGroupSync {
    scope: SyncScope,
    roles: RoleNamespace,
    organizations: SearchBases,
    intermediate: Option<DistinguishedName>,
    naming: NamingTranslation,
    membership: String,
    excluded_source: Vec<DistinguishedName>,
    excluded_target: Vec<DistinguishedName>,
    index: Option<OrganizationIndex>,
}

impl RoleGroupSync {
    pub fn new(config: &SyncConfiguration, mapping: AttributeMapping) -> Self {
        let mut sync = Self::with_bases(ROLE_GROUP, config, config.roles(), mapping);
        sync.excluded_source = exclusions(
            &sync.scope.source_base,
            &[&config.special_roles().source, &config.entitlements().source],
        );
        sync.excluded_target = exclusions(
            &sync.scope.target_base,
            &[&config.special_roles().target, &config.entitlements().target],
        );
        sync
    }

    /// Same membership rules over another pair of search bases.
    pub(crate) fn with_bases(
        name: &str,
        config: &SyncConfiguration,
        bases: &SearchBases,
        mapping: AttributeMapping,
    ) -> Self {
        let (source_classes, target_classes) = group_classes(config);
        let mapping = with_membership(mapping, config.membership_attribute());
        Self {
            scope: SyncScope::new(name, bases)
                .with_object_classes(source_classes, target_classes)
                .with_mapping(mapping),
            roles: RoleNamespace::new(config),
            organizations: config.organizations().clone(),
            intermediate: config.intermediate_source().cloned(),
            naming: config.naming(),
            membership: config.membership_attribute().to_string(),
            excluded_source: Vec::new(),
            excluded_target: Vec::new(),
            index: None,
        }
    }

    /// Target reference for an intermediate: the leaf of the organization
    /// group listing it, below the target organization root.
    fn resolve_intermediate(&self, member: &DistinguishedName) -> Option<DistinguishedName> {
        let index = self.index.as_ref()?;
        let owner = index
            .source
            .iter()
            .find(|(_, members)| members.iter().any(|m| same_name(m, member)))
            .map(|(group, _)| group);
        match owner.and_then(|group| self.organization_reference(group)) {
            Some(reference) => Some(reference),
            None => {
                warn!(member = %member, "No organization group lists this intermediate, skipped");
                None
            }
        }
    }

    fn is_intermediate(&self, member: &DistinguishedName) -> bool {
        self.intermediate
            .as_ref()
            .map_or(false, |base| member.ends_with(base))
    }

    /// Name a source organization group is referenced by on the target.
    fn organization_reference(&self, group: &DistinguishedName) -> Option<DistinguishedName> {
        let leaf = DistinguishedName::from_components(vec![group.leaf()?.clone()]);
        Some(self.naming.apply(&leaf).join(&self.organizations.target))
    }

    /// Whether `member` names an organization group on the target, either
    /// an existing group or a reference written for a source organization.
    fn is_target_organization(&self, member: &DistinguishedName) -> bool {
        let Some(index) = self.index.as_ref() else {
            return false;
        };
        index.target.iter().any(|g| same_name(g, member))
            || index
                .source
                .iter()
                .filter_map(|(group, _)| self.organization_reference(group))
                .any(|reference| same_name(&reference, member))
    }

    /// Target membership computed from source values.
    fn rewrite_members(&self, source: &[String]) -> Vec<String> {
        let mut members: Vec<String> = Vec::new();
        for value in source {
            let Some(member) = parse_member(value) else {
                continue;
            };
            let rewritten = if let Some(role) = self.roles.rewrite(&member) {
                Some(role)
            } else if self.is_intermediate(&member) {
                self.resolve_intermediate(&member)
            } else {
                None
            };
            if let Some(name) = rewritten {
                merge_members(&mut members, vec![name.to_string()]);
            }
        }
        members
    }

    /// Existing target members this sync does not manage.
    fn preserved_members(&self, target: &[String]) -> Vec<String> {
        target
            .iter()
            .filter(|value| match DistinguishedName::parse(value) {
                Ok(name) => !self.roles.is_target_role(&name) && !self.is_target_organization(&name),
                Err(_) => true,
            })
            .cloned()
            .collect()
    }

    async fn load_index(&self, ctx: &SyncContext<'_>) -> SyncResult<OrganizationIndex> {
        let (source_classes, target_classes) = group_classes(ctx.config());

        let source = ctx
            .retrieve(
                Side::Source,
                &self.organizations.source,
                &RetrievalQuery {
                    object_classes: source_classes,
                    attributes: vec![self.membership.clone()],
                    exclusions: Vec::new(),
                },
            )
            .await?;
        let target = ctx
            .retrieve(
                Side::Target,
                &self.organizations.target,
                &RetrievalQuery {
                    object_classes: target_classes,
                    attributes: vec![self.membership.clone()],
                    exclusions: Vec::new(),
                },
            )
            .await?;

        let source = source
            .into_iter()
            .map(|(rdn, attrs)| {
                let members = attrs
                    .values(&self.membership)
                    .iter()
                    .filter_map(|v| parse_member(v))
                    .collect();
                (rdn.join(&self.organizations.source), members)
            })
            .collect();
        let target = target
            .into_keys()
            .map(|rdn| rdn.join(&self.organizations.target))
            .collect();
        Ok(OrganizationIndex { source, target })
    }
}

#[async_trait]
impl SyncHooks for RoleGroupSync {
    fn scope(&self) -> &SyncScope {
        &self.scope
    }

    async fn before_sync(&mut self, ctx: &SyncContext<'_>) -> SyncResult<()> {
        let index = self.load_index(ctx).await?;
        info!(
            source_groups = index.source.len(),
            target_groups = index.target.len(),
            "Loaded organization groups"
        );
        self.index = Some(index);
        Ok(())
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
        let mut members = self.rewrite_members(source.values(&self.membership));
        if let Some(target) = target {
            merge_members(&mut members, self.preserved_members(target.values(&self.membership)));
        }
        debug!(rdn = %rdn, members = members.len(), "Computed role membership");

        let mut desired = source.clone();
        desired.set(self.membership.clone(), members);
        Ok(desired)
    }

    async fn after_sync(&mut self, _ctx: &SyncContext<'_>) -> SyncResult<()> {
        self.index = None;
        Ok(())
    }
}

/// Membership helpers shared with the entitlement sync.
pub(crate) fn role_members(roles: &RoleNamespace, source: &[String]) -> Vec<String> {
    let mut members = Vec::new();
    for value in source {
        if let Some(role) = parse_member(value).and_then(|m| roles.rewrite(&m)) {
            merge_members(&mut members, vec![role.to_string()]);
        }
    }
    members
}

/// Existing target members outside the target role subtree.
pub(crate) fn non_role_members(roles: &RoleNamespace, target: &[String]) -> Vec<String> {
    target
        .iter()
        .filter(|value| {
            DistinguishedName::parse(value).map_or(true, |name| !roles.is_target_role(&name))
        })
        .cloned()
        .collect()
}

// Lets tests build an index without a store.
#[cfg(test)]
impl RoleGroupSync {
    fn with_index(
        mut self,
        source: Vec<(DistinguishedName, Vec<DistinguishedName>)>,
        target: Vec<DistinguishedName>,
    ) -> Self {
        self.index = Some(OrganizationIndex { source, target });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{config, config_with_intermediate, dn};
    use super::*;

    fn sync() -> RoleGroupSync {
        RoleGroupSync::new(&config(), AttributeMapping::new()).with_index(
            vec![(
                dn("cn=DS1,ou=Orgs,dc=source"),
                vec![dn("cn=DS1_Lead,ou=Intermediate,ou=Orgs,dc=source")],
            )],
            vec![dn("CN=DS1_Lead,OU=DS1,ou=Orgs,dc=target")],
        )
    }

    #[test]
    fn test_members_classified_by_namespace() {
        let source = AttributeSet::new().with("cn", ["Admins"]).with(
            "member",
            [
                "uid=alice,ou=Users,dc=source",
                "cn=Auditors,ou=Roles,dc=source",
                "cn=DS1_Lead,ou=Intermediate,ou=Orgs,dc=source",
                "cn=Unknown,ou=Intermediate,ou=Orgs,dc=source",
            ],
        );
        let desired = sync()
            .transform(&dn("CN=Admins"), &source, None)
            .unwrap();

        assert_eq!(
            desired.values("member"),
            ["CN=Auditors,ou=Roles,dc=target", "CN=DS1,ou=Orgs,dc=target"]
        );
        assert_eq!(desired.values("cn"), ["Admins"]);
    }

    #[test]
    fn test_target_users_preserved_roles_and_orgs_replaced() {
        let source = AttributeSet::new().with("member", ["cn=Auditors,ou=Roles,dc=source"]);
        let target = AttributeSet::new().with(
            "member",
            [
                "uid=bob,ou=Users,dc=target",
                "CN=Stale,ou=Roles,dc=target",
                "CN=DS1_Lead,OU=DS1,ou=Orgs,dc=target",
            ],
        );
        let desired = sync()
            .transform(&dn("CN=Admins"), &source, Some(&target))
            .unwrap();

        assert_eq!(
            desired.values("member"),
            ["CN=Auditors,ou=Roles,dc=target", "uid=bob,ou=Users,dc=target"]
        );
    }

    #[test]
    fn test_organization_reference_retracted_when_source_drops_it() {
        let source = AttributeSet::new().with("member", ["uid=alice,ou=Users,dc=source"]);
        let target = AttributeSet::new().with(
            "member",
            ["cn=DS1,ou=Orgs,dc=target", "uid=bob,ou=Users,dc=target"],
        );
        let sync = sync();
        let desired = sync
            .transform(&dn("CN=Admins"), &source, Some(&target))
            .unwrap();

        assert_eq!(desired.values("member"), ["uid=bob,ou=Users,dc=target"]);
        assert!(sync.is_modified(&desired, &target));
    }

    #[test]
    fn test_membership_carried_when_descriptor_omits_it() {
        let mapping = AttributeMapping::new()
            .with("cn", "cn")
            .with("description", "description");
        let sync = RoleGroupSync::new(&config(), mapping);
        let mapping = &sync.scope().mapping;
        assert_eq!(mapping.targets("member").unwrap(), Some(vec!["member".to_string()]));
        assert!(mapping.source_attributes().contains(&"member".to_string()));
        assert!(mapping.target_attributes().unwrap().contains(&"member".to_string()));

        let sync = RoleGroupSync::new(&config(), AttributeMapping::new());
        assert!(sync.scope().mapping.is_empty());
    }

    #[test]
    fn test_without_intermediate_base_only_roles_rewritten() {
        let sync = RoleGroupSync::new(&config_with_intermediate(""), AttributeMapping::new());
        let source = AttributeSet::new().with(
            "member",
            [
                "cn=Auditors,ou=Roles,dc=source",
                "cn=DS1_Lead,ou=Intermediate,ou=Orgs,dc=source",
            ],
        );
        let desired = sync.transform(&dn("CN=Admins"), &source, None).unwrap();
        assert_eq!(desired.values("member"), ["CN=Auditors,ou=Roles,dc=target"]);
    }

    #[test]
    fn test_excludes_special_and_entitlement_subtrees() {
        let sync = sync();
        assert_eq!(sync.exclude_source(), vec![dn("ou=Special"), dn("ou=Ent")]);
        assert_eq!(sync.scope().target_object_classes, vec!["groupOfNames"]);
    }

    #[test]
    fn test_role_helpers() {
        let roles = RoleNamespace::new(&config());
        let members = role_members(
            &roles,
            &[
                "cn=A,ou=Roles,dc=source".to_string(),
                "uid=x,ou=Users,dc=source".to_string(),
            ],
        );
        assert_eq!(members, vec!["CN=A,ou=Roles,dc=target"]);

        let kept = non_role_members(
            &roles,
            &["CN=A,ou=Roles,dc=target".to_string(), "uid=x".to_string()],
        );
        assert_eq!(kept, vec!["uid=x"]);
    }
}
