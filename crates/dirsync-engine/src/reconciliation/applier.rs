//! Hierarchy-safe application of a comparison result.
//!
//! Groups are applied ADD, then MODIFY, then DELETE, each on its own session.
//! Creates run parents first, deletes run children first. A failed call stops
//! the rest of its group; earlier changes stay in place.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::operation::{AttributeDelta, AttributeSet, EntryMap, OBJECT_CLASS};
use dirsync_connector::traits::{EntryStore, Session};

use crate::error::{SyncError, SyncResult};

use super::differ::{ComparisonResult, EntryTag};

/// Options for one apply run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Object classes stamped onto created entries.
    pub object_classes: Vec<String>,
    /// Membership attribute to strip from entries before deleting them.
    pub retract_membership: Option<String>,
}

impl ApplyOptions {
    pub fn new(object_classes: Vec<String>) -> Self {
        Self {
            object_classes,
            retract_membership: None,
        }
    }

    #[must_use]
    pub fn with_membership_retraction(mut self, attribute: impl Into<String>) -> Self {
        self.retract_membership = Some(attribute.into());
        self
    }
}

/// A directory call that failed while applying a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyFailure {
    pub tag: EntryTag,
    pub rdn: DistinguishedName,
    pub message: String,
    /// Entries of the group that were not attempted.
    pub skipped: usize,
}

/// Outcome of applying a comparison result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    #[serde(default)]
    pub created: usize,
    #[serde(default)]
    pub modified: usize,
    #[serde(default)]
    pub deleted: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ApplyFailure>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn count(&mut self, tag: EntryTag) {
        match tag {
            EntryTag::Add => self.created += 1,
            EntryTag::Modify => self.modified += 1,
            EntryTag::Delete => self.deleted += 1,
        }
    }
}

/// Applies tagged entries to a target store below a search base.
pub struct HierarchyApplier<'a> {
    store: &'a dyn EntryStore,
    base: DistinguishedName,
    options: ApplyOptions,
}

impl<'a> HierarchyApplier<'a> {
    /// `base` is the full name of the search base the entries are relative to.
    pub fn new(
        store: &'a dyn EntryStore,
        base: &DistinguishedName,
        options: ApplyOptions,
    ) -> SyncResult<Self> {
        let base = base.strip_suffix(store.root_context()).ok_or_else(|| {
            SyncError::configuration(format!(
                "search base '{base}' is not under root context '{}' of {}",
                store.root_context(),
                store.display_name()
            ))
        })?;
        Ok(Self {
            store,
            base,
            options,
        })
    }

    /// Apply every group. Connection failures abort with an error; failed
    /// directory calls are recorded in the report.
    #[instrument(skip(self, result), fields(store = %self.store.display_name(), base = %self.base))]
    pub async fn apply(&self, result: &ComparisonResult) -> SyncResult<ApplyReport> {
        let mut report = ApplyReport::default();

        for (tag, entries) in result.groups() {
            let mut session = self.store.connect(&self.base).await?;
            let outcome = self
                .apply_group(&mut session, tag, entries, &mut report)
                .await;
            self.store.disconnect(session).await;

            if let Some(failure) = outcome? {
                report.failures.push(failure);
            }
        }

        info!(
            created = report.created,
            modified = report.modified,
            deleted = report.deleted,
            failures = report.failures.len(),
            "Applied changes"
        );
        Ok(report)
    }

    async fn apply_group(
        &self,
        session: &mut Session,
        tag: EntryTag,
        entries: &EntryMap,
        report: &mut ApplyReport,
    ) -> SyncResult<Option<ApplyFailure>> {
        let ordered = ordered(tag, entries);
        let subtree = match tag {
            EntryTag::Delete => self.store.supports_subtree_delete(session).await?,
            _ => false,
        };

        for (index, (rdn, attributes)) in ordered.iter().enumerate() {
            let outcome = match tag {
                EntryTag::Add => self.create(session, rdn, attributes).await,
                EntryTag::Modify => self.modify(session, rdn, attributes).await,
                EntryTag::Delete => self.delete(session, rdn, attributes, subtree).await,
            };

            if let Err(e) = outcome {
                let skipped = ordered.len() - index - 1;
                error!(tag = %tag, rdn = %rdn, error = %e, skipped, "Apply group aborted");
                return Ok(Some(ApplyFailure {
                    tag,
                    rdn: (*rdn).clone(),
                    message: e.to_string(),
                    skipped,
                }));
            }
            report.count(tag);
        }
        Ok(None)
    }

    async fn create(
        &self,
        session: &mut Session,
        rdn: &DistinguishedName,
        attributes: &AttributeSet,
    ) -> SyncResult<()> {
        let mut stamped = attributes.without_empty();
        if !self.options.object_classes.is_empty() {
            stamped.set(OBJECT_CLASS, self.options.object_classes.iter().cloned());
        }
        debug!(rdn = %rdn, "Creating entry");
        self.store
            .create(session, rdn, &stamped)
            .await
            .map_err(|e| SyncError::directory_operation("create", rdn.clone(), e))
    }

    async fn modify(
        &self,
        session: &mut Session,
        rdn: &DistinguishedName,
        attributes: &AttributeSet,
    ) -> SyncResult<()> {
        let delta = AttributeDelta::replacing(attributes);
        if delta.is_empty() {
            return Ok(());
        }
        debug!(rdn = %rdn, attributes = ?delta.affected_attributes(), "Modifying entry");
        self.store
            .modify(session, rdn, &delta)
            .await
            .map_err(|e| SyncError::directory_operation("modify", rdn.clone(), e))
    }

    async fn delete(
        &self,
        session: &mut Session,
        rdn: &DistinguishedName,
        attributes: &AttributeSet,
        subtree: bool,
    ) -> SyncResult<()> {
        if let Some(membership) = &self.options.retract_membership {
            let members = attributes.values(membership);
            if !members.is_empty() {
                let mut delta = AttributeDelta::new();
                delta.remove(membership.clone(), members.to_vec());
                debug!(rdn = %rdn, count = members.len(), "Retracting membership before delete");
                self.store
                    .modify(session, rdn, &delta)
                    .await
                    .map_err(|e| SyncError::directory_operation("modify", rdn.clone(), e))?;
            }
        }
        debug!(rdn = %rdn, subtree, "Deleting entry");
        self.store
            .delete(session, rdn, subtree)
            .await
            .map_err(|e| SyncError::directory_operation("delete", rdn.clone(), e))
    }
}

/// Entries of a group in apply order: ascending depth for ADD, descending
/// for DELETE, name order otherwise.
fn ordered(tag: EntryTag, entries: &EntryMap) -> Vec<(&DistinguishedName, &AttributeSet)> {
    let mut ordered: Vec<_> = entries.iter().collect();
    match tag {
        EntryTag::Add => ordered.sort_by_key(|(rdn, _)| rdn.depth()),
        EntryTag::Delete => ordered.sort_by_key(|(rdn, _)| std::cmp::Reverse(rdn.depth())),
        EntryTag::Modify => {}
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsync_connector::memory::{InMemoryStore, OperationKind, StoreOperation};

    fn dn(value: &str) -> DistinguishedName {
        DistinguishedName::parse(value).unwrap()
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new("target", dn("dc=target"))
            .with_entry(dn("ou=Orgs"), AttributeSet::new().with("ou", ["Orgs"]))
    }

    fn base() -> DistinguishedName {
        dn("ou=Orgs,dc=target")
    }

    #[tokio::test]
    async fn test_add_parents_first_with_object_classes() {
        let store = store();
        let mut result = ComparisonResult::new();
        result.insert(
            EntryTag::Add,
            dn("cn=Lead,ou=DS1"),
            AttributeSet::new().with("cn", ["Lead"]).with("description", Vec::<String>::new()),
        );
        result.insert(EntryTag::Add, dn("ou=DS1"), AttributeSet::new().with("ou", ["DS1"]));

        let applier = HierarchyApplier::new(
            &store,
            &base(),
            ApplyOptions::new(vec!["groupOfNames".to_string()]),
        )
        .unwrap();
        let report = applier.apply(&result).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.created, 2);
        let ops = store.mutations().await;
        assert_eq!(ops[0].name(), &dn("ou=DS1,ou=Orgs"));
        match &ops[1] {
            StoreOperation::Create { attributes, .. } => {
                assert!(!attributes.has("description"));
                assert_eq!(attributes.values(OBJECT_CLASS), ["groupOfNames"]);
            }
            other => panic!("unexpected operation {other:?}"),
        }
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_delete_children_first_without_subtree_support() {
        let store = store()
            .with_subtree_delete(false)
            .with_entry(dn("ou=DS1,ou=Orgs"), AttributeSet::new())
            .with_entry(dn("cn=Lead,ou=DS1,ou=Orgs"), AttributeSet::new());
        let mut result = ComparisonResult::new();
        result.insert(EntryTag::Delete, dn("ou=DS1"), AttributeSet::new());
        result.insert(EntryTag::Delete, dn("cn=Lead,ou=DS1"), AttributeSet::new());

        let applier = HierarchyApplier::new(&store, &base(), ApplyOptions::default()).unwrap();
        let report = applier.apply(&result).await.unwrap();

        assert_eq!(report.deleted, 2);
        assert_eq!(
            store.mutations().await,
            vec![
                StoreOperation::Delete { name: dn("cn=Lead,ou=DS1,ou=Orgs"), subtree: false },
                StoreOperation::Delete { name: dn("ou=DS1,ou=Orgs"), subtree: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_aborts_group_only() {
        let store = store().with_entry(dn("cn=old,ou=Orgs"), AttributeSet::new());
        store
            .fail_on(OperationKind::Create, Some(dn("cn=a,ou=Orgs")))
            .await;

        let mut result = ComparisonResult::new();
        result.insert(EntryTag::Add, dn("cn=a"), AttributeSet::new().with("cn", ["a"]));
        result.insert(EntryTag::Add, dn("cn=b"), AttributeSet::new().with("cn", ["b"]));
        result.insert(EntryTag::Delete, dn("cn=old"), AttributeSet::new());

        let applier = HierarchyApplier::new(&store, &base(), ApplyOptions::default()).unwrap();
        let report = applier.apply(&result).await.unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].rdn, dn("cn=a"));
        assert_eq!(report.failures[0].skipped, 1);
        assert!(store.entry(&dn("cn=b,ou=Orgs")).await.is_none());
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_membership_retracted_before_delete() {
        let store = store().with_entry(
            dn("cn=g,ou=Orgs"),
            AttributeSet::new().with("member", ["cn=u1", "cn=u2"]),
        );
        let mut result = ComparisonResult::new();
        result.insert(
            EntryTag::Delete,
            dn("cn=g"),
            AttributeSet::new().with("member", ["cn=u1", "cn=u2"]),
        );

        let options = ApplyOptions::default().with_membership_retraction("member");
        let applier = HierarchyApplier::new(&store, &base(), options).unwrap();
        applier.apply(&result).await.unwrap();

        let ops = store.mutations().await;
        assert!(matches!(ops[0], StoreOperation::Modify { .. }));
        assert!(matches!(ops[1], StoreOperation::Delete { subtree: true, .. }));
    }

    #[tokio::test]
    async fn test_connect_failure_is_error() {
        let store = store();
        store.fail_on(OperationKind::Connect, None).await;
        let mut result = ComparisonResult::new();
        result.insert(EntryTag::Add, dn("cn=a"), AttributeSet::new().with("cn", ["a"]));

        let applier = HierarchyApplier::new(&store, &base(), ApplyOptions::default()).unwrap();
        let err = applier.apply(&result).await.unwrap_err();
        assert!(err.is_connection());
        assert!(store.mutations().await.is_empty());
    }

    #[test]
    fn test_base_outside_root_rejected() {
        let store = store();
        let result = HierarchyApplier::new(&store, &dn("ou=Orgs,dc=other"), ApplyOptions::default());
        assert!(result.is_err());
    }
}
