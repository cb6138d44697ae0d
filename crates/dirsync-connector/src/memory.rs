//! In-memory entry store.
//!
//! A complete [`EntryStore`] backed by a sorted map. It enforces the same
//! structural rules a directory server does (parents must exist, non-leaf
//! entries need a subtree delete, empty attributes are rejected) and records
//! every call, which makes it the backend of choice for tests and dry runs.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::config::DirectoryFeatures;
use crate::dn::DistinguishedName;
use crate::error::{StoreError, StoreResult};
use crate::operation::{
    AttributeDelta, AttributeSet, Entry, PageCookie, SearchPage, SearchRequest,
};
use crate::traits::{EntryStore, Session};

/// Kind of store call, used for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Connect,
    Search,
    Create,
    Modify,
    Delete,
}

/// A recorded store call. Names are relative to the store's root context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    Search { base: DistinguishedName },
    Create { name: DistinguishedName, attributes: AttributeSet },
    Modify { name: DistinguishedName, delta: AttributeDelta },
    Delete { name: DistinguishedName, subtree: bool },
}

impl StoreOperation {
    /// Name the operation acted on.
    pub fn name(&self) -> &DistinguishedName {
        match self {
            StoreOperation::Search { base } => base,
            StoreOperation::Create { name, .. }
            | StoreOperation::Modify { name, .. }
            | StoreOperation::Delete { name, .. } => name,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<DistinguishedName, AttributeSet>,
    sessions: HashSet<Uuid>,
    operations: Vec<StoreOperation>,
    failures: Vec<(OperationKind, Option<DistinguishedName>)>,
}

impl State {
    fn check_failure(&self, kind: OperationKind, name: &DistinguishedName) -> StoreResult<()> {
        let injected = self
            .failures
            .iter()
            .any(|(k, n)| *k == kind && n.as_ref().map_or(true, |n| n == name));
        if injected {
            return Err(StoreError::operation_failed(format!(
                "injected {kind:?} failure for '{name}'"
            )));
        }
        Ok(())
    }

    fn check_session(&self, session: &Session) -> StoreResult<()> {
        if self.sessions.contains(&session.id()) {
            Ok(())
        } else {
            Err(StoreError::SessionClosed {
                session: session.id().to_string(),
            })
        }
    }

    fn has_children(&self, name: &DistinguishedName) -> bool {
        self.entries
            .keys()
            .any(|key| key.depth() > name.depth() && key.ends_with(name))
    }
}

/// Entry store holding its entries in memory.
pub struct InMemoryStore {
    name: String,
    root: DistinguishedName,
    features: DirectoryFeatures,
    subtree_delete: AtomicBool,
    open_sessions: AtomicUsize,
    state: RwLock<State>,
}

impl InMemoryStore {
    /// Create an empty store rooted at `root`.
    pub fn new(name: impl Into<String>, root: DistinguishedName) -> Self {
        Self {
            name: name.into(),
            root,
            features: DirectoryFeatures::default(),
            subtree_delete: AtomicBool::new(true),
            open_sessions: AtomicUsize::new(0),
            state: RwLock::new(State::default()),
        }
    }

    /// Set the directory conventions.
    pub fn with_features(mut self, features: DirectoryFeatures) -> Self {
        self.features = features;
        self
    }

    /// Enable or disable subtree delete support.
    pub fn with_subtree_delete(self, supported: bool) -> Self {
        self.subtree_delete.store(supported, Ordering::SeqCst);
        self
    }

    /// Seed an entry, named relative to the root context.
    pub fn with_entry(mut self, name: DistinguishedName, attributes: AttributeSet) -> Self {
        self.state.get_mut().entries.insert(name, attributes);
        self
    }

    /// Make every call of `kind` fail, or only calls naming `name`.
    pub async fn fail_on(&self, kind: OperationKind, name: Option<DistinguishedName>) {
        self.state.write().await.failures.push((kind, name));
    }

    /// Insert or replace an entry, named relative to the root context.
    pub async fn put_entry(&self, name: DistinguishedName, attributes: AttributeSet) {
        self.state.write().await.entries.insert(name, attributes);
    }

    /// Remove all injected failures.
    pub async fn clear_failures(&self) {
        self.state.write().await.failures.clear();
    }

    /// Snapshot of all entries, named relative to the root context.
    pub async fn entries(&self) -> BTreeMap<DistinguishedName, AttributeSet> {
        self.state.read().await.entries.clone()
    }

    /// One entry, named relative to the root context.
    pub async fn entry(&self, name: &DistinguishedName) -> Option<AttributeSet> {
        self.state.read().await.entries.get(name).cloned()
    }

    /// Recorded calls in execution order.
    pub async fn operations(&self) -> Vec<StoreOperation> {
        self.state.read().await.operations.clone()
    }

    /// Recorded mutating calls in execution order.
    pub async fn mutations(&self) -> Vec<StoreOperation> {
        self.operations()
            .await
            .into_iter()
            .filter(|op| !matches!(op, StoreOperation::Search { .. }))
            .collect()
    }

    /// Forget recorded calls.
    pub async fn clear_operations(&self) {
        self.state.write().await.operations.clear();
    }

    /// Number of sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

fn project(attributes: &AttributeSet, requested: &[String]) -> AttributeSet {
    if requested.is_empty() || requested.iter().any(|a| a == "*") {
        return attributes.clone();
    }
    attributes
        .iter()
        .filter(|(name, _)| requested.iter().any(|r| r.eq_ignore_ascii_case(name)))
        .map(|(name, values)| (name.clone(), values.clone()))
        .collect()
}

fn apply_delta(attributes: &mut AttributeSet, delta: &AttributeDelta) {
    for (name, values) in &delta.replace {
        attributes.set(name.clone(), values.clone());
    }
    for name in &delta.clear {
        attributes.remove(name);
    }
    for (name, values) in &delta.add {
        for value in values {
            if !attributes.values(name).contains(value) {
                attributes.push_value(name.clone(), value.clone());
            }
        }
    }
    for (name, values) in &delta.remove {
        if let Some(mut current) = attributes.remove(name) {
            current.retain(|v| !values.contains(v));
            if !current.is_empty() {
                attributes.set(name.clone(), current);
            }
        }
    }
}

#[async_trait]
impl EntryStore for InMemoryStore {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn root_context(&self) -> &DistinguishedName {
        &self.root
    }

    fn features(&self) -> &DirectoryFeatures {
        &self.features
    }

    async fn connect(&self, base: &DistinguishedName) -> StoreResult<Session> {
        let mut state = self.state.write().await;
        if state
            .failures
            .iter()
            .any(|(kind, _)| *kind == OperationKind::Connect)
        {
            return Err(StoreError::connection_failed(format!(
                "injected connect failure for '{}'",
                self.name
            )));
        }
        let session = Session::new(base.clone());
        state.sessions.insert(session.id());
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        debug!(store = %self.name, session = %session.id(), "Session opened");
        Ok(session)
    }

    async fn disconnect(&self, session: Session) {
        let mut state = self.state.write().await;
        if state.sessions.remove(&session.id()) {
            self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
        debug!(store = %self.name, session = %session.id(), "Session closed");
    }

    async fn search(
        &self,
        session: &mut Session,
        request: &SearchRequest,
        cookie: Option<PageCookie>,
    ) -> StoreResult<SearchPage> {
        let mut state = self.state.write().await;
        state.check_session(session)?;
        let base = request.base.join(session.base());
        state.check_failure(OperationKind::Search, &base)?;

        if !base.is_root() && !state.entries.contains_key(&base) {
            return Err(StoreError::ObjectNotFound {
                identifier: base.to_string(),
            });
        }
        if cookie.is_none() {
            state.operations.push(StoreOperation::Search { base: base.clone() });
        }

        let offset = cookie
            .and_then(|c| c.0.try_into().ok().map(u64::from_be_bytes))
            .unwrap_or(0) as usize;
        let page_size = request.page_size.max(1) as usize;

        let mut matching: Vec<(&DistinguishedName, &AttributeSet)> = state
            .entries
            .iter()
            .filter(|(name, attrs)| name.ends_with(&base) && request.filter.matches(attrs))
            .collect();
        matching.sort_by(|a, b| a.0.depth().cmp(&b.0.depth()).then_with(|| a.0.cmp(b.0)));

        let entries = matching
            .iter()
            .skip(offset)
            .take(page_size)
            .filter_map(|(name, attrs)| {
                name.strip_suffix(session.base())
                    .map(|relative| Entry::new(relative, project(attrs, &request.attributes)))
            })
            .collect();

        let next_offset = offset + page_size;
        let next = (next_offset < matching.len())
            .then(|| PageCookie((next_offset as u64).to_be_bytes().to_vec()));

        Ok(SearchPage { entries, next })
    }

    async fn create(
        &self,
        session: &mut Session,
        name: &DistinguishedName,
        attributes: &AttributeSet,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.check_session(session)?;
        let full = name.join(session.base());
        state.check_failure(OperationKind::Create, &full)?;

        if state.entries.contains_key(&full) {
            return Err(StoreError::ObjectAlreadyExists {
                identifier: full.to_string(),
            });
        }
        let parent = full.parent();
        if !parent.is_root() && !state.entries.contains_key(&parent) {
            return Err(StoreError::ObjectNotFound {
                identifier: parent.to_string(),
            });
        }
        if let Some((empty, _)) = attributes.iter().find(|(_, values)| values.is_empty()) {
            return Err(StoreError::operation_failed(format!(
                "attribute '{empty}' of '{full}' has no values"
            )));
        }

        state.operations.push(StoreOperation::Create {
            name: full.clone(),
            attributes: attributes.clone(),
        });
        state.entries.insert(full, attributes.clone());
        Ok(())
    }

    async fn modify(
        &self,
        session: &mut Session,
        name: &DistinguishedName,
        delta: &AttributeDelta,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.check_session(session)?;
        let full = name.join(session.base());
        state.check_failure(OperationKind::Modify, &full)?;

        state.operations.push(StoreOperation::Modify {
            name: full.clone(),
            delta: delta.clone(),
        });
        let attributes = state
            .entries
            .get_mut(&full)
            .ok_or_else(|| StoreError::ObjectNotFound {
                identifier: full.to_string(),
            })?;
        apply_delta(attributes, delta);
        Ok(())
    }

    async fn delete(
        &self,
        session: &mut Session,
        name: &DistinguishedName,
        subtree: bool,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.check_session(session)?;
        let full = name.join(session.base());
        state.check_failure(OperationKind::Delete, &full)?;

        if !state.entries.contains_key(&full) {
            return Err(StoreError::ObjectNotFound {
                identifier: full.to_string(),
            });
        }
        if subtree && !self.subtree_delete.load(Ordering::SeqCst) {
            return Err(StoreError::operation_failed("subtree delete is not supported"));
        }
        if !subtree && state.has_children(&full) {
            return Err(StoreError::NotAllowedOnNonLeaf {
                identifier: full.to_string(),
            });
        }

        state.operations.push(StoreOperation::Delete {
            name: full.clone(),
            subtree,
        });
        state.entries.retain(|key, _| !key.ends_with(&full));
        Ok(())
    }

    async fn supports_subtree_delete(&self, session: &mut Session) -> StoreResult<bool> {
        self.state.read().await.check_session(session)?;
        Ok(self.subtree_delete.load(Ordering::SeqCst))
    }
}
