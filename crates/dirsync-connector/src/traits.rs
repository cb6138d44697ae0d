//! Entry store trait
//!
//! The contract every directory backend implements. A store hands out
//! [`Session`]s bound to a base context; every name passed to an operation is
//! relative to that base.

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::DirectoryFeatures;
use crate::dn::DistinguishedName;
use crate::error::StoreResult;
use crate::operation::{AttributeDelta, AttributeSet, PageCookie, SearchPage, SearchRequest};

/// Handle to an open connection, bound to a base context.
///
/// Sessions are not `Clone`: [`EntryStore::disconnect`] consumes the handle.
#[derive(Debug, PartialEq, Eq)]
pub struct Session {
    id: Uuid,
    base: DistinguishedName,
}

impl Session {
    /// Create a session handle. Intended for store implementations.
    pub fn new(base: DistinguishedName) -> Self {
        Self {
            id: Uuid::new_v4(),
            base,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Base context, relative to the store's root context.
    pub fn base(&self) -> &DistinguishedName {
        &self.base
    }
}

/// A hierarchical directory that entries can be read from and written to.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Human-readable name for logs and reports.
    fn display_name(&self) -> &str;

    /// Full name of the store's root context (e.g. `dc=example,dc=com`).
    fn root_context(&self) -> &DistinguishedName;

    /// Naming and schema conventions of this directory.
    fn features(&self) -> &DirectoryFeatures;

    /// Open a session bound to `base` (relative to the root context).
    async fn connect(&self, base: &DistinguishedName) -> StoreResult<Session>;

    /// Release a session. Failures are logged by the store, never surfaced.
    async fn disconnect(&self, session: Session);

    /// Fetch one page of a subtree search. Pass the previous page's cookie to
    /// continue; `None` starts a new search.
    async fn search(
        &self,
        session: &mut Session,
        request: &SearchRequest,
        cookie: Option<PageCookie>,
    ) -> StoreResult<SearchPage>;

    /// Create an entry.
    async fn create(
        &self,
        session: &mut Session,
        name: &DistinguishedName,
        attributes: &AttributeSet,
    ) -> StoreResult<()>;

    /// Modify an entry.
    async fn modify(
        &self,
        session: &mut Session,
        name: &DistinguishedName,
        delta: &AttributeDelta,
    ) -> StoreResult<()>;

    /// Delete an entry, or the entry and all descendants when `subtree` is set.
    async fn delete(
        &self,
        session: &mut Session,
        name: &DistinguishedName,
        subtree: bool,
    ) -> StoreResult<()>;

    /// Whether the directory removes whole subtrees in one call.
    async fn supports_subtree_delete(&self, session: &mut Session) -> StoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_are_distinct() {
        let a = Session::new(DistinguishedName::root());
        let b = Session::new(DistinguishedName::root());
        assert_ne!(a.id(), b.id());
        assert!(a.base().is_root());
    }
}
