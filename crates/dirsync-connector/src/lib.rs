//! # Directory Entry Stores
//!
//! Core abstractions for reading and writing hierarchical directory trees.
//!
//! The reconciliation engine talks to directories only through the
//! [`EntryStore`](traits::EntryStore) trait defined here. Backends (LDAP, the
//! in-memory store) implement it; the engine never sees wire protocols.
//!
//! ## Architecture
//!
//! - [`EntryStore`](traits::EntryStore) - connect/disconnect, paged search,
//!   create, modify, delete (optionally whole subtrees)
//! - [`DistinguishedName`](dn::DistinguishedName) - parsed hierarchical names
//!   with escape-aware component handling
//! - [`AttributeSet`](operation::AttributeSet) - ordered multi-valued attributes
//!
//! ## Example
//!
//! ```ignore
//! use dirsync_connector::prelude::*;
//!
//! let store = InMemoryStore::new("target", DistinguishedName::parse("dc=example,dc=com")?);
//!
//! let mut session = store.connect(&DistinguishedName::root()).await?;
//! let request = SearchRequest::new(DistinguishedName::parse("ou=Orgs")?, 1000)
//!     .with_filter(Filter::object_classes(&["groupOfNames"]));
//! let page = store.search(&mut session, &request, None).await;
//! store.disconnect(session).await;
//! ```
//!
//! ## Crate Organization
//!
//! - [`dn`] - Parsed distinguished names
//! - [`error`] - Error types with transient/permanent classification
//! - [`traits`] - The entry store contract and sessions
//! - [`operation`] - Attribute sets, entries, deltas, filters, paging
//! - [`config`] - Configuration types and directory conventions
//! - [`memory`] - In-memory store

pub mod config;
pub mod dn;
pub mod error;
pub mod memory;
pub mod operation;
pub mod traits;

/// Prelude module for convenient imports.
///
/// ```
/// use dirsync_connector::prelude::*;
/// ```
pub mod prelude {
    // Error handling
    pub use crate::error::{StoreError, StoreResult};

    // Names
    pub use crate::dn::{DistinguishedName, RdnComponent};

    // Traits
    pub use crate::traits::{EntryStore, Session};

    // Operations
    pub use crate::operation::{
        AttributeDelta, AttributeSet, Entry, EntryMap, Filter, PageCookie, SearchPage,
        SearchRequest, OBJECT_CLASS,
    };

    // Configuration
    pub use crate::config::{ConnectionSettings, DirectoryFeatures, StoreConfig};

    // In-memory backend
    pub use crate::memory::{InMemoryStore, OperationKind, StoreOperation};
}

// Re-export async_trait for store implementors
pub use async_trait::async_trait;
