//! Entry retrieval.
//!
//! Reads a subtree page by page and re-keys the entries relative to the
//! search base.

use tracing::{debug, instrument, warn};

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::operation::{EntryMap, Filter, SearchRequest, OBJECT_CLASS};
use dirsync_connector::traits::{EntryStore, Session};

use crate::error::{SyncError, SyncResult};

/// What to read from one subtree.
#[derive(Debug, Clone, Default)]
pub struct RetrievalQuery {
    /// Object classes to match; empty matches every entry.
    pub object_classes: Vec<String>,
    /// Attributes to return; empty returns all user attributes.
    pub attributes: Vec<String>,
    /// Suffixes, relative to the search base, of subtrees to leave out.
    pub exclusions: Vec<DistinguishedName>,
}

/// Reads entries from one store.
pub struct EntryRetriever<'a> {
    store: &'a dyn EntryStore,
    batch_size: u32,
}

impl<'a> EntryRetriever<'a> {
    pub fn new(store: &'a dyn EntryStore, batch_size: u32) -> Self {
        Self { store, batch_size }
    }

    /// Read every entry below the full name `base`.
    ///
    /// The base entry itself and excluded subtrees are left out. Object class
    /// values are not returned: they are schema-controlled and stamped on
    /// create.
    #[instrument(skip(self, query), fields(store = %self.store.display_name(), base = %base))]
    pub async fn retrieve(
        &self,
        base: &DistinguishedName,
        query: &RetrievalQuery,
    ) -> SyncResult<EntryMap> {
        let relative = base.strip_suffix(self.store.root_context()).ok_or_else(|| {
            SyncError::configuration(format!(
                "search base '{base}' is not under root context '{}' of {}",
                self.store.root_context(),
                self.store.display_name()
            ))
        })?;

        let mut session = self.store.connect(&DistinguishedName::root()).await?;
        let result = self.collect(&mut session, &relative, query).await;
        self.store.disconnect(session).await;

        let entries = result?;
        debug!(entries = entries.len(), "Retrieved entries");
        Ok(entries)
    }

    async fn collect(
        &self,
        session: &mut Session,
        base: &DistinguishedName,
        query: &RetrievalQuery,
    ) -> SyncResult<EntryMap> {
        let request = SearchRequest::new(base.clone(), self.batch_size)
            .with_filter(Filter::object_classes(&query.object_classes))
            .with_attributes(query.attributes.clone());

        let mut entries = EntryMap::new();
        let mut cookie = None;
        loop {
            let page = self.store.search(session, &request, cookie).await?;
            for entry in page.entries {
                let Some(rdn) = entry.name.strip_suffix(base) else {
                    warn!(name = %entry.name, "Entry outside search base skipped");
                    continue;
                };
                if rdn.is_root() {
                    continue;
                }
                if query.exclusions.iter().any(|suffix| rdn.ends_with(suffix)) {
                    continue;
                }
                if entries.contains_key(&rdn) {
                    warn!(rdn = %rdn, "Duplicate entry name, keeping first occurrence");
                    continue;
                }
                let mut attributes = entry.attributes;
                attributes.retain(|name, _| !name.eq_ignore_ascii_case(OBJECT_CLASS));
                entries.insert(rdn, attributes);
            }
            match page.next {
                Some(next) => cookie = Some(next),
                None => break,
            }
        }
        Ok(entries)
    }
}

/// `name` relative to `base`, if it lies strictly below it.
pub fn relative_to(name: &DistinguishedName, base: &DistinguishedName) -> Option<DistinguishedName> {
    name.strip_suffix(base).filter(|rdn| !rdn.is_root())
}
