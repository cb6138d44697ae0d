//! LDAP entry store implementation
//!
//! Implements the EntryStore trait for LDAP/Active Directory on top of `ldap3`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use ldap3::controls::{Control, ControlType, PagedResults, RawControl};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, ResultEntry, Scope, SearchEntry};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use dirsync_connector::config::{DirectoryFeatures, StoreConfig};
use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::error::{StoreError, StoreResult};
use dirsync_connector::operation::{
    AttributeDelta, AttributeSet, Entry, Filter, PageCookie, SearchPage, SearchRequest,
};
use dirsync_connector::traits::{EntryStore, Session};

use crate::config::LdapConfig;

/// OID of the tree delete control (draft-armijo-ldap-treedelete).
pub const TREE_DELETE_OID: &str = "1.2.840.113556.1.4.805";

/// OID of the simple paged results control (RFC 2696).
pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";

// LDAP result codes (RFC 4511)
const RC_SUCCESS: u32 = 0;
const RC_TIME_LIMIT_EXCEEDED: u32 = 3;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_DN_SYNTAX: u32 = 34;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_NOT_ALLOWED_ON_NON_LEAF: u32 = 66;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

/// Entry store backed by an LDAP server.
pub struct LdapStore {
    /// Configuration.
    config: LdapConfig,

    /// Display name for this store instance.
    display_name: String,

    /// Parsed root context.
    root: DistinguishedName,

    /// Open connections by session.
    sessions: RwLock<HashMap<Uuid, Ldap>>,

    /// Cached root DSE lookup for the tree delete control.
    subtree_delete: RwLock<Option<bool>>,
}

impl LdapStore {
    /// Create a new LDAP store with the given configuration.
    pub fn new(name: impl Into<String>, config: LdapConfig) -> StoreResult<Self> {
        config.validate()?;
        config.validate_security();
        let root = config.root_context()?;

        Ok(Self {
            display_name: name.into(),
            config,
            root,
            sessions: RwLock::new(HashMap::new()),
            subtree_delete: RwLock::new(None),
        })
    }

    /// Configuration of this store.
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    /// Create a new bound LDAP connection.
    async fn create_connection(&self) -> StoreResult<Ldap> {
        let url = self.config.url();

        debug!(url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.connection.connection_timeout())
            .set_starttls(self.config.use_starttls)
            .set_no_tls_verify(!self.config.verify_certificate);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| {
                StoreError::connection_failed_with_source(
                    format!("Failed to connect to LDAP server at {url}"),
                    e,
                )
            })?;

        // Spawn the connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_dn = &self.config.bind_dn;
        let bind_password = self.config.bind_password.as_deref().unwrap_or("");

        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = ldap
            .simple_bind(bind_dn, bind_password)
            .await
            .map_err(|e| {
                StoreError::connection_failed_with_source(
                    format!("LDAP bind failed for {bind_dn}"),
                    e,
                )
            })?;

        if result.rc != RC_SUCCESS {
            if result.rc == RC_INVALID_CREDENTIALS {
                return Err(StoreError::AuthenticationFailed);
            }
            return Err(StoreError::connection_failed(format!(
                "LDAP bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(host = %self.config.host, "LDAP connection established");

        Ok(ldap)
    }

    /// Connection handle of an open session, with the operation timeout set.
    async fn handle(&self, session: &Session) -> StoreResult<Ldap> {
        let sessions = self.sessions.read().await;
        let mut ldap = sessions
            .get(&session.id())
            .cloned()
            .ok_or_else(|| StoreError::SessionClosed {
                session: session.id().to_string(),
            })?;
        ldap.with_timeout(self.config.connection.operation_timeout());
        Ok(ldap)
    }

    /// Full DN string of a name relative to the session's base.
    fn full_dn(&self, session: &Session, name: &DistinguishedName) -> String {
        name.join(session.base()).join(&self.root).to_string()
    }

    /// Convert our Filter to an LDAP filter string (RFC 4515).
    pub fn filter_to_ldap(filter: &Filter) -> String {
        match filter {
            Filter::And { filters } => {
                let inner: Vec<String> = filters.iter().map(Self::filter_to_ldap).collect();
                format!("(&{})", inner.join(""))
            }
            Filter::Or { filters } => {
                let inner: Vec<String> = filters.iter().map(Self::filter_to_ldap).collect();
                format!("(|{})", inner.join(""))
            }
            Filter::Not { filter } => {
                format!("(!{})", Self::filter_to_ldap(filter))
            }
            Filter::Equals { attribute, value } => {
                format!("({}={})", attribute, Self::escape_ldap_value(value))
            }
            Filter::Present { attribute } => {
                format!("({attribute}=*)")
            }
        }
    }

    /// Escape special characters in LDAP filter values (RFC 4515).
    fn escape_ldap_value(value: &str) -> String {
        value
            .replace('\\', "\\5c")
            .replace('*', "\\2a")
            .replace('(', "\\28")
            .replace(')', "\\29")
            .replace('\0', "\\00")
    }

    /// Convert a search entry to attributes, ordered like the request.
    ///
    /// Binary values are base64 encoded.
    fn entry_to_attribute_set(entry: SearchEntry, requested: &[String]) -> AttributeSet {
        let mut attrs: Vec<(String, Vec<String>)> = entry.attrs.into_iter().collect();
        for (name, values) in entry.bin_attrs {
            let encoded = values
                .iter()
                .map(|v| base64::Engine::encode(&base64::engine::general_purpose::STANDARD, v))
                .collect();
            attrs.push((name, encoded));
        }

        let rank = |name: &str| {
            requested
                .iter()
                .position(|r| r.eq_ignore_ascii_case(name))
                .unwrap_or(usize::MAX)
        };
        attrs.sort_by(|(a, _), (b, _)| rank(a).cmp(&rank(b)).then_with(|| a.cmp(b)));
        attrs.into_iter().collect()
    }

    /// Paged results continuation from a search response.
    fn next_cookie(result: &LdapResult) -> Option<PageCookie> {
        result.ctrls.iter().find_map(|ctrl| match ctrl {
            Control(Some(ControlType::PagedResults), raw) => {
                let paged: PagedResults = raw.parse();
                (!paged.cookie.is_empty()).then(|| PageCookie(paged.cookie))
            }
            _ => None,
        })
    }

    /// Map a non-success LDAP result to a store error.
    fn result_error(result: &LdapResult, operation: &str, dn: &str) -> StoreError {
        match result.rc {
            RC_NO_SUCH_OBJECT => StoreError::ObjectNotFound {
                identifier: dn.to_string(),
            },
            RC_ENTRY_ALREADY_EXISTS => StoreError::ObjectAlreadyExists {
                identifier: dn.to_string(),
            },
            RC_NOT_ALLOWED_ON_NON_LEAF => StoreError::NotAllowedOnNonLeaf {
                identifier: dn.to_string(),
            },
            RC_INVALID_DN_SYNTAX => StoreError::invalid_name(dn, result.text.clone()),
            RC_INVALID_CREDENTIALS => StoreError::AuthenticationFailed,
            RC_TIME_LIMIT_EXCEEDED => StoreError::Timeout { timeout_secs: 0 },
            rc => StoreError::operation_failed(format!(
                "LDAP {operation} of '{dn}' failed with code {rc}: {}",
                result.text
            )),
        }
    }

    fn check(result: LdapResult, operation: &str, dn: &str) -> StoreResult<()> {
        if result.rc == RC_SUCCESS {
            Ok(())
        } else {
            Err(Self::result_error(&result, operation, dn))
        }
    }

    /// Names of entries below the session base; malformed names are skipped.
    fn to_entries(
        &self,
        session: &Session,
        raw: Vec<ResultEntry>,
        requested: &[String],
    ) -> Vec<Entry> {
        let base = session.base().join(&self.root);
        raw.into_iter()
            .map(SearchEntry::construct)
            .filter_map(|entry| {
                let name = match DistinguishedName::parse(&entry.dn) {
                    Ok(name) => name,
                    Err(e) => {
                        warn!(dn = %entry.dn, error = %e, "Skipping entry with malformed name");
                        return None;
                    }
                };
                let Some(relative) = name.strip_suffix(&base) else {
                    warn!(dn = %entry.dn, base = %base, "Skipping entry outside session base");
                    return None;
                };
                Some(Entry::new(
                    relative,
                    Self::entry_to_attribute_set(entry, requested),
                ))
            })
            .collect()
    }
}

#[async_trait]
impl EntryStore for LdapStore {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn root_context(&self) -> &DistinguishedName {
        &self.root
    }

    fn features(&self) -> &DirectoryFeatures {
        &self.config.features
    }

    #[instrument(skip(self), fields(store = %self.display_name))]
    async fn connect(&self, base: &DistinguishedName) -> StoreResult<Session> {
        let ldap = self.create_connection().await?;
        let session = Session::new(base.clone());
        self.sessions.write().await.insert(session.id(), ldap);
        debug!(session = %session.id(), "Session opened");
        Ok(session)
    }

    #[instrument(skip(self, session), fields(store = %self.display_name, session = %session.id()))]
    async fn disconnect(&self, session: Session) {
        let removed = self.sessions.write().await.remove(&session.id());
        if let Some(mut ldap) = removed {
            if let Err(e) = ldap.unbind().await {
                warn!(error = %e, "LDAP unbind failed");
            }
        }
        debug!("Session closed");
    }

    #[instrument(skip(self, session, request, cookie), fields(store = %self.display_name, base = %request.base))]
    async fn search(
        &self,
        session: &mut Session,
        request: &SearchRequest,
        cookie: Option<PageCookie>,
    ) -> StoreResult<SearchPage> {
        let mut ldap = self.handle(session).await?;
        let base = self.full_dn(session, &request.base);
        let ldap_filter = Self::filter_to_ldap(&request.filter);
        let attrs: Vec<&str> = if request.attributes.is_empty() {
            vec!["*"]
        } else {
            request.attributes.iter().map(String::as_str).collect()
        };

        debug!(filter = %ldap_filter, base_dn = %base, "Searching LDAP");

        let paged = PagedResults {
            size: i32::try_from(request.page_size).unwrap_or(i32::MAX),
            cookie: cookie.map(|c| c.0).unwrap_or_default(),
        };
        let result = ldap
            .with_controls(paged)
            .search(&base, Scope::Subtree, &ldap_filter, attrs)
            .await
            .map_err(|e| StoreError::operation_failed_with_source("LDAP search failed", e))?;

        let ldap3::SearchResult(raw, status) = result;
        let next = Self::next_cookie(&status);
        Self::check(status, "search", &base)?;

        let entries = self.to_entries(session, raw, &request.attributes);
        debug!(returned = entries.len(), more = next.is_some(), "LDAP search page");

        Ok(SearchPage { entries, next })
    }

    #[instrument(skip(self, session, attributes), fields(store = %self.display_name))]
    async fn create(
        &self,
        session: &mut Session,
        name: &DistinguishedName,
        attributes: &AttributeSet,
    ) -> StoreResult<()> {
        let mut ldap = self.handle(session).await?;
        let dn = self.full_dn(session, name);

        debug!(dn = %dn, "Creating LDAP entry");

        let ldap_attrs: Vec<(&str, HashSet<&str>)> = attributes
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(k, v)| (k.as_str(), v.iter().map(String::as_str).collect()))
            .collect();

        let result = ldap.add(&dn, ldap_attrs).await.map_err(|e| {
            StoreError::operation_failed_with_source(format!("Failed to create entry: {dn}"), e)
        })?;
        Self::check(result, "add", &dn)?;

        info!(dn = %dn, "LDAP entry created");
        Ok(())
    }

    #[instrument(skip(self, session, delta), fields(store = %self.display_name))]
    async fn modify(
        &self,
        session: &mut Session,
        name: &DistinguishedName,
        delta: &AttributeDelta,
    ) -> StoreResult<()> {
        let mut ldap = self.handle(session).await?;
        let dn = self.full_dn(session, name);

        debug!(dn = %dn, attributes = ?delta.affected_attributes(), "Updating LDAP entry");

        let mut mods: Vec<ldap3::Mod<&str>> = Vec::new();
        for (name, values) in &delta.replace {
            mods.push(ldap3::Mod::Replace(
                name.as_str(),
                values.iter().map(String::as_str).collect(),
            ));
        }
        for (name, values) in &delta.add {
            mods.push(ldap3::Mod::Add(
                name.as_str(),
                values.iter().map(String::as_str).collect(),
            ));
        }
        for (name, values) in &delta.remove {
            mods.push(ldap3::Mod::Delete(
                name.as_str(),
                values.iter().map(String::as_str).collect(),
            ));
        }
        for name in &delta.clear {
            // Replace with no values removes the attribute without failing
            // when it is already absent.
            mods.push(ldap3::Mod::Replace(name.as_str(), HashSet::new()));
        }

        if mods.is_empty() {
            return Ok(());
        }

        let result = ldap.modify(&dn, mods).await.map_err(|e| {
            StoreError::operation_failed_with_source(format!("Failed to update entry: {dn}"), e)
        })?;
        Self::check(result, "modify", &dn)?;

        info!(dn = %dn, "LDAP entry updated");
        Ok(())
    }

    #[instrument(skip(self, session), fields(store = %self.display_name))]
    async fn delete(
        &self,
        session: &mut Session,
        name: &DistinguishedName,
        subtree: bool,
    ) -> StoreResult<()> {
        let mut ldap = self.handle(session).await?;
        let dn = self.full_dn(session, name);

        debug!(dn = %dn, subtree, "Deleting LDAP entry");

        let result = if subtree {
            let tree_delete = RawControl {
                ctype: TREE_DELETE_OID.to_string(),
                crit: true,
                val: None,
            };
            ldap.with_controls(tree_delete).delete(&dn).await
        } else {
            ldap.delete(&dn).await
        }
        .map_err(|e| {
            StoreError::operation_failed_with_source(format!("Failed to delete entry: {dn}"), e)
        })?;
        Self::check(result, "delete", &dn)?;

        info!(dn = %dn, "LDAP entry deleted");
        Ok(())
    }

    async fn supports_subtree_delete(&self, session: &mut Session) -> StoreResult<bool> {
        if let Some(cached) = *self.subtree_delete.read().await {
            return Ok(cached);
        }

        let mut ldap = self.handle(session).await?;
        let result = ldap
            .search("", Scope::Base, "(objectClass=*)", vec!["supportedControl"])
            .await
            .map_err(|e| StoreError::operation_failed_with_source("Root DSE lookup failed", e))?;
        let ldap3::SearchResult(raw, status) = result;
        Self::check(status, "search", "")?;

        let supported = raw.into_iter().map(SearchEntry::construct).any(|entry| {
            entry
                .attrs
                .iter()
                .filter(|(name, _)| name.eq_ignore_ascii_case("supportedControl"))
                .flat_map(|(_, values)| values.iter())
                .any(|oid| oid == TREE_DELETE_OID)
        });

        debug!(store = %self.display_name, supported, "Tree delete control support");
        *self.subtree_delete.write().await = Some(supported);
        Ok(supported)
    }
}

impl std::fmt::Debug for LdapStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapStore")
            .field("display_name", &self.display_name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Object class filter string for a set of classes, as sent to the server.
pub fn object_class_filter<S: AsRef<str>>(classes: &[S]) -> String {
    LdapStore::filter_to_ldap(&Filter::object_classes(classes))
}
