//! # LDAP Entry Store
//!
//! LDAP/Active Directory backend for dirsync reconciliation.
//!
//! ## Features
//!
//! - LDAP v3 protocol support
//! - SSL/TLS and STARTTLS
//! - Paged search results (RFC 2696)
//! - Subtree delete through the tree delete control when the server lists it
//!
//! ## Example
//!
//! ```ignore
//! use dirsync_connector_ldap::{LdapConfig, LdapStore};
//!
//! let config = LdapConfig::new(
//!     "ldap.example.com",
//!     "dc=example,dc=com",
//!     "cn=admin,dc=example,dc=com",
//! )
//! .with_password("secret")
//! .with_ssl();
//!
//! let store = LdapStore::new("target", config)?;
//! ```

pub mod config;
pub mod store;

// Re-exports
pub use config::LdapConfig;
pub use store::LdapStore;
