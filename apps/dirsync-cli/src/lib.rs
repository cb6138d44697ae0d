//! dirsync command-line host
//!
//! Loads a job file, builds the LDAP stores it names and drives the
//! housekeeping job. The binary in `main.rs` is a thin wrapper over these
//! modules.

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
