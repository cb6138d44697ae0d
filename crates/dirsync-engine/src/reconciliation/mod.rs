//! # Reconciliation
//!
//! Building blocks of a one-way directory reconciliation.
//!
//! ## Overview
//!
//! - Paged retrieval of a subtree, re-keyed relative to its search base
//! - Comparison of source and target trees into ADD, MODIFY and DELETE groups
//! - Hierarchy-aware application of those groups to the target
//! - Per-run statistics
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐                         ┌──────────────┐
//! │    Source    │                         │    Target    │
//! │  EntryStore  │                         │  EntryStore  │
//! └──────┬───────┘                         └──────┬───────┘
//!        │ EntryRetriever                          │ EntryRetriever
//!        ▼                                         ▼
//! ┌──────────────┐      ┌──────────────┐   ┌──────────────┐
//! │ source tree  │─────►│  TreeDiffer  │◄──│ target tree  │
//! └──────────────┘      └──────┬───────┘   └──────────────┘
//!                              │ ComparisonResult
//!                              ▼
//!                      ┌──────────────────┐
//!                      │ HierarchyApplier │──► target
//!                      └──────────────────┘
//! ```

pub mod applier;
pub mod differ;
pub mod retrieval;
pub mod statistics;

pub use applier::{ApplyFailure, ApplyOptions, ApplyReport, HierarchyApplier};
pub use differ::{ComparisonResult, DroppedEntry, EntryTag, TreeDiffer};
pub use retrieval::{EntryRetriever, RetrievalQuery};
pub use statistics::RunStatistics;
