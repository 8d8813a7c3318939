//! Graph derivation: shared-domain index, edge maintenance and layout.
//!
//! # Responsibility
//! - Derive the edge set from principle domain memberships, incrementally
//!   (`EdgeMaintainer::recompute_for`) or from scratch (`rebuild_all`).
//! - Map a graph snapshot to renderer-agnostic coordinates (`layout`).
//!
//! # Invariants
//! - `derive_edges` is the ground truth: incremental maintenance must leave
//!   the stored edge set equal to it.
//! - Layout is pure and never persisted.

pub mod edge_maintainer;
pub mod layout;
pub mod tag_index;
