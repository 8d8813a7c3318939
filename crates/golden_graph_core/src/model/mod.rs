//! Graph domain model: domains, principles and derived edges.
//!
//! # Responsibility
//! - Define canonical data structures used by graph maintenance and layout.
//! - Own write-time validation rules shared by store and service layers.
//!
//! # Invariants
//! - Every entity is identified by a stable random `Uuid`, never reused.
//! - `Principle::domain_ids` is ordered; index 0 is the primary domain.
//! - `Edge` values are derived only; nothing outside edge maintenance builds
//!   them from user input.

pub mod domain;
pub mod edge;
pub mod principle;
pub mod validation;
