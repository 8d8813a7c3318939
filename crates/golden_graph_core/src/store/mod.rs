//! Transactional graph store.
//!
//! # Responsibility
//! - Own the unit of work for every graph write: validate, persist, then run
//!   edge maintenance inside the same SQLite transaction.
//! - Serve consistent snapshots of domains, principles and edges.
//!
//! # Invariants
//! - Writes use `IMMEDIATE` transactions (one writer at a time).
//! - Full edge rebuild uses an `EXCLUSIVE` transaction.
//! - Validation failures are raised before the first mutating statement.

pub mod graph_store;
