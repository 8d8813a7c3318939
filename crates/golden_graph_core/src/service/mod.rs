//! Graph use-case services.
//!
//! # Responsibility
//! - Check caller capability, then orchestrate store and layout calls into
//!   transport-agnostic use-case APIs.
//! - Map storage failures onto the service error taxonomy.

pub mod access;
pub mod error;
pub mod graph_service;
