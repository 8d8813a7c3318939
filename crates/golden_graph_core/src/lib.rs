//! Core graph logic for Golden Graph.
//! This crate is the single source of truth for graph invariants: edges are
//! derived from shared domains and maintained transactionally.

pub mod db;
pub mod graph;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use graph::edge_maintainer::{derive_edges, ConsistencyReport, EdgeDelta, EdgeMaintainer};
pub use graph::layout::{layout, GraphLayout};
pub use graph::tag_index::TagIndex;
pub use logging::{
    default_log_level, init_logging, init_stderr_logging, logging_status, LogTarget,
};
pub use model::domain::{Domain, DomainId};
pub use model::edge::{Edge, EdgeKey};
pub use model::principle::{NewPrinciple, Principle, PrincipleId, PrinciplePatch};
pub use model::validation::ModelValidationError;
pub use repo::{RepoError, RepoResult};
pub use service::access::{parse_role, AuthorizationError, Caller, Role};
pub use service::error::{ErrorKind, ServiceError, ServiceResult};
pub use service::graph_service::{GraphService, GraphView, PrincipleRemoval};
pub use store::graph_store::{
    DomainDeleteMode, DomainRemoval, GraphFilter, GraphSnapshot, GraphStore, PrincipleWrite,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
