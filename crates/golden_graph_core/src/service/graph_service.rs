//! Graph use-case service.
//!
//! # Responsibility
//! - Gate every write on the caller's capability before the store is touched.
//! - Compose store snapshots with a freshly computed layout for reads.
//!
//! # Invariants
//! - Layout is never persisted; every `graph` call recomputes it from the
//!   snapshot it returns.
//! - Consistency checks report; they never repair.

use crate::graph::edge_maintainer::{ConsistencyReport, EdgeDelta};
use crate::graph::layout::{layout, GraphLayout};
use crate::model::domain::{Domain, DomainId};
use crate::model::edge::Edge;
use crate::model::principle::{NewPrinciple, Principle, PrincipleId, PrinciplePatch};
use crate::repo::EntityKind;
use crate::service::access::{AuthorizationError, Caller};
use crate::service::error::{ServiceError, ServiceResult};
use crate::store::graph_store::{
    DomainDeleteMode, DomainRemoval, GraphFilter, GraphStore, PrincipleWrite,
};
use log::warn;
use rusqlite::Connection;
use serde::Serialize;

/// Graph read payload: snapshot plus layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphView {
    pub domains: Vec<Domain>,
    pub principles: Vec<Principle>,
    pub edges: Vec<Edge>,
    pub layout: GraphLayout,
}

/// Result of a principle deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipleRemoval {
    pub principle_id: PrincipleId,
    pub edges_removed: usize,
}

/// Graph service facade over one connection.
pub struct GraphService<'conn> {
    store: GraphStore<'conn>,
}

impl<'conn> GraphService<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            store: GraphStore::new(conn),
        }
    }

    /// Returns the (optionally filtered) graph with its layout.
    pub fn graph(&self, filter: &GraphFilter) -> ServiceResult<GraphView> {
        let snapshot = self.store.snapshot()?.filtered(filter);
        let layout = layout(&snapshot.principles, &snapshot.edges, &snapshot.domains);
        Ok(GraphView {
            domains: snapshot.domains,
            principles: snapshot.principles,
            edges: snapshot.edges,
            layout,
        })
    }

    pub fn list_domains(&self) -> ServiceResult<Vec<Domain>> {
        Ok(self.store.list_domains()?)
    }

    pub fn get_domain(&self, id: DomainId) -> ServiceResult<Domain> {
        self.store
            .get_domain(id)?
            .ok_or(ServiceError::NotFound {
                kind: EntityKind::Domain,
                id,
            })
    }

    /// Principles referencing one domain.
    pub fn domain_principles(&self, id: DomainId) -> ServiceResult<Vec<Principle>> {
        Ok(self.store.domain_usage(id)?)
    }

    pub fn create_domain(&self, caller: &Caller, name: &str) -> ServiceResult<Domain> {
        let identity = authorize(caller.require_write(), "domain_create")?;
        Ok(self.store.create_domain(name, identity)?)
    }

    pub fn rename_domain(&self, caller: &Caller, id: DomainId, name: &str) -> ServiceResult<Domain> {
        authorize(caller.require_write(), "domain_rename")?;
        Ok(self.store.rename_domain(id, name)?)
    }

    /// Deletes a domain. Any writer may do so; ownership is not checked.
    pub fn delete_domain(
        &self,
        caller: &Caller,
        id: DomainId,
        mode: DomainDeleteMode,
    ) -> ServiceResult<DomainRemoval> {
        authorize(caller.require_write(), "domain_delete")?;
        Ok(self.store.delete_domain(id, mode)?)
    }

    pub fn get_principle(&self, id: PrincipleId) -> ServiceResult<Principle> {
        self.store
            .get_principle(id)?
            .ok_or(ServiceError::NotFound {
                kind: EntityKind::Principle,
                id,
            })
    }

    /// Edges incident to one principle, in key order.
    pub fn principle_edges(&self, id: PrincipleId) -> ServiceResult<Vec<Edge>> {
        Ok(self.store.edges_of(id)?)
    }

    pub fn create_principle(
        &self,
        caller: &Caller,
        input: &NewPrinciple,
    ) -> ServiceResult<PrincipleWrite> {
        let identity = authorize(caller.require_write(), "principle_create")?;
        Ok(self.store.create_principle(input, identity)?)
    }

    pub fn update_principle(
        &self,
        caller: &Caller,
        id: PrincipleId,
        patch: &PrinciplePatch,
    ) -> ServiceResult<PrincipleWrite> {
        authorize(caller.require_write(), "principle_update")?;
        Ok(self.store.update_principle(id, patch)?)
    }

    /// Deletes a principle. Only its creator may do so.
    pub fn delete_principle(
        &self,
        caller: &Caller,
        id: PrincipleId,
    ) -> ServiceResult<PrincipleRemoval> {
        authorize(caller.require_write(), "principle_delete")?;
        let edges_removed = self.store.delete_principle_if(id, |principle| {
            authorize(caller.require_owner(principle), "principle_delete").map(drop)
        })?;
        Ok(PrincipleRemoval {
            principle_id: id,
            edges_removed,
        })
    }

    /// Rebuilds every edge from current memberships. Admin only.
    pub fn rebuild_edges(&self, caller: &Caller) -> ServiceResult<EdgeDelta> {
        authorize(caller.require_admin(), "edge_rebuild")?;
        Ok(self.store.rebuild_edges()?)
    }

    /// Reports drift between stored and derived edges. Admin only.
    pub fn check_edges(&self, caller: &Caller) -> ServiceResult<ConsistencyReport> {
        authorize(caller.require_admin(), "edge_check")?;
        Ok(self.store.check_edges()?)
    }

    /// Like `check_edges`, but drift is an error.
    pub fn verify_edges(&self, caller: &Caller) -> ServiceResult<ConsistencyReport> {
        let report = self.check_edges(caller)?;
        if !report.is_consistent() {
            return Err(ServiceError::Consistency(format!(
                "{} edge violation(s): missing={} unexpected={} mismatched={} bad_weight={}; run rebuild-edges",
                report.violation_count(),
                report.missing.len(),
                report.unexpected.len(),
                report.mismatched.len(),
                report.bad_weight.len()
            )));
        }
        Ok(report)
    }
}

fn authorize<T>(result: Result<T, AuthorizationError>, operation: &str) -> ServiceResult<T> {
    result.map_err(|err| {
        warn!(
            "event=authz_denied module=service status=error op={} reason={}",
            operation, err
        );
        ServiceError::Authorization(err)
    })
}
