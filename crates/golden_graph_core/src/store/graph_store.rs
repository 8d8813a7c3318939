//! SQLite graph store over one connection.
//!
//! # Invariants
//! - A principle write and its edge delta commit together or not at all; a
//!   dropped transaction rolls both back.
//! - `update_principle` recomputes edges only when `domain_ids` is present
//!   and differs from the stored list.
//! - Snapshot reads run in one read transaction so the three collections
//!   come from the same committed state.

use crate::graph::edge_maintainer::{
    compare_edges, derive_edges, ConsistencyReport, EdgeDelta, EdgeMaintainer,
};
use crate::model::domain::{normalize_domain_name, Domain, DomainId};
use crate::model::edge::Edge;
use crate::model::principle::{
    new_principle_id, normalize_principle_text, normalize_reference, validate_domain_ids,
    NewPrinciple, Principle, PrincipleId, PrinciplePatch,
};
use crate::model::validation::ModelValidationError;
use crate::repo::domain_repo::{DomainRepository, SqliteDomainRepository};
use crate::repo::edge_repo::{EdgeRepository, SqliteEdgeRepository};
use crate::repo::principle_repo::{PrincipleRepository, SqlitePrincipleRepository};
use crate::repo::{EntityKind, RepoError, RepoResult};
use log::{error, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

/// How a referenced domain is handled on deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainDeleteMode {
    /// Reject deletion while any principle references the domain.
    Restrict,
    /// Detach the domain from every principle first, recomputing their edges.
    Cascade,
}

/// Result of a principle create or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipleWrite {
    pub principle: Principle,
    pub edges: EdgeDelta,
}

/// Result of a domain deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRemoval {
    pub domain_id: DomainId,
    /// Principles the domain was detached from (cascade only).
    pub detached_principle_ids: Vec<PrincipleId>,
    pub edges: EdgeDelta,
}

/// One consistent read of the whole graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    /// Name order.
    pub domains: Vec<Domain>,
    /// Newest first.
    pub principles: Vec<Principle>,
    /// Key order.
    pub edges: Vec<Edge>,
}

/// Principle visibility filter for graph reads.
///
/// Empty filter keeps everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphFilter {
    /// Keep principles carrying any of these domains.
    pub domain_ids: Vec<DomainId>,
    /// Keep principles whose text contains this, case-insensitively.
    pub text: Option<String>,
}

impl GraphFilter {
    pub fn is_empty(&self) -> bool {
        self.domain_ids.is_empty() && self.text_needle().is_none()
    }

    fn text_needle(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, principle: &Principle) -> bool {
        let domain_ok = self.domain_ids.is_empty()
            || self
                .domain_ids
                .iter()
                .any(|domain_id| principle.has_domain(*domain_id));
        let text_ok = self
            .text_needle()
            .map_or(true, |needle| principle.text.to_lowercase().contains(&needle));
        domain_ok && text_ok
    }
}

impl GraphSnapshot {
    /// Returns the sub-graph visible under `filter`.
    ///
    /// Domains are kept whole so colors stay stable; edges survive only when
    /// both endpoints are visible.
    pub fn filtered(&self, filter: &GraphFilter) -> GraphSnapshot {
        if filter.is_empty() {
            return self.clone();
        }
        let principles: Vec<Principle> = self
            .principles
            .iter()
            .filter(|principle| filter.matches(principle))
            .cloned()
            .collect();
        let visible: HashSet<PrincipleId> = principles.iter().map(|p| p.id).collect();
        let edges = self
            .edges
            .iter()
            .filter(|edge| visible.contains(&edge.a) && visible.contains(&edge.b))
            .cloned()
            .collect();
        GraphSnapshot {
            domains: self.domains.clone(),
            principles,
            edges,
        }
    }
}

/// Graph store bound to one SQLite connection.
pub struct GraphStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> GraphStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn begin_write(&self) -> RepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    fn begin_read(&self) -> RepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Deferred,
        )?)
    }

    /// Creates a domain with a normalized, unique name.
    pub fn create_domain(&self, name: &str, created_by: &str) -> RepoResult<Domain> {
        let name = normalize_domain_name(name)?;
        let tx = self.begin_write()?;
        let domains = SqliteDomainRepository::new(&tx);
        if domains.find_domain_by_name(&name)?.is_some() {
            return Err(ModelValidationError::DomainNameTaken(name).into());
        }
        let domain = domains.insert_domain(Uuid::new_v4(), &name, created_by)?;
        tx.commit()?;

        info!(
            "event=domain_create module=store status=ok domain_id={}",
            domain.id
        );
        Ok(domain)
    }

    /// Renames a domain. Edges reference ids only, so no edge work follows.
    pub fn rename_domain(&self, id: DomainId, name: &str) -> RepoResult<Domain> {
        let name = normalize_domain_name(name)?;
        let tx = self.begin_write()?;
        let domains = SqliteDomainRepository::new(&tx);
        if let Some(existing) = domains.find_domain_by_name(&name)? {
            if existing.id != id {
                return Err(ModelValidationError::DomainNameTaken(name).into());
            }
        }
        let domain = domains.rename_domain(id, &name)?;
        tx.commit()?;

        info!(
            "event=domain_rename module=store status=ok domain_id={}",
            domain.id
        );
        Ok(domain)
    }

    pub fn get_domain(&self, id: DomainId) -> RepoResult<Option<Domain>> {
        SqliteDomainRepository::new(self.conn).get_domain(id)
    }

    pub fn list_domains(&self) -> RepoResult<Vec<Domain>> {
        SqliteDomainRepository::new(self.conn).list_domains()
    }

    /// Lists principles referencing `id`, sorted by principle id.
    ///
    /// # Errors
    /// - `NotFound` when the domain does not exist.
    pub fn domain_usage(&self, id: DomainId) -> RepoResult<Vec<Principle>> {
        let tx = self.begin_read()?;
        let domains = SqliteDomainRepository::new(&tx);
        if domains.get_domain(id)?.is_none() {
            return Err(RepoError::NotFound {
                kind: EntityKind::Domain,
                id,
            });
        }
        let principles = SqlitePrincipleRepository::new(&tx);
        let mut users = Vec::new();
        for principle_id in domains.principles_using(id)? {
            if let Some(principle) = principles.get_principle(principle_id)? {
                users.push(principle);
            }
        }
        tx.commit()?;
        Ok(users)
    }

    /// Deletes a domain.
    ///
    /// # Errors
    /// - `NotFound` when the domain does not exist.
    /// - `Validation(DomainInUse)` for a referenced domain under `Restrict`.
    /// - `Validation(WouldOrphanPrinciple)` when a cascade would leave a
    ///   principle with no domains; nothing is changed.
    pub fn delete_domain(&self, id: DomainId, mode: DomainDeleteMode) -> RepoResult<DomainRemoval> {
        let tx = self.begin_write()?;
        let domains = SqliteDomainRepository::new(&tx);
        if domains.get_domain(id)?.is_none() {
            return Err(RepoError::NotFound {
                kind: EntityKind::Domain,
                id,
            });
        }

        let users = domains.principles_using(id)?;
        let mut edges = EdgeDelta::default();
        if !users.is_empty() {
            if mode == DomainDeleteMode::Restrict {
                return Err(ModelValidationError::DomainInUse {
                    domain_id: id,
                    principle_count: users.len(),
                }
                .into());
            }

            let principles = SqlitePrincipleRepository::new(&tx);
            let mut remaining_lists = Vec::with_capacity(users.len());
            for principle_id in &users {
                let remaining: Vec<DomainId> = principles
                    .domain_ids_of(*principle_id)?
                    .into_iter()
                    .filter(|domain_id| *domain_id != id)
                    .collect();
                if remaining.is_empty() {
                    return Err(ModelValidationError::WouldOrphanPrinciple {
                        principle_id: *principle_id,
                        domain_id: id,
                    }
                    .into());
                }
                remaining_lists.push((*principle_id, remaining));
            }

            let maintainer = EdgeMaintainer::new(&tx);
            for (principle_id, remaining) in &remaining_lists {
                principles.replace_domains(*principle_id, remaining)?;
                principles.touch_principle(*principle_id)?;
                edges += maintainer.recompute_for(*principle_id)?;
            }
        }

        domains.delete_domain(id)?;
        tx.commit()?;

        info!(
            "event=domain_delete module=store status=ok domain_id={} detached={} edges_removed={} edges_inserted={}",
            id,
            users.len(),
            edges.removed,
            edges.inserted
        );
        Ok(DomainRemoval {
            domain_id: id,
            detached_principle_ids: users,
            edges,
        })
    }

    /// Creates a principle and derives its edges in the same transaction.
    ///
    /// # Errors
    /// - `Validation` for blank text, empty/duplicate domain lists, or any
    ///   unknown domain id. Raised before any row is written.
    pub fn create_principle(
        &self,
        input: &NewPrinciple,
        created_by: &str,
    ) -> RepoResult<PrincipleWrite> {
        let text = normalize_principle_text(&input.text)?;
        validate_domain_ids(&input.domain_ids)?;
        let reference = normalize_reference(input.reference.as_deref());

        let tx = self.begin_write()?;
        ensure_domains_exist(&tx, &input.domain_ids)?;

        let id = new_principle_id();
        let principles = SqlitePrincipleRepository::new(&tx);
        principles.insert_principle(
            id,
            &text,
            reference.as_deref(),
            created_by,
            &input.domain_ids,
        )?;
        let edges = EdgeMaintainer::new(&tx).recompute_for(id)?;
        let principle = read_back(&principles, id)?;
        tx.commit()?;

        info!(
            "event=principle_create module=store status=ok principle_id={} domain_count={} edges_inserted={}",
            id,
            principle.domain_ids.len(),
            edges.inserted
        );
        Ok(PrincipleWrite { principle, edges })
    }

    /// Applies a partial update.
    ///
    /// An empty patch is a no-op (the version is still checked when given).
    ///
    /// # Errors
    /// - `NotFound` when the principle does not exist.
    /// - `VersionConflict` when `expected_version` differs from storage.
    /// - `Validation` as for `create_principle`.
    pub fn update_principle(
        &self,
        id: PrincipleId,
        patch: &PrinciplePatch,
    ) -> RepoResult<PrincipleWrite> {
        let text = patch
            .text
            .as_deref()
            .map(normalize_principle_text)
            .transpose()?;
        if let Some(domain_ids) = &patch.domain_ids {
            validate_domain_ids(domain_ids)?;
        }

        let tx = self.begin_write()?;
        let principles = SqlitePrincipleRepository::new(&tx);
        let current = principles
            .get_principle(id)?
            .ok_or(RepoError::NotFound {
                kind: EntityKind::Principle,
                id,
            })?;

        if patch.is_empty() {
            if let Some(expected) = patch.expected_version {
                if expected != current.version {
                    return Err(RepoError::VersionConflict {
                        id,
                        expected,
                        actual: current.version,
                    });
                }
            }
            tx.commit()?;
            return Ok(PrincipleWrite {
                principle: current,
                edges: EdgeDelta::default(),
            });
        }

        let changed_domains = patch
            .domain_ids
            .as_ref()
            .filter(|domain_ids| **domain_ids != current.domain_ids);
        if let Some(domain_ids) = changed_domains {
            ensure_domains_exist(&tx, domain_ids)?;
        }

        let text = text.unwrap_or_else(|| current.text.clone());
        let reference = match patch.reference.as_deref() {
            Some(value) => normalize_reference(Some(value)),
            None => current.reference.clone(),
        };
        principles.update_fields(id, &text, reference.as_deref(), patch.expected_version)?;

        let mut edges = EdgeDelta::default();
        if let Some(domain_ids) = changed_domains {
            principles.replace_domains(id, domain_ids)?;
            edges = EdgeMaintainer::new(&tx).recompute_for(id)?;
        }
        let principle = read_back(&principles, id)?;
        tx.commit()?;

        info!(
            "event=principle_update module=store status=ok principle_id={} version={} domains_changed={} edges_removed={} edges_inserted={}",
            id,
            principle.version,
            changed_domains.is_some(),
            edges.removed,
            edges.inserted
        );
        Ok(PrincipleWrite { principle, edges })
    }

    /// Deletes a principle and every edge incident to it.
    ///
    /// Returns the number of edges removed.
    pub fn delete_principle(&self, id: PrincipleId) -> RepoResult<usize> {
        self.delete_principle_if(id, |_| Ok::<(), RepoError>(()))
    }

    /// Deletes a principle once `guard` accepts the stored row.
    ///
    /// The guard runs inside the write transaction, so the row it sees is
    /// the row that gets deleted. A rejection leaves everything untouched.
    ///
    /// # Errors
    /// - `NotFound` when the principle does not exist.
    /// - Whatever `guard` returns.
    pub fn delete_principle_if<E>(
        &self,
        id: PrincipleId,
        guard: impl FnOnce(&Principle) -> Result<(), E>,
    ) -> Result<usize, E>
    where
        E: From<RepoError>,
    {
        let tx = self.begin_write()?;
        let principles = SqlitePrincipleRepository::new(&tx);
        let current = principles
            .get_principle(id)?
            .ok_or(RepoError::NotFound {
                kind: EntityKind::Principle,
                id,
            })?;
        guard(&current)?;
        let removed = EdgeMaintainer::new(&tx).remove_for(id)?;
        principles.delete_principle(id)?;
        tx.commit().map_err(RepoError::from)?;

        info!(
            "event=principle_delete module=store status=ok principle_id={} edges_removed={}",
            id, removed
        );
        Ok(removed)
    }

    /// Reads one principle and its domain list from the same committed state.
    pub fn get_principle(&self, id: PrincipleId) -> RepoResult<Option<Principle>> {
        let tx = self.begin_read()?;
        let principle = SqlitePrincipleRepository::new(&tx).get_principle(id)?;
        tx.commit()?;
        Ok(principle)
    }

    /// Returns the stored edges incident to `id`.
    ///
    /// # Errors
    /// - `NotFound` when the principle does not exist.
    pub fn edges_of(&self, id: PrincipleId) -> RepoResult<Vec<Edge>> {
        let tx = self.begin_read()?;
        if SqlitePrincipleRepository::new(&tx).get_principle(id)?.is_none() {
            return Err(RepoError::NotFound {
                kind: EntityKind::Principle,
                id,
            });
        }
        let edges = SqliteEdgeRepository::new(&tx).edges_touching(id)?;
        tx.commit()?;
        Ok(edges)
    }

    /// Rebuilds the whole edge collection under an exclusive lock.
    pub fn rebuild_edges(&self) -> RepoResult<EdgeDelta> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Exclusive)?;
        let delta = EdgeMaintainer::new(&tx).rebuild_all()?;
        tx.commit()?;
        Ok(delta)
    }

    /// Compares stored edges with edges derived from current memberships.
    ///
    /// Never repairs. Violations are logged at error level.
    pub fn check_edges(&self) -> RepoResult<ConsistencyReport> {
        let tx = self.begin_read()?;
        let principles = SqlitePrincipleRepository::new(&tx).list_principles()?;
        let stored = SqliteEdgeRepository::new(&tx).list_edges()?;
        tx.commit()?;

        let report = compare_edges(&stored, &derive_edges(&principles));
        if report.is_consistent() {
            info!(
                "event=edge_check module=store status=ok edges={}",
                stored.len()
            );
        } else {
            error!(
                "event=edge_consistency_violation module=store status=error missing={} unexpected={} mismatched={} bad_weight={}",
                report.missing.len(),
                report.unexpected.len(),
                report.mismatched.len(),
                report.bad_weight.len()
            );
        }
        Ok(report)
    }

    /// Reads domains, principles and edges from one committed state.
    pub fn snapshot(&self) -> RepoResult<GraphSnapshot> {
        let tx = self.begin_read()?;
        let snapshot = GraphSnapshot {
            domains: SqliteDomainRepository::new(&tx).list_domains()?,
            principles: SqlitePrincipleRepository::new(&tx).list_principles()?,
            edges: SqliteEdgeRepository::new(&tx).list_edges()?,
        };
        tx.commit()?;
        Ok(snapshot)
    }
}

fn ensure_domains_exist(tx: &Transaction<'_>, domain_ids: &[DomainId]) -> RepoResult<()> {
    let missing = SqliteDomainRepository::new(tx).missing_domains(domain_ids)?;
    if let Some(first) = missing.first() {
        warn!(
            "event=principle_write module=store status=error error_code=unknown_domain missing={}",
            missing.len()
        );
        return Err(ModelValidationError::UnknownDomain(*first).into());
    }
    Ok(())
}

fn read_back(principles: &SqlitePrincipleRepository<'_>, id: PrincipleId) -> RepoResult<Principle> {
    principles
        .get_principle(id)?
        .ok_or_else(|| RepoError::InvalidData(format!("principle {id} missing after write")))
}
