//! Incremental and full edge maintenance.
//!
//! # Responsibility
//! - Keep the stored edge collection equal to the edges derivable from the
//!   current principle memberships.
//! - Detect (never repair) drift between stored and derived edges.
//!
//! # Invariants
//! - Every mutation runs against a caller-owned `Transaction`; the principle
//!   write and its edge delta commit or roll back together.
//! - `recompute_for` touches only edges incident to the principle.
//! - `rebuild_all` output equals `derive_edges` over the same memberships,
//!   which equals `recompute_for` applied to every principle in any order.

use crate::graph::tag_index::TagIndex;
use crate::model::edge::{Edge, EdgeKey};
use crate::model::principle::{Principle, PrincipleId};
use crate::repo::edge_repo::{EdgeRepository, SqliteEdgeRepository};
use crate::repo::principle_repo::{PrincipleRepository, SqlitePrincipleRepository};
use crate::repo::{EntityKind, RepoError, RepoResult};
use log::{debug, info};
use rusqlite::Transaction;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::AddAssign;
use std::time::Instant;

/// Counts of one edge maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDelta {
    pub removed: usize,
    pub inserted: usize,
}

impl AddAssign for EdgeDelta {
    fn add_assign(&mut self, other: Self) {
        self.removed += other.removed;
        self.inserted += other.inserted;
    }
}

/// Applies edge recomputation inside an open transaction.
pub struct EdgeMaintainer<'a, 'conn> {
    tx: &'a Transaction<'conn>,
}

impl<'a, 'conn> EdgeMaintainer<'a, 'conn> {
    pub fn new(tx: &'a Transaction<'conn>) -> Self {
        Self { tx }
    }

    /// Replaces every edge incident to `principle_id` with edges derived from
    /// its current domain list.
    ///
    /// Calling this twice without an intervening change is a no-op on the
    /// resulting edge set.
    ///
    /// # Errors
    /// - `NotFound` when the principle has no stored memberships.
    pub fn recompute_for(&self, principle_id: PrincipleId) -> RepoResult<EdgeDelta> {
        let principles = SqlitePrincipleRepository::new(self.tx);
        let edges = SqliteEdgeRepository::new(self.tx);

        let domain_ids = principles.domain_ids_of(principle_id)?;
        if domain_ids.is_empty() {
            return Err(RepoError::NotFound {
                kind: EntityKind::Principle,
                id: principle_id,
            });
        }

        let removed = edges.delete_edges_touching(principle_id)?;
        let index = TagIndex::from_memberships(principles.memberships_for_domains(&domain_ids)?);
        let derived = index.edges_for(principle_id, &domain_ids);
        for edge in &derived {
            edges.insert_edge(edge)?;
        }

        let delta = EdgeDelta {
            removed,
            inserted: derived.len(),
        };
        debug!(
            "event=edge_recompute module=graph status=ok principle_id={} removed={} inserted={}",
            principle_id, delta.removed, delta.inserted
        );
        Ok(delta)
    }

    /// Removes every edge incident to `principle_id` without re-deriving.
    ///
    /// Used on principle deletion; the foreign-key cascade would do the same,
    /// doing it explicitly keeps the delta observable.
    pub fn remove_for(&self, principle_id: PrincipleId) -> RepoResult<usize> {
        let removed = SqliteEdgeRepository::new(self.tx).delete_edges_touching(principle_id)?;
        debug!(
            "event=edge_remove module=graph status=ok principle_id={} removed={}",
            principle_id, removed
        );
        Ok(removed)
    }

    /// Clears the edge collection and re-derives it from all memberships.
    pub fn rebuild_all(&self) -> RepoResult<EdgeDelta> {
        let started_at = Instant::now();
        let principles = SqlitePrincipleRepository::new(self.tx);
        let edges = SqliteEdgeRepository::new(self.tx);

        let removed = edges.delete_all_edges()?;
        let index = TagIndex::from_memberships(principles.all_memberships()?);
        let derived = index.all_edges();
        for edge in &derived {
            edges.insert_edge(edge)?;
        }

        let delta = EdgeDelta {
            removed,
            inserted: derived.len(),
        };
        info!(
            "event=edge_rebuild module=graph status=ok domains={} removed={} inserted={} duration_ms={}",
            index.len(),
            delta.removed,
            delta.inserted,
            started_at.elapsed().as_millis()
        );
        Ok(delta)
    }
}

/// Derives the full edge set of `principles`, ordered by key.
///
/// This is the correctness oracle for both maintenance paths.
pub fn derive_edges(principles: &[Principle]) -> Vec<Edge> {
    TagIndex::from_principles(principles).all_edges()
}

/// One edge whose stored shape differs from the derived one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeMismatch {
    pub stored: Edge,
    pub expected: Edge,
}

/// Difference between stored and derived edge sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    /// Derivable edges absent from storage.
    pub missing: Vec<Edge>,
    /// Stored edges with no derivable counterpart.
    pub unexpected: Vec<Edge>,
    /// Pairs present in both with different weight or shared set.
    pub mismatched: Vec<EdgeMismatch>,
    /// Stored edges whose weight disagrees with their own shared set.
    pub bad_weight: Vec<Edge>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty()
            && self.unexpected.is_empty()
            && self.mismatched.is_empty()
            && self.bad_weight.is_empty()
    }

    /// Total number of violations.
    pub fn violation_count(&self) -> usize {
        self.missing.len() + self.unexpected.len() + self.mismatched.len() + self.bad_weight.len()
    }
}

/// Compares a stored edge set with the derived oracle.
pub fn compare_edges(stored: &[Edge], expected: &[Edge]) -> ConsistencyReport {
    let mut report = ConsistencyReport::default();
    let mut expected_by_key: BTreeMap<EdgeKey, &Edge> =
        expected.iter().map(|edge| (edge.key(), edge)).collect();

    for edge in stored {
        if usize::try_from(edge.weight).ok() != Some(edge.shared_domain_ids.len()) {
            report.bad_weight.push(edge.clone());
        }
        match expected_by_key.remove(&edge.key()) {
            Some(derived) if derived == edge => {}
            Some(derived) => report.mismatched.push(EdgeMismatch {
                stored: edge.clone(),
                expected: derived.clone(),
            }),
            None => report.unexpected.push(edge.clone()),
        }
    }
    report.missing = expected_by_key.into_values().cloned().collect();
    report
}

#[cfg(test)]
mod tests {
    use super::{compare_edges, derive_edges};
    use crate::model::edge::Edge;
    use crate::model::principle::Principle;
    use uuid::Uuid;

    fn principle(domain_ids: Vec<Uuid>) -> Principle {
        Principle {
            id: Uuid::new_v4(),
            text: "p".to_string(),
            domain_ids,
            reference: None,
            created_by: "tester".to_string(),
            created_at: 0,
            updated_at: 0,
            version: 1,
        }
    }

    #[test]
    fn derive_edges_matches_worked_example() {
        let physics = Uuid::new_v4();
        let math = Uuid::new_v4();
        let f1 = principle(vec![physics]);
        let f2 = principle(vec![physics, math]);
        let f3 = principle(vec![math]);

        let edges = derive_edges(&[f1.clone(), f2.clone(), f3.clone()]);
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|edge| edge.weight == 1));
        assert!(!edges
            .iter()
            .any(|edge| edge.key().touches(f1.id) && edge.key().touches(f3.id)));
    }

    #[test]
    fn compare_reports_each_kind_of_drift() {
        let physics = Uuid::new_v4();
        let math = Uuid::new_v4();
        let f1 = principle(vec![physics, math]);
        let f2 = principle(vec![physics, math]);
        let f3 = principle(vec![math]);
        let expected = derive_edges(&[f1, f2, f3]);
        assert_eq!(expected.len(), 3);

        let mut stored: Vec<Edge> = expected.clone();
        let dropped = stored.remove(0);
        stored[0].weight += 1;
        let report = compare_edges(&stored, &expected);

        assert!(!report.is_consistent());
        assert_eq!(report.missing, vec![dropped]);
        assert_eq!(report.mismatched.len(), 1);
        assert_eq!(report.bad_weight.len(), 1);
        assert!(report.unexpected.is_empty());
        assert!(compare_edges(&expected, &expected).is_consistent());
    }
}
