//! Domain -> principles index.
//!
//! The primitive behind "who shares a domain with me". Built per operation
//! from membership rows; never cached across transactions.

use crate::model::domain::DomainId;
use crate::model::edge::{Edge, EdgeKey};
use crate::model::principle::{Principle, PrincipleId};
use std::collections::{BTreeMap, BTreeSet};

/// Maps each domain to the set of principles carrying it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagIndex {
    members: BTreeMap<DomainId, BTreeSet<PrincipleId>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from `(principle, domain)` membership rows.
    pub fn from_memberships(
        memberships: impl IntoIterator<Item = (PrincipleId, DomainId)>,
    ) -> Self {
        let mut index = Self::new();
        for (principle_id, domain_id) in memberships {
            index.insert(principle_id, domain_id);
        }
        index
    }

    /// Builds an index over every membership of `principles`.
    pub fn from_principles(principles: &[Principle]) -> Self {
        Self::from_memberships(principles.iter().flat_map(|principle| {
            principle
                .domain_ids
                .iter()
                .map(move |domain_id| (principle.id, *domain_id))
        }))
    }

    pub fn insert(&mut self, principle_id: PrincipleId, domain_id: DomainId) {
        self.members
            .entry(domain_id)
            .or_default()
            .insert(principle_id);
    }

    /// Number of indexed domains.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Computes, for every other principle, the domains it shares with a
    /// principle carrying `domain_ids`.
    ///
    /// Principles with an empty intersection are absent from the result.
    pub fn shared_with(
        &self,
        principle_id: PrincipleId,
        domain_ids: &[DomainId],
    ) -> BTreeMap<PrincipleId, BTreeSet<DomainId>> {
        let mut shared: BTreeMap<PrincipleId, BTreeSet<DomainId>> = BTreeMap::new();
        for domain_id in domain_ids {
            let Some(members) = self.members.get(domain_id) else {
                continue;
            };
            for other in members {
                if *other != principle_id {
                    shared.entry(*other).or_default().insert(*domain_id);
                }
            }
        }
        shared
    }

    /// Derives the canonical edges incident to one principle.
    pub fn edges_for(&self, principle_id: PrincipleId, domain_ids: &[DomainId]) -> Vec<Edge> {
        self.shared_with(principle_id, domain_ids)
            .into_iter()
            .filter_map(|(other, shared)| {
                EdgeKey::canonical(principle_id, other)
                    .and_then(|key| Edge::from_shared(key, shared))
            })
            .collect()
    }

    /// Derives every edge of the indexed graph, ordered by key.
    pub fn all_edges(&self) -> Vec<Edge> {
        let mut shared: BTreeMap<EdgeKey, BTreeSet<DomainId>> = BTreeMap::new();
        for (domain_id, members) in &self.members {
            let members: Vec<PrincipleId> = members.iter().copied().collect();
            for (offset, a) in members.iter().enumerate() {
                for b in &members[offset + 1..] {
                    // Members are sorted, so (a, b) is already canonical.
                    let key = EdgeKey { a: *a, b: *b };
                    shared.entry(key).or_default().insert(*domain_id);
                }
            }
        }
        shared
            .into_iter()
            .filter_map(|(key, domains)| Edge::from_shared(key, domains))
            .collect()
    }
}
