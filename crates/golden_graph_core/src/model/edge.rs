//! Derived edge model.
//!
//! # Invariants
//! - `a < b` under `Uuid` ordering; one record per unordered pair.
//! - `shared_domain_ids` is sorted ascending and repeat-free, so two edges
//!   over the same pair compare equal exactly when their shared sets match.
//! - `weight == shared_domain_ids.len()` and is never zero.

use crate::model::domain::DomainId;
use crate::model::principle::PrincipleId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Canonically oriented unordered principle pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub a: PrincipleId,
    pub b: PrincipleId,
}

impl EdgeKey {
    /// Orients `(x, y)` so that `a < b`. Returns `None` for a self pair.
    pub fn canonical(x: PrincipleId, y: PrincipleId) -> Option<Self> {
        match x.cmp(&y) {
            std::cmp::Ordering::Less => Some(Self { a: x, b: y }),
            std::cmp::Ordering::Greater => Some(Self { a: y, b: x }),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Returns whether `id` is one of the endpoints.
    pub fn touches(&self, id: PrincipleId) -> bool {
        self.a == id || self.b == id
    }
}

/// Relation between two principles sharing at least one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub a: PrincipleId,
    pub b: PrincipleId,
    pub shared_domain_ids: Vec<DomainId>,
    pub weight: u32,
}

impl Edge {
    /// Builds an edge from a canonical key and its shared domain set.
    ///
    /// Returns `None` when `shared` is empty: absence is the "no relation"
    /// state, there is no zero-weight edge.
    pub fn from_shared(key: EdgeKey, shared: BTreeSet<DomainId>) -> Option<Self> {
        if shared.is_empty() {
            return None;
        }
        let weight = u32::try_from(shared.len()).unwrap_or(u32::MAX);
        Some(Self {
            a: key.a,
            b: key.b,
            shared_domain_ids: shared.into_iter().collect(),
            weight,
        })
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            a: self.a,
            b: self.b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Edge, EdgeKey};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    #[test]
    fn canonical_orientation_ignores_argument_order() {
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let forward = EdgeKey::canonical(x, y).expect("distinct ids");
        let backward = EdgeKey::canonical(y, x).expect("distinct ids");
        assert_eq!(forward, backward);
        assert!(forward.a < forward.b);
        assert!(EdgeKey::canonical(x, x).is_none());
    }

    #[test]
    fn empty_shared_set_builds_no_edge() {
        let key = EdgeKey::canonical(Uuid::new_v4(), Uuid::new_v4()).expect("distinct ids");
        assert!(Edge::from_shared(key, BTreeSet::new()).is_none());

        let shared: BTreeSet<_> = [Uuid::new_v4(), Uuid::new_v4()].into_iter().collect();
        let edge = Edge::from_shared(key, shared).expect("non-empty set");
        assert_eq!(edge.weight, 2);
        assert!(edge.shared_domain_ids.windows(2).all(|w| w[0] < w[1]));
    }
}
