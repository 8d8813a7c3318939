use golden_graph_core::db::open_db_in_memory;
use golden_graph_core::repo::edge_repo::{EdgeRepository, SqliteEdgeRepository};
use golden_graph_core::{
    derive_edges, DomainDeleteMode, DomainId, EdgeMaintainer, GraphStore, NewPrinciple, Principle,
    PrincipleId, PrinciplePatch,
};
use proptest::prelude::*;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::HashSet;

const DOMAIN_COUNT: usize = 5;

/// Per principle: an ordered, repeat-free, non-empty list of domain indexes.
fn graph_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(
        prop::sample::subsequence((0..DOMAIN_COUNT).collect::<Vec<_>>(), 1..=DOMAIN_COUNT)
            .prop_shuffle(),
        0..12,
    )
}

fn graph_with_order() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<usize>)> {
    graph_strategy().prop_flat_map(|graph| {
        let order: Vec<usize> = (0..graph.len()).collect();
        (Just(graph), Just(order).prop_shuffle())
    })
}

fn populate(conn: &Connection, graph: &[Vec<usize>]) -> Vec<Principle> {
    let store = GraphStore::new(conn);
    let domains: Vec<_> = (0..DOMAIN_COUNT)
        .map(|index| store.create_domain(&format!("D{index}"), "ana").unwrap().id)
        .collect();
    graph
        .iter()
        .enumerate()
        .map(|(index, members)| {
            store
                .create_principle(
                    &NewPrinciple {
                        text: format!("p{index}"),
                        domain_ids: members.iter().map(|m| domains[*m]).collect(),
                        reference: None,
                    },
                    "ana",
                )
                .unwrap()
                .principle
        })
        .collect()
}

/// One write against the graph. Indexes are taken modulo the live set.
#[derive(Debug, Clone)]
enum Mutation {
    Create(Vec<usize>),
    SetDomains(usize, Vec<usize>),
    Delete(usize),
    DropDomain(usize),
}

fn domain_subset() -> impl Strategy<Value = Vec<usize>> {
    prop::sample::subsequence((0..DOMAIN_COUNT).collect::<Vec<_>>(), 1..=DOMAIN_COUNT)
        .prop_shuffle()
}

fn mutation_strategy() -> impl Strategy<Value = Vec<Mutation>> {
    let mutation = prop_oneof![
        4 => domain_subset().prop_map(Mutation::Create),
        4 => (any::<usize>(), domain_subset()).prop_map(|(at, ds)| Mutation::SetDomains(at, ds)),
        2 => any::<usize>().prop_map(Mutation::Delete),
        1 => (0..DOMAIN_COUNT).prop_map(Mutation::DropDomain),
    ];
    prop::collection::vec(mutation, 1..40)
}

/// Maps domain indexes onto live domains, dropping deleted ones.
fn live_domain_ids(domains: &[Option<DomainId>], members: &[usize]) -> Vec<DomainId> {
    members.iter().filter_map(|index| domains[*index]).collect()
}

fn apply(
    store: &GraphStore<'_>,
    domains: &mut [Option<DomainId>],
    live: &mut Vec<PrincipleId>,
    step: usize,
    mutation: &Mutation,
) {
    match mutation {
        Mutation::Create(members) => {
            let domain_ids = live_domain_ids(domains, members);
            if domain_ids.is_empty() {
                return;
            }
            let written = store
                .create_principle(
                    &NewPrinciple {
                        text: format!("p{step}"),
                        domain_ids,
                        reference: None,
                    },
                    "ana",
                )
                .unwrap();
            live.push(written.principle.id);
        }
        Mutation::SetDomains(at, members) => {
            let domain_ids = live_domain_ids(domains, members);
            if live.is_empty() || domain_ids.is_empty() {
                return;
            }
            let id = live[at % live.len()];
            store
                .update_principle(
                    id,
                    &PrinciplePatch {
                        domain_ids: Some(domain_ids),
                        ..PrinciplePatch::default()
                    },
                )
                .unwrap();
        }
        Mutation::Delete(at) => {
            if live.is_empty() {
                return;
            }
            let id = live.remove(at % live.len());
            store.delete_principle(id).unwrap();
        }
        Mutation::DropDomain(index) => {
            let Some(domain_id) = domains[*index] else {
                return;
            };
            // A cascade that would orphan a principle is rejected whole.
            if store.delete_domain(domain_id, DomainDeleteMode::Cascade).is_ok() {
                domains[*index] = None;
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn incremental_maintenance_tracks_every_mutation(mutations in mutation_strategy()) {
        let conn = open_db_in_memory().unwrap();
        let store = GraphStore::new(&conn);
        let mut domains: Vec<Option<DomainId>> = (0..DOMAIN_COUNT)
            .map(|index| Some(store.create_domain(&format!("D{index}"), "ana").unwrap().id))
            .collect();
        let mut live = Vec::new();

        for (step, mutation) in mutations.iter().enumerate() {
            apply(&store, &mut domains, &mut live, step, mutation);

            let snapshot = store.snapshot().unwrap();
            prop_assert_eq!(snapshot.principles.len(), live.len());
            prop_assert_eq!(
                &snapshot.edges,
                &derive_edges(&snapshot.principles),
                "edges drifted after step {} ({:?})",
                step,
                mutation
            );
        }
        prop_assert!(store.check_edges().unwrap().is_consistent());
    }

    #[test]
    fn incremental_maintenance_matches_rebuild((graph, order) in graph_with_order()) {
        let conn = open_db_in_memory().unwrap();
        let principles = populate(&conn, &graph);
        let oracle = derive_edges(&principles);

        let incremental = SqliteEdgeRepository::new(&conn).list_edges().unwrap();
        prop_assert_eq!(&incremental, &oracle);

        // Start over from an empty edge set and recompute in a random order.
        conn.execute("DELETE FROM edges;", []).unwrap();
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate).unwrap();
        let maintainer = EdgeMaintainer::new(&tx);
        for index in &order {
            maintainer.recompute_for(principles[*index].id).unwrap();
        }
        tx.commit().unwrap();
        let permuted = SqliteEdgeRepository::new(&conn).list_edges().unwrap();
        prop_assert_eq!(&permuted, &oracle);

        let store = GraphStore::new(&conn);
        store.rebuild_edges().unwrap();
        let rebuilt = SqliteEdgeRepository::new(&conn).list_edges().unwrap();
        prop_assert_eq!(&rebuilt, &oracle);
        prop_assert!(store.check_edges().unwrap().is_consistent());
    }

    #[test]
    fn edges_exist_exactly_for_intersecting_pairs(graph in graph_strategy()) {
        let conn = open_db_in_memory().unwrap();
        let principles = populate(&conn, &graph);
        let edges = SqliteEdgeRepository::new(&conn).list_edges().unwrap();

        let mut seen = HashSet::new();
        for edge in &edges {
            prop_assert!(edge.a < edge.b);
            prop_assert!(seen.insert(edge.key()), "pair stored twice");
            prop_assert_eq!(edge.weight as usize, edge.shared_domain_ids.len());
        }

        for (i, p) in principles.iter().enumerate() {
            for q in &principles[i + 1..] {
                let mut shared: Vec<_> = p
                    .domain_ids
                    .iter()
                    .filter(|id| q.domain_ids.contains(id))
                    .copied()
                    .collect();
                shared.sort();
                let edge = edges
                    .iter()
                    .find(|edge| edge.key().touches(p.id) && edge.key().touches(q.id));
                match edge {
                    Some(edge) => {
                        prop_assert_eq!(&edge.shared_domain_ids, &shared);
                    }
                    None => {
                        prop_assert!(shared.is_empty());
                    }
                }
            }
        }
    }
}
