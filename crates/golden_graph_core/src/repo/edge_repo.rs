//! Edge repository contract and SQLite implementation.
//!
//! # Invariants
//! - Only edge maintenance writes through this repository.
//! - Reads return stored rows as-is (weight and shared set are not
//!   re-derived) so consistency checks can see drift.
//! - Edge listing is deterministic: `principle_a ASC, principle_b ASC`, shared
//!   domains ascending.

use crate::model::edge::{Edge, EdgeKey};
use crate::model::principle::PrincipleId;
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection};

const EDGE_SELECT_SQL: &str = "SELECT
    e.principle_a AS principle_a,
    e.principle_b AS principle_b,
    e.weight AS weight,
    ed.domain_id AS domain_id
FROM edges e
LEFT JOIN edge_domains ed
    ON ed.principle_a = e.principle_a
   AND ed.principle_b = e.principle_b";

/// Repository interface for derived edge persistence.
pub trait EdgeRepository {
    fn insert_edge(&self, edge: &Edge) -> RepoResult<()>;
    /// Deletes every edge with `id` as an endpoint; returns the count.
    fn delete_edges_touching(&self, id: PrincipleId) -> RepoResult<usize>;
    /// Deletes the whole edge collection; returns the count.
    fn delete_all_edges(&self) -> RepoResult<usize>;
    fn list_edges(&self) -> RepoResult<Vec<Edge>>;
    fn edges_touching(&self, id: PrincipleId) -> RepoResult<Vec<Edge>>;
}

/// SQLite-backed edge repository.
pub struct SqliteEdgeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEdgeRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn collect_edges(&self, sql: &str, bind: Option<&str>) -> RepoResult<Vec<Edge>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = match bind {
            Some(value) => stmt.query([value])?,
            None => stmt.query([])?,
        };

        let mut edges: Vec<Edge> = Vec::new();
        while let Some(row) = rows.next()? {
            let a_text: String = row.get("principle_a")?;
            let b_text: String = row.get("principle_b")?;
            let weight: i64 = row.get("weight")?;
            let domain_text: Option<String> = row.get("domain_id")?;

            let a = parse_uuid(&a_text, "edges.principle_a")?;
            let b = parse_uuid(&b_text, "edges.principle_b")?;
            let weight = u32::try_from(weight).map_err(|_| {
                RepoError::InvalidData(format!("invalid weight `{weight}` in edges.weight"))
            })?;

            let same_edge = edges
                .last()
                .is_some_and(|last| last.a == a && last.b == b);
            if !same_edge {
                edges.push(Edge {
                    a,
                    b,
                    shared_domain_ids: Vec::new(),
                    weight,
                });
            }
            if let (Some(text), Some(last)) = (domain_text, edges.last_mut()) {
                last.shared_domain_ids
                    .push(parse_uuid(&text, "edge_domains.domain_id")?);
            }
        }
        Ok(edges)
    }
}

impl EdgeRepository for SqliteEdgeRepository<'_> {
    fn insert_edge(&self, edge: &Edge) -> RepoResult<()> {
        if EdgeKey::canonical(edge.a, edge.b) != Some(edge.key()) {
            return Err(RepoError::InvalidData(format!(
                "edge ({}, {}) is not canonically oriented",
                edge.a, edge.b
            )));
        }

        let a = edge.a.to_string();
        let b = edge.b.to_string();
        self.conn.execute(
            "INSERT INTO edges (principle_a, principle_b, weight) VALUES (?1, ?2, ?3);",
            params![a, b, i64::from(edge.weight)],
        )?;

        let mut stmt = self.conn.prepare(
            "INSERT INTO edge_domains (principle_a, principle_b, domain_id)
             VALUES (?1, ?2, ?3);",
        )?;
        for domain_id in &edge.shared_domain_ids {
            stmt.execute(params![a, b, domain_id.to_string()])?;
        }
        Ok(())
    }

    fn delete_edges_touching(&self, id: PrincipleId) -> RepoResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM edges WHERE principle_a = ?1 OR principle_b = ?1;",
            [id.to_string()],
        )?;
        Ok(deleted)
    }

    fn delete_all_edges(&self) -> RepoResult<usize> {
        let deleted = self.conn.execute("DELETE FROM edges;", [])?;
        Ok(deleted)
    }

    fn list_edges(&self) -> RepoResult<Vec<Edge>> {
        self.collect_edges(
            &format!("{EDGE_SELECT_SQL} ORDER BY e.principle_a, e.principle_b, ed.domain_id;"),
            None,
        )
    }

    fn edges_touching(&self, id: PrincipleId) -> RepoResult<Vec<Edge>> {
        let id = id.to_string();
        self.collect_edges(
            &format!(
                "{EDGE_SELECT_SQL}
                 WHERE e.principle_a = ?1 OR e.principle_b = ?1
                 ORDER BY e.principle_a, e.principle_b, ed.domain_id;"
            ),
            Some(id.as_str()),
        )
    }
}
