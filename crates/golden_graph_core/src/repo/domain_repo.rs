//! Domain repository contract and SQLite implementation.
//!
//! # Invariants
//! - Domain listing is deterministic: `name_key ASC, name ASC, id ASC`.
//! - Name lookups go through `name_key`, the Unicode-lowercased name.

use crate::model::domain::{domain_name_key, Domain, DomainId};
use crate::model::principle::PrincipleId;
use crate::repo::{parse_uuid, EntityKind, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const DOMAIN_SELECT_SQL: &str = "SELECT id, name, created_by, created_at, updated_at FROM domains";

/// Repository interface for domain persistence.
pub trait DomainRepository {
    /// Inserts a domain whose name was already normalized and checked.
    fn insert_domain(&self, id: DomainId, name: &str, created_by: &str) -> RepoResult<Domain>;
    fn rename_domain(&self, id: DomainId, name: &str) -> RepoResult<Domain>;
    fn get_domain(&self, id: DomainId) -> RepoResult<Option<Domain>>;
    fn find_domain_by_name(&self, name: &str) -> RepoResult<Option<Domain>>;
    fn list_domains(&self) -> RepoResult<Vec<Domain>>;
    /// Deletes one domain. Fails at the storage boundary while referenced.
    fn delete_domain(&self, id: DomainId) -> RepoResult<()>;
    /// Returns the subset of `ids` with no stored domain, in input order.
    fn missing_domains(&self, ids: &[DomainId]) -> RepoResult<Vec<DomainId>>;
    /// Returns ids of principles referencing `id`, sorted ascending.
    fn principles_using(&self, id: DomainId) -> RepoResult<Vec<PrincipleId>>;
}

/// SQLite-backed domain repository.
pub struct SqliteDomainRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDomainRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DomainRepository for SqliteDomainRepository<'_> {
    fn insert_domain(&self, id: DomainId, name: &str, created_by: &str) -> RepoResult<Domain> {
        self.conn.execute(
            "INSERT INTO domains (id, name, name_key, created_by) VALUES (?1, ?2, ?3, ?4);",
            params![id.to_string(), name, domain_name_key(name), created_by],
        )?;
        self.get_domain(id)?
            .ok_or_else(|| RepoError::InvalidData(format!("domain {id} missing after insert")))
    }

    fn rename_domain(&self, id: DomainId, name: &str) -> RepoResult<Domain> {
        let changed = self.conn.execute(
            "UPDATE domains
             SET
                name = ?2,
                name_key = ?3,
                updated_at = (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
             WHERE id = ?1;",
            params![id.to_string(), name, domain_name_key(name)],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                kind: EntityKind::Domain,
                id,
            });
        }
        self.get_domain(id)?
            .ok_or_else(|| RepoError::InvalidData(format!("domain {id} missing after rename")))
    }

    fn get_domain(&self, id: DomainId) -> RepoResult<Option<Domain>> {
        let row = self
            .conn
            .query_row(
                &format!("{DOMAIN_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                DomainRow::read,
            )
            .optional()?;
        row.map(DomainRow::into_domain).transpose()
    }

    fn find_domain_by_name(&self, name: &str) -> RepoResult<Option<Domain>> {
        let row = self
            .conn
            .query_row(
                &format!("{DOMAIN_SELECT_SQL} WHERE name_key = ?1;"),
                [domain_name_key(name)],
                DomainRow::read,
            )
            .optional()?;
        row.map(DomainRow::into_domain).transpose()
    }

    fn list_domains(&self) -> RepoResult<Vec<Domain>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DOMAIN_SELECT_SQL} ORDER BY name_key ASC, name ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut domains = Vec::new();
        while let Some(row) = rows.next()? {
            domains.push(DomainRow::read(row)?.into_domain()?);
        }
        Ok(domains)
    }

    fn delete_domain(&self, id: DomainId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM domains WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                kind: EntityKind::Domain,
                id,
            });
        }
        Ok(())
    }

    fn missing_domains(&self, ids: &[DomainId]) -> RepoResult<Vec<DomainId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT EXISTS(SELECT 1 FROM domains WHERE id = ?1);")?;
        let mut missing = Vec::new();
        for id in ids {
            let exists: i64 = stmt.query_row([id.to_string()], |row| row.get(0))?;
            if exists == 0 {
                missing.push(*id);
            }
        }
        Ok(missing)
    }

    fn principles_using(&self, id: DomainId) -> RepoResult<Vec<PrincipleId>> {
        let mut stmt = self.conn.prepare(
            "SELECT principle_id
             FROM principle_domains
             WHERE domain_id = ?1
             ORDER BY principle_id ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            ids.push(parse_uuid(&value, "principle_domains.principle_id")?);
        }
        Ok(ids)
    }
}

struct DomainRow {
    id: String,
    name: String,
    created_by: String,
    created_at: i64,
    updated_at: i64,
}

impl DomainRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_domain(self) -> RepoResult<Domain> {
        Ok(Domain {
            id: parse_uuid(&self.id, "domains.id")?,
            name: self.name,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
