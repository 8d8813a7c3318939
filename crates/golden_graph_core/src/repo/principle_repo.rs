//! Principle repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist principle rows and their ordered domain memberships.
//! - Serve membership projections consumed by `TagIndex`.
//!
//! # Invariants
//! - Domain order is stored as `principle_domains.position`, 0 = primary.
//! - Principle listing is deterministic: `created_at DESC, id ASC`.
//! - `version` is bumped by every field or membership update.

use crate::model::domain::DomainId;
use crate::model::principle::{Principle, PrincipleId};
use crate::repo::{parse_uuid, EntityKind, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

const PRINCIPLE_SELECT_SQL: &str = "SELECT
    id,
    text,
    reference,
    created_by,
    created_at,
    updated_at,
    version
FROM principles";

/// One `(principle, domain)` membership row.
pub type Membership = (PrincipleId, DomainId);

/// Repository interface for principle persistence.
pub trait PrincipleRepository {
    fn insert_principle(
        &self,
        id: PrincipleId,
        text: &str,
        reference: Option<&str>,
        created_by: &str,
        domain_ids: &[DomainId],
    ) -> RepoResult<()>;
    /// Rewrites text/reference and bumps `version`.
    ///
    /// With `expected_version`, fails with `VersionConflict` on mismatch.
    fn update_fields(
        &self,
        id: PrincipleId,
        text: &str,
        reference: Option<&str>,
        expected_version: Option<i64>,
    ) -> RepoResult<i64>;
    /// Replaces the whole ordered domain list of one principle.
    ///
    /// Does not bump `version`; callers pair it with `update_fields` or
    /// `touch_principle`.
    fn replace_domains(&self, id: PrincipleId, domain_ids: &[DomainId]) -> RepoResult<()>;
    /// Bumps `version` and `updated_at` without changing fields.
    fn touch_principle(&self, id: PrincipleId) -> RepoResult<()>;
    fn get_principle(&self, id: PrincipleId) -> RepoResult<Option<Principle>>;
    fn list_principles(&self) -> RepoResult<Vec<Principle>>;
    fn delete_principle(&self, id: PrincipleId) -> RepoResult<()>;
    /// Returns the ordered domain list of one principle.
    fn domain_ids_of(&self, id: PrincipleId) -> RepoResult<Vec<DomainId>>;
    /// Returns every membership row whose domain is in `domain_ids`.
    fn memberships_for_domains(&self, domain_ids: &[DomainId]) -> RepoResult<Vec<Membership>>;
    /// Returns every membership row.
    fn all_memberships(&self) -> RepoResult<Vec<Membership>>;
}

/// SQLite-backed principle repository.
pub struct SqlitePrincipleRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePrincipleRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn current_version(&self, id: PrincipleId) -> RepoResult<Option<i64>> {
        let version = self
            .conn
            .query_row(
                "SELECT version FROM principles WHERE id = ?1;",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    fn insert_memberships(&self, id: PrincipleId, domain_ids: &[DomainId]) -> RepoResult<()> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO principle_domains (principle_id, domain_id, position)
             VALUES (?1, ?2, ?3);",
        )?;
        let principle_id = id.to_string();
        for (position, domain_id) in domain_ids.iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|_| RepoError::InvalidData("domain position overflow".to_string()))?;
            stmt.execute(params![principle_id, domain_id.to_string(), position])?;
        }
        Ok(())
    }

    fn load_membership_map(&self) -> RepoResult<HashMap<PrincipleId, Vec<DomainId>>> {
        let mut stmt = self.conn.prepare(
            "SELECT principle_id, domain_id
             FROM principle_domains
             ORDER BY principle_id ASC, position ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut by_principle: HashMap<PrincipleId, Vec<DomainId>> = HashMap::new();
        while let Some(row) = rows.next()? {
            let (principle_id, domain_id) = parse_membership_row(row)?;
            by_principle.entry(principle_id).or_default().push(domain_id);
        }
        Ok(by_principle)
    }
}

impl PrincipleRepository for SqlitePrincipleRepository<'_> {
    fn insert_principle(
        &self,
        id: PrincipleId,
        text: &str,
        reference: Option<&str>,
        created_by: &str,
        domain_ids: &[DomainId],
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO principles (id, text, reference, created_by)
             VALUES (?1, ?2, ?3, ?4);",
            params![id.to_string(), text, reference, created_by],
        )?;
        self.insert_memberships(id, domain_ids)
    }

    fn update_fields(
        &self,
        id: PrincipleId,
        text: &str,
        reference: Option<&str>,
        expected_version: Option<i64>,
    ) -> RepoResult<i64> {
        let Some(actual) = self.current_version(id)? else {
            return Err(RepoError::NotFound {
                kind: EntityKind::Principle,
                id,
            });
        };
        if let Some(expected) = expected_version {
            if expected != actual {
                return Err(RepoError::VersionConflict {
                    id,
                    expected,
                    actual,
                });
            }
        }

        self.conn.execute(
            "UPDATE principles
             SET
                text = ?2,
                reference = ?3,
                updated_at = (CAST(strftime('%s', 'now') AS INTEGER) * 1000),
                version = version + 1
             WHERE id = ?1;",
            params![id.to_string(), text, reference],
        )?;
        Ok(actual + 1)
    }

    fn replace_domains(&self, id: PrincipleId, domain_ids: &[DomainId]) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM principle_domains WHERE principle_id = ?1;",
            [id.to_string()],
        )?;
        self.insert_memberships(id, domain_ids)
    }

    fn touch_principle(&self, id: PrincipleId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE principles
             SET
                updated_at = (CAST(strftime('%s', 'now') AS INTEGER) * 1000),
                version = version + 1
             WHERE id = ?1;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                kind: EntityKind::Principle,
                id,
            });
        }
        Ok(())
    }

    fn get_principle(&self, id: PrincipleId) -> RepoResult<Option<Principle>> {
        let row = self
            .conn
            .query_row(
                &format!("{PRINCIPLE_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                PrincipleRow::read,
            )
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };
        let domain_ids = self.domain_ids_of(id)?;
        row.into_principle(domain_ids).map(Some)
    }

    fn list_principles(&self) -> RepoResult<Vec<Principle>> {
        let mut memberships = self.load_membership_map()?;
        let mut stmt = self.conn.prepare(&format!(
            "{PRINCIPLE_SELECT_SQL} ORDER BY created_at DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut principles = Vec::new();
        while let Some(row) = rows.next()? {
            let row = PrincipleRow::read(row)?;
            let id = parse_uuid(&row.id, "principles.id")?;
            let domain_ids = memberships.remove(&id).unwrap_or_default();
            principles.push(row.into_principle(domain_ids)?);
        }
        Ok(principles)
    }

    fn delete_principle(&self, id: PrincipleId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM principles WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                kind: EntityKind::Principle,
                id,
            });
        }
        Ok(())
    }

    fn domain_ids_of(&self, id: PrincipleId) -> RepoResult<Vec<DomainId>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain_id
             FROM principle_domains
             WHERE principle_id = ?1
             ORDER BY position ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut domain_ids = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            domain_ids.push(parse_uuid(&value, "principle_domains.domain_id")?);
        }
        Ok(domain_ids)
    }

    fn memberships_for_domains(&self, domain_ids: &[DomainId]) -> RepoResult<Vec<Membership>> {
        let mut stmt = self.conn.prepare(
            "SELECT principle_id, domain_id
             FROM principle_domains
             WHERE domain_id = ?1
             ORDER BY principle_id ASC;",
        )?;
        let mut memberships = Vec::new();
        for domain_id in domain_ids {
            let mut rows = stmt.query([domain_id.to_string()])?;
            while let Some(row) = rows.next()? {
                memberships.push(parse_membership_row(row)?);
            }
        }
        Ok(memberships)
    }

    fn all_memberships(&self) -> RepoResult<Vec<Membership>> {
        let mut stmt = self.conn.prepare(
            "SELECT principle_id, domain_id
             FROM principle_domains
             ORDER BY principle_id ASC, position ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut memberships = Vec::new();
        while let Some(row) = rows.next()? {
            memberships.push(parse_membership_row(row)?);
        }
        Ok(memberships)
    }
}

fn parse_membership_row(row: &Row<'_>) -> RepoResult<Membership> {
    let principle_id: String = row.get("principle_id")?;
    let domain_id: String = row.get("domain_id")?;
    Ok((
        parse_uuid(&principle_id, "principle_domains.principle_id")?,
        parse_uuid(&domain_id, "principle_domains.domain_id")?,
    ))
}

struct PrincipleRow {
    id: String,
    text: String,
    reference: Option<String>,
    created_by: String,
    created_at: i64,
    updated_at: i64,
    version: i64,
}

impl PrincipleRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            text: row.get("text")?,
            reference: row.get("reference")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            version: row.get("version")?,
        })
    }

    fn into_principle(self, domain_ids: Vec<DomainId>) -> RepoResult<Principle> {
        let id = parse_uuid(&self.id, "principles.id")?;
        if domain_ids.is_empty() {
            return Err(RepoError::InvalidData(format!(
                "principle {id} has no domain memberships"
            )));
        }
        Ok(Principle {
            id,
            text: self.text,
            domain_ids,
            reference: self.reference,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        })
    }
}
