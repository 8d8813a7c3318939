//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define data access contracts for domains, principles and edges.
//! - Isolate SQLite query details from store/service orchestration.
//!
//! # Invariants
//! - Repositories never open transactions themselves; callers hand in a
//!   connection or a `Transaction` (which derefs to one) so several
//!   repository calls commit as one unit of work.
//! - Read paths reject unparseable persisted rows (`InvalidData`) instead of
//!   masking them.

use crate::db::DbError;
use crate::model::validation::ModelValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod domain_repo;
pub mod edge_repo;
pub mod principle_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Entity family named in repository errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Domain,
    Principle,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Principle => "principle",
        }
    }
}

/// Repository error for graph persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ModelValidationError),
    Db(DbError),
    NotFound { kind: EntityKind, id: Uuid },
    /// Stored principle version differs from the caller's expectation.
    VersionConflict {
        id: Uuid,
        expected: i64,
        actual: i64,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{} not found: {id}", kind.as_str()),
            Self::VersionConflict {
                id,
                expected,
                actual,
            } => write!(
                f,
                "principle {id} is at version {actual}, expected {expected}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted graph data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound { .. } | Self::VersionConflict { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<ModelValidationError> for RepoError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}
