//! Write-time validation errors for graph entities.

use crate::model::domain::DomainId;
use crate::model::principle::PrincipleId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Reasons a domain or principle write is rejected before any mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValidationError {
    /// Principle text is blank after trimming.
    EmptyText,
    /// A principle must carry at least one domain.
    EmptyDomainList,
    /// The same domain appears twice in one domain list.
    DuplicateDomain(DomainId),
    /// Domain name is blank after whitespace normalization.
    BlankDomainName,
    /// Domain name exceeds the storage limit.
    DomainNameTooLong { max_chars: usize, actual_chars: usize },
    /// A domain list references a domain that does not exist.
    UnknownDomain(DomainId),
    /// Another domain already uses this name (case-insensitive).
    DomainNameTaken(String),
    /// Domain is still referenced and deletion was not cascading.
    DomainInUse {
        domain_id: DomainId,
        principle_count: usize,
    },
    /// Cascading a domain removal would leave this principle without domains.
    WouldOrphanPrinciple {
        principle_id: PrincipleId,
        domain_id: DomainId,
    },
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyText => write!(f, "principle text must not be empty"),
            Self::EmptyDomainList => write!(f, "principle must reference at least one domain"),
            Self::DuplicateDomain(id) => write!(f, "domain listed more than once: {id}"),
            Self::BlankDomainName => write!(f, "domain name must not be empty"),
            Self::DomainNameTooLong {
                max_chars,
                actual_chars,
            } => write!(
                f,
                "domain name has {actual_chars} characters; at most {max_chars} allowed"
            ),
            Self::UnknownDomain(id) => write!(f, "domain does not exist: {id}"),
            Self::DomainNameTaken(name) => write!(f, "domain name already exists: `{name}`"),
            Self::DomainInUse {
                domain_id,
                principle_count,
            } => write!(
                f,
                "domain {domain_id} is referenced by {principle_count} principle(s)"
            ),
            Self::WouldOrphanPrinciple {
                principle_id,
                domain_id,
            } => write!(
                f,
                "removing domain {domain_id} would leave principle {principle_id} without domains"
            ),
        }
    }
}

impl Error for ModelValidationError {}
