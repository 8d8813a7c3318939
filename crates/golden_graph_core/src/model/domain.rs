//! Domain (knowledge category) model.
//!
//! # Invariants
//! - `name` is unique across all domains, compared case-insensitively
//!   through `domain_name_key` (full Unicode lowercase, not ASCII folding).
//! - Names are stored whitespace-normalized: trimmed, inner runs collapsed.

use crate::model::validation::ModelValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable domain identifier.
pub type DomainId = Uuid;

/// Longest accepted domain name, in characters.
pub const DOMAIN_NAME_MAX_CHARS: usize = 100;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Persisted knowledge domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub id: DomainId,
    pub name: String,
    /// Identity of the caller that created the domain.
    pub created_by: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

/// Normalizes a user-supplied domain name.
///
/// # Errors
/// - `BlankDomainName` when nothing but whitespace remains.
/// - `DomainNameTooLong` above `DOMAIN_NAME_MAX_CHARS`.
pub fn normalize_domain_name(name: &str) -> Result<String, ModelValidationError> {
    let collapsed = WHITESPACE_RE.replace_all(name.trim(), " ").into_owned();
    if collapsed.is_empty() {
        return Err(ModelValidationError::BlankDomainName);
    }
    let actual_chars = collapsed.chars().count();
    if actual_chars > DOMAIN_NAME_MAX_CHARS {
        return Err(ModelValidationError::DomainNameTooLong {
            max_chars: DOMAIN_NAME_MAX_CHARS,
            actual_chars,
        });
    }
    Ok(collapsed)
}

/// Uniqueness and ordering key of an already normalized domain name.
pub fn domain_name_key(name: &str) -> String {
    name.to_lowercase()
}
