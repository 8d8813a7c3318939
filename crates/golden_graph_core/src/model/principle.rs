//! Principle model and write-request shapes.
//!
//! # Responsibility
//! - Define the persisted principle record and its create/patch inputs.
//! - Validate domain lists before they reach storage.
//!
//! # Invariants
//! - `domain_ids` is non-empty and repeat-free.
//! - `domain_ids[0]` is the primary domain; order is preserved end to end.
//! - `version` starts at 1 and increases by one per committed update.

use crate::model::domain::DomainId;
use crate::model::validation::ModelValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Stable principle identifier.
pub type PrincipleId = Uuid;

/// Persisted principle with its ordered domain memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principle {
    pub id: PrincipleId,
    pub text: String,
    pub domain_ids: Vec<DomainId>,
    pub reference: Option<String>,
    pub created_by: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
    /// Optimistic concurrency counter.
    pub version: i64,
}

impl Principle {
    /// Returns the domain that drives layout grouping and node color.
    pub fn primary_domain(&self) -> Option<DomainId> {
        self.domain_ids.first().copied()
    }

    /// Returns whether this principle carries `domain_id`.
    pub fn has_domain(&self, domain_id: DomainId) -> bool {
        self.domain_ids.contains(&domain_id)
    }
}

/// Input for creating a principle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewPrinciple {
    pub text: String,
    pub domain_ids: Vec<DomainId>,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Partial update for a principle. Absent fields stay unchanged.
///
/// `reference: Some("")` clears the reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PrinciplePatch {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub domain_ids: Option<Vec<DomainId>>,
    #[serde(default)]
    pub reference: Option<String>,
    /// When set, the update is rejected unless the stored version matches.
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl PrinciplePatch {
    /// Returns whether the patch carries no field changes.
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.domain_ids.is_none() && self.reference.is_none()
    }
}

/// Normalizes principle text: trimmed and non-empty.
pub fn normalize_principle_text(text: &str) -> Result<String, ModelValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ModelValidationError::EmptyText);
    }
    Ok(trimmed.to_string())
}

/// Normalizes an optional reference: blank collapses to `None`.
pub fn normalize_reference(reference: Option<&str>) -> Option<String> {
    reference
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Validates an ordered domain list.
///
/// # Errors
/// - `EmptyDomainList` when the list is empty.
/// - `DuplicateDomain` for the first repeated id.
pub fn validate_domain_ids(domain_ids: &[DomainId]) -> Result<(), ModelValidationError> {
    if domain_ids.is_empty() {
        return Err(ModelValidationError::EmptyDomainList);
    }
    let mut seen = HashSet::with_capacity(domain_ids.len());
    for id in domain_ids {
        if !seen.insert(*id) {
            return Err(ModelValidationError::DuplicateDomain(*id));
        }
    }
    Ok(())
}

/// Creates a fresh random principle id.
pub fn new_principle_id() -> PrincipleId {
    Uuid::new_v4()
}
