//! Caller identity and write-capability gates.
//!
//! # Invariants
//! - Reads need no identity.
//! - Every write needs an identity and a role with write capability.
//! - Principle deletion is owner-only, for every role including `Admin`.
//!   Domain deletion needs only write capability.
//! - Edge rebuild and consistency checks are `Admin`-only.

use crate::model::principle::Principle;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Capability level attached to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Writer,
    Admin,
}

/// Config string value for reader role.
pub const ROLE_READER: &str = "reader";
/// Config string value for writer role.
pub const ROLE_WRITER: &str = "writer";
/// Config string value for admin role.
pub const ROLE_ADMIN: &str = "admin";

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reader => ROLE_READER,
            Self::Writer => ROLE_WRITER,
            Self::Admin => ROLE_ADMIN,
        }
    }

    pub fn may_write(self) -> bool {
        matches!(self, Self::Writer | Self::Admin)
    }
}

/// Parses a role from its lowercase config value.
pub fn parse_role(value: &str) -> Result<Role, AuthorizationError> {
    match value.trim() {
        ROLE_READER => Ok(Role::Reader),
        ROLE_WRITER => Ok(Role::Writer),
        ROLE_ADMIN => Ok(Role::Admin),
        other => Err(AuthorizationError::UnknownRole(other.to_string())),
    }
}

/// Who is asking, as handed over by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    identity: Option<String>,
    role: Role,
}

impl Caller {
    /// Unauthenticated caller: reads only.
    pub fn anonymous() -> Self {
        Self {
            identity: None,
            role: Role::Reader,
        }
    }

    /// Authenticated caller. A blank identity is treated as none.
    pub fn authenticated(identity: impl Into<String>, role: Role) -> Self {
        let identity = identity.into();
        let identity = identity.trim();
        Self {
            identity: (!identity.is_empty()).then(|| identity.to_string()),
            role,
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn may_write(&self) -> bool {
        self.identity.is_some() && self.role.may_write()
    }

    /// Returns the writer identity, or why the caller may not write.
    pub fn require_write(&self) -> Result<&str, AuthorizationError> {
        let identity = self.identity().ok_or(AuthorizationError::MissingIdentity)?;
        if !self.role.may_write() {
            return Err(AuthorizationError::WriteCapabilityRequired);
        }
        Ok(identity)
    }

    pub fn require_admin(&self) -> Result<&str, AuthorizationError> {
        let identity = self.identity().ok_or(AuthorizationError::MissingIdentity)?;
        if self.role != Role::Admin {
            return Err(AuthorizationError::AdminRequired);
        }
        Ok(identity)
    }

    /// Write capability plus ownership of `principle`.
    pub fn require_owner(&self, principle: &Principle) -> Result<&str, AuthorizationError> {
        let identity = self.require_write()?;
        if identity != principle.created_by {
            return Err(AuthorizationError::NotOwner {
                principle_id: principle.id,
            });
        }
        Ok(identity)
    }
}

/// Reasons a caller is turned away before the store is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// No identity was presented.
    MissingIdentity,
    /// Identity is known but its role cannot write.
    WriteCapabilityRequired,
    /// Operation is reserved to administrators.
    AdminRequired,
    /// Only the creator may delete a principle.
    NotOwner { principle_id: Uuid },
    /// Configured role string is not recognized.
    UnknownRole(String),
}

impl AuthorizationError {
    /// Whether the caller is unidentified rather than insufficiently privileged.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::MissingIdentity)
    }
}

impl Display for AuthorizationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingIdentity => write!(f, "authentication required"),
            Self::WriteCapabilityRequired => write!(f, "write capability required"),
            Self::AdminRequired => write!(f, "admin role required"),
            Self::NotOwner { principle_id } => {
                write!(f, "only the creator may delete principle {principle_id}")
            }
            Self::UnknownRole(value) => {
                write!(f, "unknown role `{value}`; expected reader|writer|admin")
            }
        }
    }
}

impl Error for AuthorizationError {}

#[cfg(test)]
mod tests {
    use super::{parse_role, AuthorizationError, Caller, Role};
    use crate::model::principle::Principle;
    use uuid::Uuid;

    fn owned_by(identity: &str) -> Principle {
        Principle {
            id: Uuid::new_v4(),
            text: "p".to_string(),
            domain_ids: vec![Uuid::new_v4()],
            reference: None,
            created_by: identity.to_string(),
            created_at: 0,
            updated_at: 0,
            version: 1,
        }
    }

    #[test]
    fn anonymous_and_reader_cannot_write() {
        assert_eq!(
            Caller::anonymous().require_write(),
            Err(AuthorizationError::MissingIdentity)
        );
        assert_eq!(
            Caller::authenticated("ana", Role::Reader).require_write(),
            Err(AuthorizationError::WriteCapabilityRequired)
        );
        assert_eq!(
            Caller::authenticated("   ", Role::Admin).require_write(),
            Err(AuthorizationError::MissingIdentity)
        );
        assert_eq!(
            Caller::authenticated("ana", Role::Writer).require_write(),
            Ok("ana")
        );
    }

    #[test]
    fn ownership_is_not_bypassed_by_admin() {
        let principle = owned_by("ana");
        assert_eq!(
            Caller::authenticated("ana", Role::Writer).require_owner(&principle),
            Ok("ana")
        );
        assert_eq!(
            Caller::authenticated("root", Role::Admin).require_owner(&principle),
            Err(AuthorizationError::NotOwner {
                principle_id: principle.id
            })
        );
    }

    #[test]
    fn admin_gate_rejects_writers() {
        assert_eq!(
            Caller::authenticated("ana", Role::Writer).require_admin(),
            Err(AuthorizationError::AdminRequired)
        );
        assert!(Caller::authenticated("root", Role::Admin)
            .require_admin()
            .is_ok());
    }

    #[test]
    fn parses_lowercase_roles_only() {
        assert_eq!(parse_role(" admin "), Ok(Role::Admin));
        assert_eq!(
            parse_role("Admin"),
            Err(AuthorizationError::UnknownRole("Admin".to_string()))
        );
    }
}
