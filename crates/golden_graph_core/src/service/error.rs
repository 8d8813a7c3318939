//! Service error taxonomy shared by every graph use-case.

use crate::model::validation::ModelValidationError;
use crate::repo::{EntityKind, RepoError};
use crate::service::access::AuthorizationError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Coarse error family exposed to transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Consistency,
    Authorization,
    NotFound,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Consistency => "consistency",
            Self::Authorization => "authorization",
            Self::NotFound => "not_found",
            Self::Storage => "storage",
        }
    }
}

/// Error returned by `GraphService`.
#[derive(Debug)]
pub enum ServiceError {
    /// Request is malformed; nothing was written.
    Validation(ModelValidationError),
    /// Domain name collides with an existing one.
    NameConflict(String),
    /// Optimistic version check failed.
    VersionConflict {
        id: Uuid,
        expected: i64,
        actual: i64,
    },
    /// Stored graph state breaks an invariant. Operator-facing.
    Consistency(String),
    /// Caller may not perform the operation.
    Authorization(AuthorizationError),
    NotFound { kind: EntityKind, id: Uuid },
    /// Storage failure.
    Repo(RepoError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NameConflict(_) | Self::VersionConflict { .. } => ErrorKind::Conflict,
            Self::Consistency(_) => ErrorKind::Consistency,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Repo(_) => ErrorKind::Storage,
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NameConflict(name) => write!(f, "domain name already exists: `{name}`"),
            Self::VersionConflict {
                id,
                expected,
                actual,
            } => write!(
                f,
                "principle {id} was modified concurrently: expected version {expected}, found {actual}"
            ),
            Self::Consistency(message) => write!(f, "graph consistency violation: {message}"),
            Self::Authorization(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{} not found: {id}", kind.as_str()),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Authorization(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AuthorizationError> for ServiceError {
    fn from(value: AuthorizationError) -> Self {
        Self::Authorization(value)
    }
}

impl From<ModelValidationError> for ServiceError {
    fn from(value: ModelValidationError) -> Self {
        match value {
            ModelValidationError::DomainNameTaken(name) => Self::NameConflict(name),
            other => Self::Validation(other),
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => err.into(),
            RepoError::NotFound { kind, id } => Self::NotFound { kind, id },
            RepoError::VersionConflict {
                id,
                expected,
                actual,
            } => Self::VersionConflict {
                id,
                expected,
                actual,
            },
            RepoError::InvalidData(message) => Self::Consistency(message),
            other => Self::Repo(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, ServiceError};
    use crate::model::validation::ModelValidationError;
    use crate::repo::RepoError;
    use uuid::Uuid;

    #[test]
    fn repo_errors_map_onto_the_taxonomy() {
        let name_taken: ServiceError =
            RepoError::Validation(ModelValidationError::DomainNameTaken("Physics".into())).into();
        assert_eq!(name_taken.kind(), ErrorKind::Conflict);

        let empty: ServiceError = RepoError::Validation(ModelValidationError::EmptyDomainList).into();
        assert_eq!(empty.kind(), ErrorKind::Validation);

        let stale: ServiceError = RepoError::VersionConflict {
            id: Uuid::new_v4(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert_eq!(stale.kind(), ErrorKind::Conflict);

        let corrupt: ServiceError = RepoError::InvalidData("bad row".into()).into();
        assert_eq!(corrupt.kind(), ErrorKind::Consistency);
        assert_eq!(corrupt.kind().as_str(), "consistency");
    }
}
