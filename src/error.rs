/*!
 * Error taxonomy for the OMERO client
 *
 * Every public session or wrapper operation fails with exactly one of the five
 * variants below. Collaborator failures are kept as the error source.
 */

use omero_gateway_interface::{ConnectionStatus, GatewayError};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OmeroError>;

#[derive(Error, Debug)]
pub enum OmeroError {
    /// Connection or authentication failure, or the session is not usable
    #[error("{message} (connection status: {status})")]
    Service {
        message: String,
        status: ConnectionStatus,
        #[source]
        source: Option<GatewayError>,
    },

    /// Caller lacks permission, or data is not visible in the current context
    #[error("{message}")]
    Access {
        message: String,
        #[source]
        source: Option<GatewayError>,
    },

    /// Remote-side processing failure, including delete-wait exhaustion
    #[error("{message}")]
    Server {
        message: String,
        #[source]
        source: Option<GatewayError>,
    },

    /// A lookup by id or name found no match
    #[error("{0}")]
    NotFound(String),

    /// Caller-side contract violation
    #[error("{0}")]
    Precondition(String),
}

impl OmeroError {
    pub fn service(message: impl Into<String>, status: ConnectionStatus) -> Self {
        OmeroError::Service {
            message: message.into(),
            status,
            source: None,
        }
    }

    pub fn access(message: impl Into<String>) -> Self {
        OmeroError::Access {
            message: message.into(),
            source: None,
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        OmeroError::Server {
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        OmeroError::NotFound(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        OmeroError::Precondition(message.into())
    }

    /// Get the taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            OmeroError::Service { .. } => ErrorKind::Service,
            OmeroError::Access { .. } => ErrorKind::Access,
            OmeroError::Server { .. } => ErrorKind::Server,
            OmeroError::NotFound(_) => ErrorKind::NotFound,
            OmeroError::Precondition(_) => ErrorKind::Precondition,
        }
    }

    /// The collaborator failure this error was mapped from, if any
    pub fn gateway_cause(&self) -> Option<&GatewayError> {
        match self {
            OmeroError::Service { source, .. }
            | OmeroError::Access { source, .. }
            | OmeroError::Server { source, .. } => source.as_ref(),
            OmeroError::NotFound(_) | OmeroError::Precondition(_) => None,
        }
    }

    /// Check whether the calling thread was interrupted while blocked
    ///
    /// Interruption is reported as a server error; this tells a cancelled
    /// operation apart from a failed one.
    pub fn is_interrupted(&self) -> bool {
        matches!(self.gateway_cause(), Some(GatewayError::Interrupted(_)))
    }

    /// Connection status carried by service errors
    pub fn connection_status(&self) -> Option<ConnectionStatus> {
        match self {
            OmeroError::Service { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Kind of an [`OmeroError`], for logging and matching without payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Service,
    Access,
    Server,
    NotFound,
    Precondition,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Service => write!(f, "ServiceError"),
            ErrorKind::Access => write!(f, "AccessError"),
            ErrorKind::Server => write!(f, "ServerError"),
            ErrorKind::NotFound => write!(f, "NotFoundError"),
            ErrorKind::Precondition => write!(f, "PreconditionError"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_kinds() {
        assert_eq!(
            OmeroError::service("x", ConnectionStatus::Network).kind(),
            ErrorKind::Service
        );
        assert_eq!(OmeroError::access("x").kind(), ErrorKind::Access);
        assert_eq!(OmeroError::server("x").kind(), ErrorKind::Server);
        assert_eq!(OmeroError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(OmeroError::precondition("x").kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_service_display_includes_status() {
        let err = OmeroError::service("Cannot connect to OMERO", ConnectionStatus::Unauthenticated);
        assert_eq!(
            err.to_string(),
            "Cannot connect to OMERO (connection status: unauthenticated)"
        );
        assert_eq!(err.connection_status(), Some(ConnectionStatus::Unauthenticated));
    }

    #[test]
    fn test_interrupted_cause() {
        let err = OmeroError::Server {
            message: "Thread was interrupted".to_string(),
            source: Some(GatewayError::Interrupted("wait".to_string())),
        };
        assert!(err.is_interrupted());
        assert!(err.source().is_some());

        assert!(!OmeroError::server("plain").is_interrupted());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::NotFound.to_string(), "NotFoundError");
        assert_eq!(ErrorKind::Service.to_string(), "ServiceError");
    }
}
