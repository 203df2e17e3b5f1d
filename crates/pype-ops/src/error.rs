//! Error types for the operations layer.

/// Result type alias for operations.
pub type Result<T> = std::result::Result<T, OpsError>;

/// Main error type for the operations layer.
#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    /// The operation is structurally disallowed for this entity kind
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The entity kind is known but the operation path is not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Identifier could not be parsed into the canonical form
    #[error("Invalid identifier \"{value}\": {reason}")]
    InvalidIdentifier { value: String, reason: String },

    /// Payload cannot round-trip through the wire encoding
    #[error("Payload is not serializable at {path}: {reason}")]
    NonSerializablePayload { path: String, reason: String },

    /// Payload is missing data required for conversion
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Project with name \"{0}\" already exists")]
    DuplicateProject(String),

    #[error("Project name \"{0}\" contain invalid characters")]
    InvalidProjectName(String),

    #[error("Project with name \"{0}\" was not found")]
    ProjectNotFound(String),

    #[error("Failed to create project \"{project}\": {detail}")]
    ProjectCreationFailed { project: String, detail: String },

    #[error("Failed to delete project \"{project}\": {detail}")]
    ProjectDeletionFailed { project: String, detail: String },

    /// Entity looked up for shape conversion does not exist
    #[error("Entity not found: {kind} with id {id} in project {project}")]
    EntityNotFound {
        project: String,
        kind: String,
        id: String,
    },

    /// The server rejected an operation or answered in an unknown shape
    #[error("{message}")]
    FailedOperations {
        operation_id: Option<String>,
        message: String,
    },

    /// Transport level errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OpsError {
    /// Create a new unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    /// Create a new not implemented error
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Create a new invalid identifier error
    pub fn invalid_identifier(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a new non-serializable payload error
    pub fn non_serializable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NonSerializablePayload {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new invalid payload error
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Create a new connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a failed operations error without a specific operation
    pub fn failed_operations(msg: impl Into<String>) -> Self {
        Self::FailedOperations {
            operation_id: None,
            message: msg.into(),
        }
    }

    /// Check if this is an unsupported operation error
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedOperation(_))
    }

    /// Check if this is a not implemented error
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }

    /// Check if this is a failed operations error
    pub fn is_failed_operations(&self) -> bool {
        matches!(self, Self::FailedOperations { .. })
    }

    /// Id of the rejected operation, if the server named one
    pub fn failed_operation_id(&self) -> Option<&str> {
        match self {
            Self::FailedOperations { operation_id, .. } => operation_id.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for OpsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OpsError::Connection(format!("Request timeout: {}", err))
        } else if err.is_connect() {
            OpsError::Connection(format!("Server unavailable: {}", err))
        } else {
            OpsError::Connection(err.to_string())
        }
    }
}
